use crate::api::MatchSource;
use crate::ingest::{HubIngestor, IngestOutcome, IngestPhase, IngestSettings, Progress};
use crate::types::HubData;
use core::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Queued,
    Running,
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub progress: usize,
    pub total: usize,
    pub phase: IngestPhase,
    pub state: TaskState,
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task {0} not found")]
    NotFound(TaskId),
    #[error("An ingestion run for hub {0} is already in progress")]
    AlreadyRunning(String),
    #[error("Ingestion failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum IngestRequest {
    Full,
    Incremental(HubData),
}

/// Hub ids with a live run.
#[derive(Debug, Clone, Default)]
pub struct HubLocks(Arc<Mutex<HashSet<String>>>);

impl HubLocks {
    pub fn try_acquire(&self, hub_id: &str) -> Result<HubLockGuard, TaskError> {
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(hub_id.to_string()) {
            return Err(TaskError::AlreadyRunning(hub_id.to_string()));
        }
        Ok(HubLockGuard {
            hub_id: hub_id.to_string(),
            locks: Arc::clone(&self.0),
        })
    }

    pub fn is_locked(&self, hub_id: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hub_id)
    }
}

/// Releases the hub's run lock when dropped.
#[derive(Debug)]
pub struct HubLockGuard {
    hub_id: String,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl Drop for HubLockGuard {
    fn drop(&mut self) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.hub_id);
    }
}

#[derive(Debug)]
struct TaskEntry {
    progress: Arc<Progress>,
    state: Arc<Mutex<TaskState>>,
    join: JoinHandle<anyhow::Result<IngestOutcome>>,
}

impl TaskEntry {
    fn status(&self) -> TaskStatus {
        let snapshot = self.progress.snapshot();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // A task that panicked never gets to record its end state.
        if state == TaskState::Running && self.join.is_finished() {
            state = TaskState::Failed("ingestion task terminated unexpectedly".to_string());
        }
        TaskStatus {
            progress: snapshot.processed,
            total: snapshot.total,
            phase: snapshot.phase,
            state,
        }
    }
}

/// Runs ingestions in the background and hands out their progress and results.
#[derive(Debug)]
pub struct TaskRegistry<S> {
    source: Arc<S>,
    settings: IngestSettings,
    locks: HubLocks,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

impl<S: MatchSource + 'static> TaskRegistry<S> {
    pub fn new(source: S, settings: IngestSettings) -> Self {
        Self {
            source: Arc::new(source),
            settings,
            locks: HubLocks::default(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::default(),
        }
    }

    /// Starts an ingestion run and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, hub_id: &str, request: IngestRequest) -> Result<TaskId, TaskError> {
        let guard = self.locks.try_acquire(hub_id)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let progress = Arc::new(Progress::default());
        let state = Arc::new(Mutex::new(TaskState::Queued));
        let ingestor = HubIngestor::with_progress(
            Arc::clone(&self.source),
            self.settings,
            Arc::clone(&progress),
        );

        let hub = hub_id.to_string();
        let task_state = Arc::clone(&state);
        let join = tokio::spawn(async move {
            set_state(&task_state, TaskState::Running);
            let result = match request {
                IngestRequest::Full => ingestor.full_ingest(&hub).await,
                IngestRequest::Incremental(previous) => {
                    ingestor.incremental_update(&hub, previous).await
                }
            };
            drop(guard);
            match &result {
                Ok(outcome) => {
                    info!(task_id = id, hub_id = %hub, "{}", outcome.message);
                    set_state(&task_state, TaskState::Finished);
                }
                Err(e) => {
                    error!(task_id = id, hub_id = %hub, "Ingestion failed: {e:?}");
                    set_state(&task_state, TaskState::Failed(format!("{e:#}")));
                }
            }
            result
        });

        info!(task_id = id, hub_id, "Submitted ingestion task");
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                TaskEntry {
                    progress,
                    state,
                    join,
                },
            );
        Ok(id)
    }

    pub fn poll(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(TaskEntry::status)
            .ok_or(TaskError::NotFound(id))
    }

    /// Waits for the task and returns its outcome.
    ///
    /// The task is forgotten once its result is taken: later calls for the same
    /// id, including `poll`, report `NotFound`.
    pub async fn take_result(&self, id: TaskId) -> Result<IngestOutcome, TaskError> {
        let entry = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(TaskError::NotFound(id))?;

        match entry.join.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(TaskError::Failed(format!("{e:#}"))),
            Err(e) => Err(TaskError::Failed(e.to_string())),
        }
    }

    pub fn is_running(&self, hub_id: &str) -> bool {
        self.locks.is_locked(hub_id)
    }

    /// Tasks whose result has not been taken yet.
    pub fn tracked(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn set_state(state: &Mutex<TaskState>, new_state: TaskState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = new_state;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_lock_is_exclusive_per_hub() {
        let locks = HubLocks::default();
        let guard = locks.try_acquire("hub-a").unwrap();

        assert!(matches!(
            locks.try_acquire("hub-a"),
            Err(TaskError::AlreadyRunning(hub)) if hub == "hub-a"
        ));
        let other = locks.try_acquire("hub-b").unwrap();
        assert!(locks.is_locked("hub-a"));

        drop(guard);
        assert!(!locks.is_locked("hub-a"));
        assert!(locks.try_acquire("hub-a").is_ok());
        drop(other);
    }
}
