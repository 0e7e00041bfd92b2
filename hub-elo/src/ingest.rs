use crate::api::{DEFAULT_PAGE_SIZE, MatchSource, fetch_matches, get_full_match_list};
use crate::builder::{ApplyOutcome, apply_match};
use crate::elo::PerformanceFormula;
use crate::parser::parse_match;
use crate::types::{HubData, RawMatch};
use common::RetryPolicy;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How an update decides which listed matches are new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum DiffStrategy {
    /// The newest `fresh - previous` ids. Assumes the hub listing only grows.
    #[default]
    Count,
    /// Every listed id not already processed.
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestSettings {
    pub offset: usize,
    pub limit: usize,
    pub page_size: usize,
    pub retry: RetryPolicy,
    pub diff_strategy: DiffStrategy,
    pub formula: PerformanceFormula,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10_000,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            diff_strategy: DiffStrategy::default(),
            formula: PerformanceFormula::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IngestPhase {
    Idle = 0,
    Listing = 1,
    Fetching = 2,
    Processing = 3,
    Done = 4,
    Failed = 5,
}

impl IngestPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Listing,
            2 => Self::Fetching,
            3 => Self::Processing,
            4 => Self::Done,
            5 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Progress of one run, shared between the run and whoever watches it.
#[derive(Debug, Default)]
pub struct Progress {
    phase: AtomicU8,
    processed: AtomicUsize,
    total: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: IngestPhase,
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: IngestPhase::from_u8(self.phase.load(Ordering::Acquire)),
            processed: self.processed.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }

    pub(crate) fn set_phase(&self, phase: IngestPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn start(&self, total: usize) {
        self.processed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn advance(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub message: String,
    pub data: HubData,
    /// Display name to player id.
    pub name_lookup: HashMap<String, String>,
}

impl IngestOutcome {
    /// One-line report of the run. Players are counted by id, so players
    /// sharing a nickname are counted separately.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} ({} players)", self.message, self.data.players.len())
    }

    fn new(message: String, data: HubData) -> Self {
        let name_lookup = data.name_lookup();
        Self {
            message,
            data,
            name_lookup,
        }
    }
}

/// Runs full and incremental ingestion against a [`MatchSource`].
#[derive(Debug)]
pub struct HubIngestor<S> {
    source: S,
    settings: IngestSettings,
    progress: Arc<Progress>,
}

impl<S: MatchSource> HubIngestor<S> {
    pub fn new(source: S, settings: IngestSettings) -> Self {
        Self::with_progress(source, settings, Arc::default())
    }

    pub fn with_progress(source: S, settings: IngestSettings, progress: Arc<Progress>) -> Self {
        Self {
            source,
            settings,
            progress,
        }
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Builds a hub's stores from scratch.
    #[instrument(skip(self))]
    pub async fn full_ingest(&self, hub_id: &str) -> anyhow::Result<IngestOutcome> {
        let result = self.run_full(hub_id).await;
        self.finish(result)
    }

    /// Applies matches listed since `previous` was produced.
    ///
    /// A run that fails leaves nothing half-applied: `previous` is consumed and
    /// only returned, updated, on success.
    #[instrument(skip(self, previous), fields(known_matches = previous.match_list.len()))]
    pub async fn incremental_update(
        &self,
        hub_id: &str,
        previous: HubData,
    ) -> anyhow::Result<IngestOutcome> {
        let result = self.run_incremental(hub_id, previous).await;
        self.finish(result)
    }

    async fn run_full(&self, hub_id: &str) -> anyhow::Result<IngestOutcome> {
        let mut match_list = self.list(hub_id).await?;
        match_list.reverse();

        let mut data = HubData::default();
        let fetched = self.fetch(&match_list).await;
        self.process(&mut data, &match_list, fetched);
        data.match_list = match_list;

        info!("Found {} matches for hub {hub_id}", data.match_list.len());
        Ok(IngestOutcome::new(
            format!("Found {} matches", data.match_list.len()),
            data,
        ))
    }

    async fn run_incremental(
        &self,
        hub_id: &str,
        mut data: HubData,
    ) -> anyhow::Result<IngestOutcome> {
        let fresh = self.list(hub_id).await?;

        let mut new_ids = match self.settings.diff_strategy {
            DiffStrategy::Count => {
                if fresh.len() < data.match_list.len() {
                    warn!(
                        fresh = fresh.len(),
                        known = data.match_list.len(),
                        "Hub listing shrank, treating as no new matches"
                    );
                }
                let new_count = fresh.len().saturating_sub(data.match_list.len());
                fresh[..new_count].to_vec()
            }
            DiffStrategy::Identity => {
                let known = data.match_list.iter().collect::<HashSet<_>>();
                fresh
                    .iter()
                    .filter(|id| !known.contains(id))
                    .cloned()
                    .collect()
            }
        };
        new_ids.reverse();

        let fetched = self.fetch(&new_ids).await;
        self.process(&mut data, &new_ids, fetched);

        data.match_list = fresh;
        data.match_list.reverse();

        info!("Found {} new matches for hub {hub_id}", new_ids.len());
        Ok(IngestOutcome::new(
            format!("Found {} new matches", new_ids.len()),
            data,
        ))
    }

    async fn list(&self, hub_id: &str) -> anyhow::Result<Vec<String>> {
        self.progress.set_phase(IngestPhase::Listing);
        get_full_match_list(
            &self.source,
            hub_id,
            self.settings.offset,
            self.settings.limit,
            self.settings.page_size,
            self.settings.retry,
        )
        .await
    }

    async fn fetch(&self, match_ids: &[String]) -> Vec<Option<RawMatch>> {
        self.progress.set_phase(IngestPhase::Fetching);
        self.progress.start(match_ids.len());
        gauge!("hub_elo.ingest.pending_matches").set(match_ids.len() as f64);
        fetch_matches(&self.source, match_ids).await
    }

    /// Applies fetched matches in order; `match_ids` is oldest first.
    fn process(&self, data: &mut HubData, match_ids: &[String], fetched: Vec<Option<RawMatch>>) {
        self.progress.set_phase(IngestPhase::Processing);
        for (match_id, raw) in match_ids.iter().zip(fetched) {
            if let Some(parsed) = parse_match(match_id, raw.as_ref()) {
                match apply_match(
                    &mut data.players,
                    &mut data.matches,
                    parsed,
                    self.settings.formula,
                ) {
                    ApplyOutcome::Applied => {
                        counter!("hub_elo.ingest.applied").increment(1);
                    }
                    ApplyOutcome::Duplicate => {
                        counter!("hub_elo.ingest.duplicate").increment(1);
                    }
                }
            } else {
                counter!("hub_elo.ingest.skipped").increment(1);
            }
            self.progress.advance();
            gauge!("hub_elo.ingest.pending_matches").decrement(1.0);
        }
    }

    fn finish(&self, result: anyhow::Result<IngestOutcome>) -> anyhow::Result<IngestOutcome> {
        self.progress.set_phase(if result.is_ok() {
            IngestPhase::Done
        } else {
            IngestPhase::Failed
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_snapshot_reflects_updates() {
        let progress = Progress::default();
        assert_eq!(progress.snapshot().phase, IngestPhase::Idle);

        progress.set_phase(IngestPhase::Fetching);
        progress.start(3);
        progress.advance();
        progress.advance();

        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                phase: IngestPhase::Fetching,
                processed: 2,
                total: 3,
            }
        );
    }

    #[test]
    fn phase_survives_the_atomic_encoding() {
        for phase in [
            IngestPhase::Idle,
            IngestPhase::Listing,
            IngestPhase::Fetching,
            IngestPhase::Processing,
            IngestPhase::Done,
            IngestPhase::Failed,
        ] {
            assert_eq!(IngestPhase::from_u8(phase as u8), phase);
        }
    }

    #[test]
    fn defaults_match_documented_limits() {
        let settings = IngestSettings::default();
        assert_eq!(settings.limit, 10_000);
        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.diff_strategy, DiffStrategy::Count);
    }
}
