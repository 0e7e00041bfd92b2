use crate::types::HubData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(
        "Snapshot version {found} is not supported (expected {expected})",
        expected = SNAPSHOT_VERSION
    )]
    VersionMismatch { found: u32 },
}

/// A hub's stores as saved on disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HubSnapshot {
    pub version: u32,
    pub hub_id: String,
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: HubData,
    /// Rebuilt from `data` on load.
    #[serde(skip)]
    pub name_lookup: HashMap<String, String>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    hub_id: &'a str,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    data: &'a HubData,
}

/// `{data_dir}/{hub_id}.json`, with anything but ASCII alphanumerics, `-` and
/// `_` in the hub id replaced.
#[must_use]
pub fn snapshot_path(data_dir: &Path, hub_id: &str) -> PathBuf {
    let file_stem: String = hub_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    data_dir.join(format!("{file_stem}.json"))
}

/// Writes the snapshot next to its final path and renames it into place.
#[instrument(skip(data), fields(matches = data.match_list.len()))]
pub fn save_snapshot(
    data_dir: &Path,
    hub_id: &str,
    data: &HubData,
) -> Result<PathBuf, SnapshotError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SnapshotError::Io { path, source }
    };

    fs::create_dir_all(data_dir).map_err(io_err(data_dir))?;
    let path = snapshot_path(data_dir, hub_id);
    let tmp = path.with_extension("json.tmp");

    let json = serde_json::to_vec(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        hub_id,
        saved_at: Utc::now(),
        data,
    })?;
    fs::write(&tmp, json).map_err(io_err(&tmp))?;
    fs::rename(&tmp, &path).map_err(io_err(&path))?;

    info!("Saved snapshot of hub {hub_id} to {}", path.display());
    Ok(path)
}

#[instrument]
pub fn load_snapshot(path: &Path) -> Result<HubSnapshot, SnapshotError> {
    let raw = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    #[derive(Deserialize)]
    struct Version {
        version: u32,
    }
    let Version { version } = serde_json::from_slice(&raw)?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch { found: version });
    }

    let mut snapshot: HubSnapshot = serde_json::from_slice(&raw)?;
    snapshot.name_lookup = snapshot.data.name_lookup();
    debug!(
        hub_id = %snapshot.hub_id,
        players = snapshot.data.players.len(),
        matches = snapshot.data.matches.len(),
        "Loaded snapshot"
    );
    Ok(snapshot)
}
