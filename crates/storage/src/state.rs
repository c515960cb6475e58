// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence.
//!
//! One snapshot file holds the whole session. Writes go to a `.tmp` sibling
//! first and are renamed over the target, so a crash mid-save never corrupts
//! the previous snapshot. Named snapshots live under `snapshots/`.

use gaffer_core::{SessionData, SessionSnapshot, SNAPSHOT_VERSION};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from snapshot operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: String, expected: String },
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),
    #[error("invalid snapshot name: {0}")]
    InvalidName(String),
}

/// Owns the snapshot file for one session.
///
/// Callers mark the manager dirty on every mutation; the daemon's autosave
/// tick calls [`StateManager::save_if_dirty`], and terminal task transitions
/// force an immediate [`StateManager::save`].
#[derive(Debug)]
pub struct StateManager {
    data_dir: PathBuf,
    state_path: PathBuf,
    dirty: bool,
}

impl StateManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let state_path = data_dir.join("state.json");
        Self {
            data_dir,
            state_path,
            dirty: false,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Load the current snapshot.
    ///
    /// Returns `Ok(None)` when no snapshot exists yet (fresh session).
    /// Corrupt files and version mismatches are errors — startup refuses to
    /// guess at a session it cannot decode.
    pub fn load(&self) -> Result<Option<SessionData>, StateError> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let snapshot = read_snapshot(&self.state_path)?;
        Ok(Some(snapshot.session))
    }

    /// Write the snapshot atomically and clear the dirty flag.
    pub fn save(&mut self, session: &SessionData) -> Result<PathBuf, StateError> {
        write_snapshot(&self.state_path, session)?;
        self.dirty = false;
        debug!(path = %self.state_path.display(), "session saved");
        Ok(self.state_path.clone())
    }

    /// Autosave entry point: write only when something changed.
    pub fn save_if_dirty(&mut self, session: &SessionData) -> Result<Option<PathBuf>, StateError> {
        if !self.dirty {
            return Ok(None);
        }
        self.save(session).map(Some)
    }

    /// Write a named copy under `snapshots/`.
    ///
    /// `name` defaults to `snapshot-<epoch_ms>`. Names must be plain file
    /// stems; path separators are rejected.
    pub fn create_snapshot(
        &self,
        name: Option<&str>,
        session: &SessionData,
        epoch_ms: u64,
    ) -> Result<PathBuf, StateError> {
        let default_name = format!("snapshot-{epoch_ms}");
        let name = name.unwrap_or(&default_name);
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(StateError::InvalidName(name.to_string()));
        }
        let path = self.snapshots_dir().join(format!("{name}.json"));
        write_snapshot(&path, session)?;
        Ok(path)
    }

    /// Load a named snapshot, replacing the live session.
    ///
    /// The current session is first saved as `before_restore` so a mistaken
    /// restore can itself be undone. The manager comes back dirty: the
    /// restored session has not been written to `state.json` yet.
    pub fn restore_snapshot(
        &mut self,
        path: &Path,
        current: &SessionData,
        epoch_ms: u64,
    ) -> Result<SessionData, StateError> {
        if !path.exists() {
            return Err(StateError::SnapshotNotFound(path.to_path_buf()));
        }
        self.create_snapshot(Some("before_restore"), current, epoch_ms)?;
        let snapshot = read_snapshot(path)?;
        self.dirty = true;
        Ok(snapshot.session)
    }
}

fn read_snapshot(path: &Path) -> Result<SessionSnapshot, StateError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let snapshot: SessionSnapshot =
        serde_json::from_reader(reader).map_err(|e| StateError::Corrupt(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StateError::UnsupportedVersion {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION.to_string(),
        });
    }
    Ok(snapshot)
}

/// Atomic write: serialize to `{path}.tmp`, fsync, then rename over `{path}`.
fn write_snapshot(path: &Path, session: &SessionData) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let snapshot = SessionSnapshot::new(session.clone());
    let tmp_path = path.with_extension("tmp");

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &snapshot)
            .map_err(|e| StateError::Corrupt(e.to_string()))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
