// Persisted tracking reference
// The vehicle tracked by the background task lives in $STATE_DIR/tracking.json
// so a relaunched background task can rediscover it. Absent file = not tracking.

use crate::tracking::config::TrackingConfig;
use crate::tracking::protocol::VehicleId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// The only state that outlives the hosting process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTrackingRef {
    #[serde(rename = "trackingBusId")]
    pub vehicle_id: VehicleId,
    /// When background tracking was armed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armed_at: Option<DateTime<Utc>>,
}

/// Single-key durable store, last write wins
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(config: &TrackingConfig) -> Self {
        Self::at_path(config.tracking_file())
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the vehicle being tracked
    pub fn set(&self, vehicle_id: &str) -> Result<()> {
        let record = PersistedTrackingRef {
            vehicle_id: vehicle_id.to_string(),
            armed_at: Some(Utc::now()),
        };
        let contents =
            serde_json::to_string_pretty(&record).context("Failed to serialize tracking ref")?;

        self.with_lock(|| atomic_write(&self.path, &contents))
    }

    /// Read the persisted vehicle id, if any
    pub fn get(&self) -> Option<VehicleId> {
        self.load().map(|r| r.vehicle_id)
    }

    /// Read the full persisted record
    ///
    /// Missing, empty or unreadable files all read as absent; corruption is logged.
    pub fn load(&self) -> Option<PersistedTrackingRef> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read tracking ref");
                return None;
            }
        };

        if contents.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<PersistedTrackingRef>(&contents) {
            Ok(record) if !record.vehicle_id.trim().is_empty() => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt tracking ref");
                None
            }
        }
    }

    /// Forget the tracked vehicle; no-op when nothing is stored
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        self.with_lock(|| match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove {}", self.path.display())),
        })
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Run a mutation while holding an exclusive lock on the sidecar lock file
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to acquire exclusive lock on tracking ref")?;

        // Lock is released when lock_file is dropped
        f()
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Replace `path` with `contents` so readers see the old or the new record
///
/// The temp file sits next to the target and is named per process and per
/// write, then flushed to disk before the rename.
fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("Tracking ref path has no parent: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tracking.json");
    let temp_path = dir.join(format!(
        ".{}.{}-{}.tmp",
        name,
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let written = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })
        .with_context(|| format!("Failed to write {}", temp_path.display()))
        .and_then(|()| {
            fs::rename(&temp_path, path).with_context(|| {
                format!("Failed to move tracking ref into {}", path.display())
            })
        });

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}
