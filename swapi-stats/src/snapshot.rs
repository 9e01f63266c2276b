//! Snapshot storage.
//!
//! The latest [`StatsSnapshot`] lives in two places: a JSON file that survives
//! restarts and can be replaced by another process (the `compute`
//! subcommand), and an `ArcSwapOption` copy tagged with the file's
//! modification stamp. Readers serve the in-memory copy only while the file
//! still carries that stamp, so the most recent completed write wins no matter
//! which process made it.
//!
//! The file is written atomically: first to a uniquely named temp sibling,
//! then renamed over the final path, so a reader never observes a partially
//! written snapshot.

use arc_swap::ArcSwapOption;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use swapi_core::{StatsSnapshot, SwapiError};
use tracing::{debug, warn};

/// Identity of one version of the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

struct Loaded {
    snapshot: Arc<StatsSnapshot>,
    /// `None` when the file could not be inspected after writing it.
    stamp: Option<FileStamp>,
}

pub struct SnapshotStore {
    path: PathBuf,
    latest: ArcSwapOption<Loaded>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latest: ArcSwapOption::empty(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot.
    ///
    /// On error the previous file is left untouched and the in-memory copy is
    /// not updated.
    pub fn write(&self, snapshot: &StatsSnapshot) -> Result<(), SwapiError> {
        let json = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = std::fs::write(&tmp, &json) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        let stamp = std::fs::metadata(&self.path).ok().map(|m| FileStamp::of(&m));
        self.latest.store(Some(Arc::new(Loaded {
            snapshot: Arc::new(snapshot.clone()),
            stamp,
        })));
        debug!(path = %self.path.display(), "Snapshot replaced");
        Ok(())
    }

    #[cfg(test)]
    fn cached(&self) -> Option<Arc<StatsSnapshot>> {
        self.latest
            .load_full()
            .map(|loaded| Arc::clone(&loaded.snapshot))
    }

    /// The latest snapshot on disk.
    ///
    /// Blocking: stats the file on every call and re-reads it whenever it
    /// changed since the copy held in memory. A missing or unreadable file
    /// falls back to the in-memory copy; with nothing in memory either, or a
    /// malformed file, the result is [`SwapiError::StatsNotGenerated`].
    pub fn read_latest(&self) -> Result<Arc<StatsSnapshot>, SwapiError> {
        let current = self.latest.load_full();
        let fallback = || {
            current
                .as_ref()
                .map(|loaded| Arc::clone(&loaded.snapshot))
                .ok_or(SwapiError::StatsNotGenerated)
        };

        let stamp = match std::fs::metadata(&self.path) {
            Ok(meta) => FileStamp::of(&meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return fallback(),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to inspect stats snapshot");
                return fallback();
            }
        };
        if let Some(loaded) = &current
            && loaded.stamp == Some(stamp)
        {
            return Ok(Arc::clone(&loaded.snapshot));
        }

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to read stats snapshot");
                return fallback();
            }
        };
        let snapshot: StatsSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Stats snapshot is malformed, ignoring");
                return fallback();
            }
        };

        let snapshot = Arc::new(snapshot);
        let loaded = Arc::new(Loaded {
            snapshot: Arc::clone(&snapshot),
            stamp: Some(stamp),
        });
        // A local write may have landed meanwhile; keep it rather than the file we read.
        let previous = self.latest.compare_and_swap(&current, Some(loaded));
        let replaced = match (&*previous, &current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if replaced {
            debug!(path = %self.path.display(), "Snapshot reloaded from disk");
            Ok(snapshot)
        } else {
            Ok(match &*previous {
                Some(newer) => Arc::clone(&newer.snapshot),
                None => snapshot,
            })
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapi_core::TopQuery;
    use tempfile::tempdir;

    fn snapshot(total: u64) -> StatsSnapshot {
        StatsSnapshot {
            generated_at: "2025-01-15T10:00:00.000Z".into(),
            total_requests: total,
            top_queries: vec![TopQuery {
                query: "luke".into(),
                count: total,
                percentage: 100.0,
            }],
            average_duration_ms: 12.5,
            most_popular_hour: Some(10),
        }
    }

    #[test]
    fn nothing_written_reports_not_generated() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stats.json"));
        assert!(matches!(store.read_latest(), Err(SwapiError::StatsNotGenerated)));
        assert!(store.cached().is_none());
    }

    #[test]
    fn write_then_read_from_memory() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stats.json"));
        store.write(&snapshot(3)).unwrap();
        assert_eq!(*store.read_latest().unwrap(), snapshot(3));
    }

    #[test]
    fn fresh_store_falls_back_to_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        SnapshotStore::new(&path).write(&snapshot(7)).unwrap();

        let reopened = SnapshotStore::new(&path);
        assert!(reopened.cached().is_none());
        assert_eq!(*reopened.read_latest().unwrap(), snapshot(7));
        assert!(reopened.cached().is_some());
    }

    #[test]
    fn write_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage").join("app").join("stats.json");
        SnapshotStore::new(&path).write(&snapshot(1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn no_temp_files_are_left_behind() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stats.json"));
        for i in 0..5 {
            store.write(&snapshot(i)).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["stats.json".to_string()]);
    }

    #[test]
    fn newer_file_from_another_writer_replaces_the_cached_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let cli = SnapshotStore::new(&path);
        let server = SnapshotStore::new(&path);

        cli.write(&snapshot(1)).unwrap();
        assert_eq!(server.read_latest().unwrap().total_requests, 1);

        cli.write(&snapshot(42)).unwrap();
        assert_eq!(server.read_latest().unwrap().total_requests, 42);
        assert_eq!(server.cached().unwrap().total_requests, 42);
    }

    #[test]
    fn file_written_elsewhere_overrides_an_earlier_local_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let server = SnapshotStore::new(&path);
        server.write(&snapshot(3)).unwrap();

        SnapshotStore::new(&path).write(&snapshot(100)).unwrap();
        assert_eq!(server.read_latest().unwrap().total_requests, 100);
    }

    #[test]
    fn removed_file_falls_back_to_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let store = SnapshotStore::new(&path);
        store.write(&snapshot(5)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(store.read_latest().unwrap().total_requests, 5);
    }

    #[test]
    fn malformed_file_reports_not_generated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = SnapshotStore::new(&path);
        assert!(matches!(store.read_latest(), Err(SwapiError::StatsNotGenerated)));
    }

    #[test]
    fn failed_write_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let store = SnapshotStore::new(&path);
        store.write(&snapshot(1)).unwrap();

        // Replace the target with a non-empty directory so the rename fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();

        assert!(store.write(&snapshot(2)).is_err());
        assert_eq!(store.read_latest().unwrap().total_requests, 1);
    }

    #[test]
    fn file_uses_the_documented_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        SnapshotStore::new(&path).write(&snapshot(2)).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in [
            "generated_at",
            "total_requests",
            "top_queries",
            "average_duration_ms",
            "most_popular_hour",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
    }
}
