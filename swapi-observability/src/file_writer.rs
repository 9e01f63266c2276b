//! Append-only JSON-lines file writer for the query log.
//!
//! The file is opened lazily in append mode on the first write and kept open.
//! Every call writes its whole batch with a single `write_all` while holding a
//! `Mutex`, so concurrent appenders in this process never interleave partial
//! lines. If a write fails the handle is dropped and reopened on the next call.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub struct LogFileWriter {
    path: PathBuf,
    inner: Mutex<Option<File>>,
}

impl LogFileWriter {
    /// Create a writer for `path`. Nothing is touched on disk until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `lines`, each terminated by `\n`.
    pub fn try_append(&self, lines: &[String]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("query log writer lock poisoned"))?;

        if guard.is_none() {
            *guard = Some(open_append(&self.path)?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(io::Error::other("query log file not open"));
        };

        let result = file.write_all(buf.as_bytes()).and_then(|_| file.flush());
        if result.is_err() {
            *guard = None;
        }
        result
    }

    /// Best-effort append: never fails from the caller's viewpoint.
    ///
    /// Failures are logged and discarded; the return value only reports
    /// whether the lines reached the file.
    pub fn append_best_effort(&self, lines: &[String]) -> bool {
        match self.try_append(lines) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    lines = lines.len(),
                    "Failed to append to query log, entries discarded"
                );
                false
            }
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    info!(path = %path.display(), "Query log file opened");
    debug!(size = file.metadata().map(|m| m.len()).unwrap_or(0), "Existing query log size");
    Ok(file)
}

// ── Tests ────────────────────────────────────────────────────────────────────
