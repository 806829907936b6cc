//! Append-only per-flow log writer (spec §4.3).
//!
//! Mirrors `original_source/module_libs/log_utils.py::write_to_log`: one
//! file per four-tuple under `logs/MM-DD-YYYY/`, one record per line.
//! Modules call this synchronously (spec §4.2: modules are invoked from a
//! single thread per connection and never await); concurrent writers to
//! the same path are serialized through a mutex keyed by path, held in a
//! `DashMap` the way the teacher keeps connection/consumer state
//! (`relays/domains/signal/src/relay.rs`).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::types::FourTuple;

/// Process-wide handle, installed once by the binary at startup
/// (`main`/`ConnectionBroker::new`) so that built-in [`Module`](crate::Module)
/// impls can reach the sink without threading it through every
/// `transform` call — `Module::transform`'s signature is fixed by
/// spec §4.2 and carries no sink parameter.
static GLOBAL: OnceCell<LogSink> = OnceCell::new();

/// Install the process-wide sink. Called once from `main`; a second call
/// is a no-op (the first installation wins).
pub fn install_global(sink: LogSink) {
    let _ = GLOBAL.set(sink);
}

/// The process-wide sink, if one has been installed. Modules running
/// outside of `main` (unit tests, the identity-pipeline property tests)
/// see `None` and simply skip logging rather than panicking.
pub fn global() -> Option<&'static LogSink> {
    GLOBAL.get()
}

/// Append-only writer to `<root>/MM-DD-YYYY/<src>-<sp>-<dst>-<dp>.log`.
///
/// Failure to create a directory or open a file is non-fatal: the record
/// is dropped and a warning is emitted (spec §7, `LogWriteError`).
#[derive(Clone)]
pub struct LogSink {
    root: PathBuf,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LogSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Append `text` plus a trailing newline to the log file routed by
    /// `tuple`. The directory date is computed at write time (spec §4.3).
    pub fn write(&self, tuple: FourTuple, text: &str) {
        let dir = self.root.join(Self::today_dir_name());
        let path = dir.join(format!("{}.log", tuple.file_stem()));

        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(?dir, error = %e, "failed to create log directory, dropping record");
            return;
        }

        let lock = self
            .locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Err(e) = Self::append_line(&path, text) {
            warn!(?path, error = %e, "failed to write log record, dropping it");
        }
    }

    fn append_line(path: &Path, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    fn today_dir_name() -> String {
        chrono::Local::now().format("%m-%d-%Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn tuple() -> FourTuple {
        FourTuple {
            src_addr: "127.0.0.1".parse::<IpAddr>().unwrap(),
            src_port: 1111,
            dst_addr: "127.0.0.1".parse::<IpAddr>().unwrap(),
            dst_port: 2222,
        }
    }

    #[test]
    fn writes_create_dated_directory_and_append_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path());

        sink.write(tuple(), "first");
        sink.write(tuple(), "second");

        let today = LogSink::today_dir_name();
        let log_path = dir
            .path()
            .join(today)
            .join("127.0.0.1-1111-127.0.0.1-2222.log");
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn unwritable_root_drops_record_without_panicking() {
        // Pointing the root at a path component that is itself a file
        // makes create_dir_all fail; write() must swallow the error.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = LogSink::new(blocker.join("nested"));

        sink.write(tuple(), "dropped");
    }
}
