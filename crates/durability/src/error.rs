//! Snapshot-side error types.

use std::io;
use thiserror::Error;

use crate::record::RecordError;

/// Errors surfaced by the snapshot controller and its run machinery.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// I/O failure on the output file (open, write, sync, seek).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A single record would not fit the snapshot buffer even when empty.
    #[error("record of {need} bytes exceeds snapshot buffer capacity {capacity}")]
    RecordTooLarge {
        /// Bytes the record needs.
        need: usize,
        /// Total buffer capacity.
        capacity: usize,
    },

    /// A record failed to encode.
    #[error("failed to encode record: {0}")]
    Record(#[from] RecordError),

    /// A run is already in progress. The original run is untouched.
    #[error("snapshot already running")]
    AlreadyRunning,

    /// The subsystem has been shut down; no further runs are accepted.
    #[error("snapshot subsystem is shut down")]
    ShutDown,

    /// The run finished unsuccessfully. Runs are binary success/failure;
    /// the authoritative cause was logged by the run driver.
    #[error("snapshot run failed")]
    RunFailed,

    /// The background worker thread could not be spawned.
    #[error("failed to spawn snapshot worker")]
    WorkerSpawn(#[source] io::Error),
}
