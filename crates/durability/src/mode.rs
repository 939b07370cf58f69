//! Snapshot run modes.

/// What a snapshot run captures, and how it coordinates with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Human-readable key listing: one line per item plus a summary line.
    Key,
    /// Binary log of full item and collection-element contents.
    Data,
    /// Like `Data`, but the scan start/end is coordinated with the
    /// command-log manager to mark a log-truncation boundary. Once
    /// started, a checkpoint run is not externally stoppable.
    Checkpoint,
}

impl SnapshotMode {
    /// Decode the raw mode integer arriving over the engine's command
    /// surface. Out-of-range values are rejected before any state changes.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(SnapshotMode::Key),
            1 => Some(SnapshotMode::Data),
            2 => Some(SnapshotMode::Checkpoint),
            _ => None,
        }
    }

    /// Stat-surface name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotMode::Key => "KEY",
            SnapshotMode::Data => "DATA",
            SnapshotMode::Checkpoint => "CHKPT",
        }
    }

    /// Whether this mode serializes collection elements (and therefore
    /// needs per-slot element holders during the scan).
    pub fn wants_elements(&self) -> bool {
        !matches!(self, SnapshotMode::Key)
    }

    /// Whether an in-progress run of this mode honors stop requests.
    pub fn is_stoppable(&self) -> bool {
        !matches!(self, SnapshotMode::Checkpoint)
    }
}
