//! Error types for the engine-facing seams.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.

use thiserror::Error;

/// Failure modes of the engine's redo path.
///
/// The redo path reconstructs an item or collection element from a persisted
/// record during recovery. Callers must treat `OutOfMemory` as fatal and may
/// tolerate any other failure (log and continue with the next record).
#[derive(Debug, Error)]
pub enum RedoError {
    /// The engine could not allocate memory for the item or element.
    #[error("redo failed: out of memory")]
    OutOfMemory,

    /// Any other redo failure (bad payload, conflicting state, ...).
    #[error("redo failed: {0}")]
    Failed(String),
}
