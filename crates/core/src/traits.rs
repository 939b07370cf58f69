//! Traits at the boundary between the snapshot subsystem and the engine.
//!
//! These traits let the snapshot code drive the item hash table, the
//! collection subsystem, the command-log manager, and the recovery redo
//! path without depending on their implementations.

use std::sync::Arc;

use crate::error::RedoError;
use crate::item::{Element, ElemsResult, Item};

/// Result of one scan probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The scanner could not allocate memory. The caller must abort.
    OutOfMemory,
    /// The scan reached the end of the keyspace.
    Exhausted,
    /// `n` items were produced into the batch. `n` may be zero when the
    /// probe matched nothing but the scan is not yet exhausted; the caller
    /// simply probes again.
    Matched(usize),
}

/// Iterator over candidate items for a key prefix.
///
/// Liveness contract: a conforming scanner eventually reports
/// [`ScanOutcome::Exhausted`] or [`ScanOutcome::OutOfMemory`]; it never
/// returns [`ScanOutcome::Matched`] forever.
pub trait ItemScanner {
    /// Produce the next batch of up to `limit` items into `items`.
    ///
    /// When `elems` is provided it has at least `limit` slots; for every
    /// collection item placed at index `i`, the scanner fills `elems[i]`
    /// with that item's elements in collection order. The caller resets the
    /// holders between batches.
    fn next_batch(
        &mut self,
        limit: usize,
        items: &mut Vec<Arc<Item>>,
        elems: Option<&mut [ElemsResult]>,
    ) -> ScanOutcome;
}

/// The engine surface the snapshot subsystem runs against.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires `Send + Sync`); the snapshot worker and the
/// serving path both hold a reference.
pub trait SnapshotEngine: Send + Sync {
    /// Whether the engine is (still) initialized. Replay stops when this
    /// turns false mid-stream.
    fn is_initialized(&self) -> bool;

    /// Current engine logical time in seconds.
    fn current_time(&self) -> u32;

    /// Open an item scan restricted to `prefix`.
    ///
    /// `None` scans the whole keyspace; `Some(b"")` restricts the scan to
    /// null-prefix items; any other value is a literal key prefix.
    fn open_scan(&self, prefix: Option<&[u8]>) -> Box<dyn ItemScanner>;

    /// Tell the command-log manager that a checkpoint scan is starting, so
    /// it can track the checkpoint's scan boundary. Only invoked for
    /// checkpoint-mode snapshots.
    fn begin_checkpoint_scan(&self) {}

    /// Tell the command-log manager that the checkpoint scan ended, and
    /// whether it ran to completion. Only invoked for checkpoint-mode
    /// snapshots.
    fn end_checkpoint_scan(&self, _completed: bool) {}

    /// Reconstruct (link) an item from a persisted record.
    ///
    /// Returns the linked item when it is collection-typed — whether newly
    /// created or already present — so the replayer can attach subsequent
    /// element records to it. Returns `None` for plain items.
    fn redo_item_link(&self, item: Item) -> Result<Option<Arc<Item>>, RedoError>;

    /// Attach one element to a previously linked collection item.
    fn redo_collection_element(
        &self,
        owner: &Arc<Item>,
        element: Element,
    ) -> Result<(), RedoError>;
}
