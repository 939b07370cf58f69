//! Core types and traits for the embercache engine.
//!
//! This crate defines the seams between the snapshot subsystem and the rest
//! of the engine: the cache-item model that gets serialized, the item-scan
//! iterator contract, and the redo path used during recovery. The hash
//! table, item allocator, and collection data structures live behind these
//! traits and are never touched directly by snapshot code.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod item;
pub mod traits;

pub use error::RedoError;
pub use item::{Element, ElemsResult, Expiry, Item, ItemType, UnknownItemType};
pub use traits::{ItemScanner, ScanOutcome, SnapshotEngine};
