//! Snapshot persistence for the cache engine.
//!
//! This crate writes point-in-time images of the item hash table to disk
//! and replays them at startup. Three run modes share one machinery: a
//! human-readable key listing, a binary data log of full item contents,
//! and a checkpoint (a data log whose scan boundary is coordinated with
//! the command-log manager so the log can be truncated behind it).
//!
//! The engine side of the boundary is abstracted by
//! [`embercache_core::SnapshotEngine`]; everything here drives that trait.
//!
//! ```no_run
//! use std::sync::Arc;
//! use embercache_durability::{SnapshotConfig, SnapshotMode, SnapshotService};
//! # fn engine() -> Arc<dyn embercache_core::SnapshotEngine> { unimplemented!() }
//!
//! let service = SnapshotService::new(engine(), SnapshotConfig::new());
//! let bytes_written = service.run_direct(SnapshotMode::Data, None, "/var/cache/db.snap".into())?;
//! println!("snapshot complete: {bytes_written} bytes");
//! # Ok::<(), embercache_durability::SnapshotError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffer;
mod config;
mod error;
mod mode;
pub mod record;
mod replay;
mod runner;
mod service;
mod strategy;

pub use config::{SnapshotConfig, DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_SIZE};
pub use error::SnapshotError;
pub use mode::SnapshotMode;
pub use replay::{check_file_validity, replay, ReplayError, ReplayStats};
pub use service::SnapshotService;
