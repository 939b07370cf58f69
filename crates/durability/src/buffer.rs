//! Bounded streaming write buffer backing one open snapshot file.
//!
//! The buffer is allocated once at service construction and reused across
//! runs. All writes are append-only to the currently open file; overflow
//! triggers a synchronous flush, and run completion forces a durability
//! barrier. Any write or sync failure aborts the run — already-written
//! bytes stay on disk and a later validity check rejects the partial file.

use std::fs::File;
use std::io::Write;

use tracing::warn;

use crate::error::SnapshotError;

/// Fixed-capacity byte buffer between record encoders and the output file.
pub struct SnapshotBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl SnapshotBuffer {
    /// Allocate a buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        SnapshotBuffer {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn filled(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered bytes. Called only when preparing a new run.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Make room for `need` more bytes, flushing current contents to
    /// `file` when they would overflow the capacity.
    ///
    /// A record larger than the whole buffer is rejected outright instead
    /// of overflowing; the run aborts through the normal failure path.
    pub fn ensure_space(&mut self, file: &mut File, need: usize) -> Result<(), SnapshotError> {
        if need > self.capacity {
            return Err(SnapshotError::RecordTooLarge {
                need,
                capacity: self.capacity,
            });
        }
        if self.buf.len() + need > self.capacity {
            self.write_out(file)?;
        }
        Ok(())
    }

    /// Append bytes. The caller must have reserved space with
    /// [`SnapshotBuffer::ensure_space`] first.
    pub fn push(&mut self, bytes: &[u8]) {
        debug_assert!(self.buf.len() + bytes.len() <= self.capacity);
        self.buf.extend_from_slice(bytes);
    }

    /// Write any buffered bytes, then force a durability barrier on the
    /// file. Called at run completion and on overflow.
    pub fn flush(&mut self, file: &mut File) -> Result<(), SnapshotError> {
        if !self.buf.is_empty() {
            self.write_out(file)?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn write_out(&mut self, file: &mut File) -> Result<(), SnapshotError> {
        if let Err(e) = file.write_all(&self.buf) {
            warn!(
                requested = self.buf.len(),
                error = %e,
                "failed to write the snapshot buffer"
            );
            return Err(SnapshotError::Io(e));
        }
        self.buf.clear();
        Ok(())
    }
}
