//! Per-mode record producers for a snapshot run.
//!
//! Each snapshot mode maps to one encoding strategy with a `dump` step
//! (called per scanned batch) and a `done` step (called once at scan
//! exhaustion to emit the terminal/summary record and force the final
//! flush). The strategies are a closed set: new modes add variants here.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use embercache_core::{ElemsResult, Expiry, Item};

use crate::buffer::SnapshotBuffer;
use crate::error::SnapshotError;
use crate::mode::SnapshotMode;
use crate::record::{self, RecordHeader, RecordKind, RECORD_HEADER_SIZE};

/// Inputs to the completion step.
pub(crate) struct DoneContext<'a> {
    /// Human-readable prefix description (`<all>`, `<null>`, or literal).
    pub prefix_desc: &'a str,
    /// Items snapshotted by this run.
    pub snapped: u64,
    /// Seconds since the run started.
    pub elapsed_secs: u64,
}

/// The active encoding strategy of a run, selected by mode.
pub(crate) enum Encoder {
    KeyListing(KeyListingEncoder),
    DataLog(DataLogEncoder),
}

impl Encoder {
    pub(crate) fn for_mode(mode: SnapshotMode) -> Self {
        match mode {
            SnapshotMode::Key => Encoder::KeyListing(KeyListingEncoder::new()),
            SnapshotMode::Data | SnapshotMode::Checkpoint => {
                Encoder::DataLog(DataLogEncoder::new())
            }
        }
    }

    /// Encode one batch of items. `snapped` is bumped per item as it is
    /// encoded, so a mid-batch failure still accounts for earlier items.
    pub(crate) fn dump(
        &mut self,
        buffer: &mut SnapshotBuffer,
        file: &mut File,
        items: &[Arc<Item>],
        elems: Option<&[ElemsResult]>,
        now: u32,
        snapped: &AtomicU64,
    ) -> Result<(), SnapshotError> {
        match self {
            Encoder::KeyListing(enc) => enc.dump(buffer, file, items, now, snapped),
            Encoder::DataLog(enc) => enc.dump(buffer, file, items, elems, snapped),
        }
    }

    /// Emit the terminal/summary record, then flush and sync the file.
    pub(crate) fn done(
        &mut self,
        buffer: &mut SnapshotBuffer,
        file: &mut File,
        ctx: &DoneContext<'_>,
    ) -> Result<(), SnapshotError> {
        match self {
            Encoder::KeyListing(enc) => enc.done(buffer, file, ctx),
            Encoder::DataLog(enc) => enc.done(buffer, file),
        }
    }
}

/// Key-listing strategy: one human-readable line per item.
///
/// Line format: `"<T> <key> <exp>\n"` where `<T>` is the one-character
/// item-type tag and `<exp>` is `0` (never expires), `-1` (sticky), or the
/// remaining seconds until expiry, floored at 1.
pub(crate) struct KeyListingEncoder {
    line: Vec<u8>,
}

impl KeyListingEncoder {
    fn new() -> Self {
        KeyListingEncoder {
            line: Vec::with_capacity(256),
        }
    }

    fn dump(
        &mut self,
        buffer: &mut SnapshotBuffer,
        file: &mut File,
        items: &[Arc<Item>],
        now: u32,
        snapped: &AtomicU64,
    ) -> Result<(), SnapshotError> {
        for item in items {
            self.line.clear();
            self.line.push(item.item_type.tag() as u8);
            self.line.push(b' ');
            self.line.extend_from_slice(&item.key);
            self.line.push(b' ');
            match item.expiry {
                Expiry::Never => self.line.extend_from_slice(b"0"),
                Expiry::Sticky => self.line.extend_from_slice(b"-1"),
                Expiry::At(at) => {
                    // Floor at 1 so an item expiring at exactly the current
                    // tick never encodes as zero or negative.
                    let remaining = if at > now { at - now } else { 1 };
                    write!(self.line, "{}", remaining)?;
                }
            }
            self.line.push(b'\n');

            buffer.ensure_space(file, self.line.len())?;
            buffer.push(&self.line);
            snapped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn done(
        &mut self,
        buffer: &mut SnapshotBuffer,
        file: &mut File,
        ctx: &DoneContext<'_>,
    ) -> Result<(), SnapshotError> {
        let summary = format!(
            "SNAPSHOT SUMMARY: {{ prefix={}, count={}, elapsed={} }}\n",
            ctx.prefix_desc, ctx.snapped, ctx.elapsed_secs
        );
        buffer.ensure_space(file, summary.len())?;
        buffer.push(summary.as_bytes());
        buffer.flush(file)
    }
}

/// Data-log strategy: one binary `ItemLink` record per item, followed by
/// one `CollectionElement` record per element for collection items, in
/// provider order. Each record is space-checked individually so the file
/// grows incrementally instead of materializing the record set in memory.
pub(crate) struct DataLogEncoder {
    body: Vec<u8>,
}

impl DataLogEncoder {
    fn new() -> Self {
        DataLogEncoder {
            body: Vec::with_capacity(4096),
        }
    }

    fn dump(
        &mut self,
        buffer: &mut SnapshotBuffer,
        file: &mut File,
        items: &[Arc<Item>],
        elems: Option<&[ElemsResult]>,
        snapped: &AtomicU64,
    ) -> Result<(), SnapshotError> {
        for (slot, item) in items.iter().enumerate() {
            record::encode_item_link(item, &mut self.body)?;
            let header = RecordHeader {
                kind: RecordKind::ItemLink,
                body_len: self.body.len() as u32,
            };
            buffer.ensure_space(file, RECORD_HEADER_SIZE + self.body.len())?;
            buffer.push(&header.to_bytes());
            buffer.push(&self.body);

            if item.is_collection() {
                if let Some(holders) = elems {
                    for elem in &holders[slot].elements {
                        record::check_body_len(elem.payload.len())?;
                        let header = RecordHeader {
                            kind: RecordKind::CollectionElement,
                            body_len: elem.payload.len() as u32,
                        };
                        buffer.ensure_space(file, RECORD_HEADER_SIZE + elem.payload.len())?;
                        buffer.push(&header.to_bytes());
                        buffer.push(&elem.payload);
                    }
                }
            }
            snapped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn done(&mut self, buffer: &mut SnapshotBuffer, file: &mut File) -> Result<(), SnapshotError> {
        let terminal = record::terminal_record();
        buffer.ensure_space(file, terminal.len())?;
        buffer.push(&terminal);
        buffer.flush(file)
    }
}
