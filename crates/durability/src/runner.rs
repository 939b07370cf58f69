//! The scan-drain run driver.
//!
//! One invocation of [`execute_run`] performs one complete snapshot run:
//! open the output file, pull item batches from the engine's scanner, hand
//! each batch to the mode's encoder, and finish with the terminal record.
//! The driver owns no shared state itself; the controller passes in the
//! stop flag and the snapped counter so both stay externally observable
//! while the run is in flight.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use embercache_core::{ElemsResult, Item, ScanOutcome, SnapshotEngine};
use tracing::{error, info, warn};

use crate::buffer::SnapshotBuffer;
use crate::error::SnapshotError;
use crate::mode::SnapshotMode;
use crate::strategy::{DoneContext, Encoder};

/// Everything that identifies one requested run.
pub(crate) struct RunTicket {
    pub mode: SnapshotMode,
    pub prefix: Option<Vec<u8>>,
    pub path: PathBuf,
}

/// What a finished run looked like, for stats and the caller's status.
pub(crate) struct RunReport {
    pub success: bool,
    pub stopped: bool,
    pub file_size: u64,
    pub elapsed_secs: u64,
}

/// How the scan-drain loop ended.
enum RunEnd {
    Completed,
    Stopped,
}

/// Human-readable description of a scan prefix for logs and stats.
///
/// `None` means the whole keyspace; an empty prefix restricts the scan to
/// null-prefix keys.
pub(crate) fn prefix_desc(prefix: &Option<Vec<u8>>) -> String {
    match prefix {
        None => "<all>".to_string(),
        Some(p) if p.is_empty() => "<null>".to_string(),
        Some(p) => String::from_utf8_lossy(p).into_owned(),
    }
}

fn open_output(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }
    options.open(path)
}

/// Drive one snapshot run to its end.
///
/// Never panics and never returns early without cleanup: whatever the exit
/// path, the element holders are released, the final file size is taken,
/// and the file handle is closed exactly once.
pub(crate) fn execute_run(
    engine: &dyn SnapshotEngine,
    ticket: &RunTicket,
    buffer: &mut SnapshotBuffer,
    batch_size: usize,
    stop: &AtomicBool,
    snapped: &AtomicU64,
) -> RunReport {
    let started = Instant::now();
    buffer.reset();
    snapped.store(0, Ordering::Relaxed);

    info!(
        mode = ticket.mode.as_str(),
        prefix = %prefix_desc(&ticket.prefix),
        path = %ticket.path.display(),
        "snapshot run starting"
    );

    let mut file = match open_output(&ticket.path) {
        Ok(f) => f,
        Err(e) => {
            error!(
                path = %ticket.path.display(),
                error = %e,
                "failed to open the snapshot file"
            );
            return RunReport {
                success: false,
                stopped: false,
                file_size: 0,
                elapsed_secs: started.elapsed().as_secs(),
            };
        }
    };

    // The checkpoint boundary hooks only run once the output file is
    // actually open; an open failure leaves the command log untouched.
    if ticket.mode == SnapshotMode::Checkpoint {
        engine.begin_checkpoint_scan();
    }

    let result = drain_scan(engine, ticket, buffer, &mut file, batch_size, stop, snapped, started);

    let (success, stopped) = match &result {
        Ok(RunEnd::Completed) => (true, false),
        Ok(RunEnd::Stopped) => (false, true),
        Err(e) => {
            error!(
                mode = ticket.mode.as_str(),
                path = %ticket.path.display(),
                error = %e,
                "snapshot run failed"
            );
            (false, false)
        }
    };

    if ticket.mode == SnapshotMode::Checkpoint {
        engine.end_checkpoint_scan(success);
    }

    let file_size = match file.seek(SeekFrom::End(0)) {
        Ok(size) => size,
        Err(e) => {
            warn!(error = %e, "failed to read back the snapshot file size");
            0
        }
    };
    drop(file);

    let elapsed_secs = started.elapsed().as_secs();
    info!(
        mode = ticket.mode.as_str(),
        success,
        stopped,
        snapped = snapped.load(Ordering::Relaxed),
        file_size,
        elapsed_secs,
        "snapshot run finished"
    );

    RunReport {
        success,
        stopped,
        file_size,
        elapsed_secs,
    }
}

#[allow(clippy::too_many_arguments)]
fn drain_scan(
    engine: &dyn SnapshotEngine,
    ticket: &RunTicket,
    buffer: &mut SnapshotBuffer,
    file: &mut File,
    batch_size: usize,
    stop: &AtomicBool,
    snapped: &AtomicU64,
    started: Instant,
) -> Result<RunEnd, SnapshotError> {
    let mut scanner = engine.open_scan(ticket.prefix.as_deref());
    let mut encoder = Encoder::for_mode(ticket.mode);
    let mut items: Vec<Arc<Item>> = Vec::with_capacity(batch_size);
    let mut holders: Option<Vec<ElemsResult>> = ticket
        .mode
        .wants_elements()
        .then(|| (0..batch_size).map(|_| ElemsResult::new()).collect());

    loop {
        if ticket.mode.is_stoppable() && stop.load(Ordering::Acquire) {
            info!(mode = ticket.mode.as_str(), "snapshot run stopped on request");
            return Ok(RunEnd::Stopped);
        }

        items.clear();
        if let Some(holders) = holders.as_mut() {
            for holder in holders.iter_mut() {
                holder.reset();
            }
        }

        match scanner.next_batch(batch_size, &mut items, holders.as_deref_mut()) {
            ScanOutcome::OutOfMemory => {
                error!("item scanner ran out of memory");
                return Err(SnapshotError::RunFailed);
            }
            ScanOutcome::Exhausted => break,
            // A probe can legitimately match nothing; just probe again.
            ScanOutcome::Matched(0) => continue,
            ScanOutcome::Matched(_) => {
                let now = engine.current_time();
                encoder.dump(
                    buffer,
                    file,
                    &items,
                    holders.as_deref(),
                    now,
                    snapped,
                )?;
            }
        }
    }

    let desc = prefix_desc(&ticket.prefix);
    let ctx = DoneContext {
        prefix_desc: &desc,
        snapped: snapped.load(Ordering::Relaxed),
        elapsed_secs: started.elapsed().as_secs(),
    };
    encoder.done(buffer, file, &ctx)?;
    Ok(RunEnd::Completed)
}
