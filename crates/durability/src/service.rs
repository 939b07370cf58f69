//! Snapshot controller.
//!
//! [`SnapshotService`] is the only entry point for taking snapshots. It
//! serializes runs (at most one in flight), owns the reusable write
//! buffer, and exposes run state through [`SnapshotService::report_stats`].
//! Direct runs execute on the caller's thread; async runs execute on a
//! dedicated worker thread and report through a completion callback.
//!
//! The state mutex guards only bookkeeping, never the scan itself: a run
//! releases it for the whole scan so status queries and stop requests stay
//! responsive, and re-acquires it to finalize.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use embercache_core::SnapshotEngine;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::buffer::SnapshotBuffer;
use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::mode::SnapshotMode;
use crate::replay::{self, ReplayError, ReplayStats};
use crate::runner::{self, RunReport, RunTicket};

/// Identity of the run currently in flight.
#[derive(Clone)]
struct RunInfo {
    mode: SnapshotMode,
    prefix_desc: String,
    path: PathBuf,
}

/// Outcome of the most recently finished run.
struct LastRun {
    info: RunInfo,
    success: bool,
    elapsed_secs: u64,
}

#[derive(Default)]
struct State {
    shutdown: bool,
    running: Option<RunInfo>,
    last: Option<LastRun>,
}

struct Shared {
    state: Mutex<State>,
    run_done: Condvar,
    stop_requested: AtomicBool,
    snapped: AtomicU64,
    // Allocated once, reused across runs. Locked by the active run for
    // its whole duration; the state mutex serializes runs, so this lock
    // is never contended.
    buffer: Mutex<SnapshotBuffer>,
}

impl Shared {
    /// Move the run out of the running slot and wake every waiter.
    fn finish_run(&self, report: &RunReport) {
        let mut state = self.state.lock();
        if let Some(info) = state.running.take() {
            state.last = Some(LastRun {
                info,
                success: report.success,
                elapsed_secs: report.elapsed_secs,
            });
        }
        self.run_done.notify_all();
    }
}

/// Handle to the snapshot subsystem for one engine instance.
pub struct SnapshotService {
    engine: Arc<dyn SnapshotEngine>,
    shared: Arc<Shared>,
    batch_size: usize,
}

impl SnapshotService {
    /// Create a service bound to `engine`. The write buffer is allocated
    /// here, once, at the configured capacity.
    pub fn new(engine: Arc<dyn SnapshotEngine>, config: SnapshotConfig) -> Self {
        SnapshotService {
            engine,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                run_done: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                snapped: AtomicU64::new(0),
                buffer: Mutex::new(SnapshotBuffer::new(config.buffer_size)),
            }),
            batch_size: config.batch_size,
        }
    }

    /// Run a snapshot synchronously on the caller's thread.
    ///
    /// Returns the resulting file size on success. Fails immediately with
    /// [`SnapshotError::AlreadyRunning`] when a run is in flight, leaving
    /// that run's counters untouched.
    pub fn run_direct(
        &self,
        mode: SnapshotMode,
        prefix: Option<&[u8]>,
        path: PathBuf,
    ) -> Result<u64, SnapshotError> {
        let ticket = self.admit(mode, prefix, path)?;

        let report = {
            let mut buffer = self.shared.buffer.lock();
            runner::execute_run(
                &*self.engine,
                &ticket,
                &mut buffer,
                self.batch_size,
                &self.shared.stop_requested,
                &self.shared.snapped,
            )
        };
        self.shared.finish_run(&report);

        if report.success {
            Ok(report.file_size)
        } else {
            Err(SnapshotError::RunFailed)
        }
    }

    /// Start a snapshot on a background worker thread.
    ///
    /// Returns as soon as the run is admitted and the worker is spawned.
    /// `on_done` is invoked exactly once, from the worker, with the run's
    /// success flag; failures after admission surface only through it and
    /// through [`SnapshotService::report_stats`].
    pub fn run_async<F>(
        &self,
        mode: SnapshotMode,
        prefix: Option<&[u8]>,
        path: PathBuf,
        on_done: F,
    ) -> Result<(), SnapshotError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let ticket = self.admit(mode, prefix, path)?;

        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let batch_size = self.batch_size;
        let spawned = thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || {
                let report = {
                    let mut buffer = shared.buffer.lock();
                    runner::execute_run(
                        &*engine,
                        &ticket,
                        &mut buffer,
                        batch_size,
                        &shared.stop_requested,
                        &shared.snapped,
                    )
                };
                shared.finish_run(&report);
                on_done(report.success);
            });

        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn the snapshot worker");
            // Roll the admission back so a later request can run.
            self.shared.state.lock().running = None;
            return Err(SnapshotError::WorkerSpawn(e));
        }
        Ok(())
    }

    /// Ask the in-flight run (if any) to stop.
    ///
    /// Checkpoint runs ignore stop requests; asking is a no-op. With
    /// `wait` set, blocks until no run is in flight.
    pub fn stop(&self, wait: bool) {
        let mut state = self.shared.state.lock();
        match &state.running {
            None => return,
            Some(info) if !info.mode.is_stoppable() => {
                info!(mode = info.mode.as_str(), "ignoring stop for an unstoppable run");
                return;
            }
            Some(_) => {
                self.shared.stop_requested.store(true, Ordering::Release);
            }
        }
        if wait {
            while state.running.is_some() {
                self.shared.run_done.wait(&mut state);
            }
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running.is_some()
    }

    /// Stop accepting runs, stop the in-flight run if it is stoppable, and
    /// wait for the worker to finish.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        if let Some(info) = &state.running {
            if info.mode.is_stoppable() {
                self.shared.stop_requested.store(true, Ordering::Release);
            }
        }
        while state.running.is_some() {
            self.shared.run_done.wait(&mut state);
        }
        drop(state);
        // No run can start again; release the buffer's memory now instead
        // of at service drop.
        *self.shared.buffer.lock() = SnapshotBuffer::new(0);
    }

    /// Check whether `path` holds a complete snapshot file.
    pub fn check_file_validity(&self, path: &Path) -> (bool, u64) {
        replay::check_file_validity(path)
    }

    /// Replay a snapshot file into the engine's redo path.
    pub fn apply_snapshot_file(&self, path: &Path) -> Result<ReplayStats, ReplayError> {
        replay::replay(&*self.engine, path)
    }

    /// Report snapshot state as flat key/value pairs.
    pub fn report_stats<F>(&self, mut emit: F)
    where
        F: FnMut(&str, &str),
    {
        let state = self.shared.state.lock();
        match &state.running {
            Some(info) => {
                emit("snapshot:status", "running");
                emit("snapshot:mode", info.mode.as_str());
                emit(
                    "snapshot:snapped",
                    &self.shared.snapped.load(Ordering::Relaxed).to_string(),
                );
                emit("snapshot:prefix", &info.prefix_desc);
                emit("snapshot:filepath", &info.path.display().to_string());
            }
            None => {
                emit("snapshot:status", "stopped");
                // Reported as false until a run has succeeded, even before
                // the first run is taken.
                let success = state.last.as_ref().is_some_and(|last| last.success);
                emit("snapshot:success", if success { "true" } else { "false" });
                if let Some(last) = &state.last {
                    emit("snapshot:mode", last.info.mode.as_str());
                    emit("snapshot:last_run", &last.elapsed_secs.to_string());
                    emit(
                        "snapshot:snapped",
                        &self.shared.snapped.load(Ordering::Relaxed).to_string(),
                    );
                    emit("snapshot:prefix", &last.info.prefix_desc);
                    emit("snapshot:filepath", &last.info.path.display().to_string());
                }
            }
        }
    }

    /// Admit a run: flip the running slot under the lock, or fail fast.
    fn admit(
        &self,
        mode: SnapshotMode,
        prefix: Option<&[u8]>,
        path: PathBuf,
    ) -> Result<RunTicket, SnapshotError> {
        let prefix = prefix.map(|p| p.to_vec());
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(SnapshotError::ShutDown);
        }
        if state.running.is_some() {
            return Err(SnapshotError::AlreadyRunning);
        }
        self.shared.stop_requested.store(false, Ordering::Release);
        state.running = Some(RunInfo {
            mode,
            prefix_desc: runner::prefix_desc(&prefix),
            path: path.clone(),
        });
        Ok(RunTicket { mode, prefix, path })
    }
}
