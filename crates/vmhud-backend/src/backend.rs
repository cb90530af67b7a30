//! Backend facade
//!
//! Wires the pieces together and owns the two background threads:
//!
//! - **poll** (`vmhud-poll`): every `poll_interval`, advance the connection
//!   machine, build a snapshot when due and publish it if it changed
//! - **flush** (`vmhud-flush`): every `flush_interval`, write coalesced drag
//!   gains; drains once more on shutdown
//!
//! All public methods take `&self`, so a `Backend` can sit in an `Arc` and be
//! used from the UI thread and anywhere else at once.

use crate::commands::CommandIntake;
use crate::connection::{Backoff, ConnectionMachine, StatusCell};
use crate::gateway::{NativeRemote, SharedRemote, SimulatedEngine, UnavailableRemote};
use crate::pending::PendingWrites;
use crate::publisher::{SnapshotStore, Subscription};
use crate::snapshot::{PollOutcome, SnapshotBuilder};
use crate::worker::{TickHandler, Worker};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;
use vmhud_core::config::{EngineMode, HudConfig, TimingConfig};
use vmhud_core::{BackendStatus, MatrixSnapshot};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll-thread state: the builder is only ever touched here
struct PollLoop {
    remote: SharedRemote,
    machine: Arc<Mutex<ConnectionMachine>>,
    builder: SnapshotBuilder,
    store: Arc<SnapshotStore>,
}

impl TickHandler for PollLoop {
    fn tick(&mut self, now: Instant) {
        // The machine lock is held for connection bookkeeping only, not for
        // the snapshot reads
        let Some(session) = locked(&self.machine).poll(&self.remote, now) else {
            return;
        };

        match self.builder.poll(&self.remote, &session, now) {
            Ok(PollOutcome::Skipped) => {}
            Ok(PollOutcome::Built(snapshot)) => {
                self.store.offer(snapshot);
            }
            Err(e) => locked(&self.machine).gateway_failed(&self.remote, &e, now),
        }
    }

    fn recover(&mut self, now: Instant) {
        locked(&self.machine).session_lost(&self.remote, "poll tick panicked", now);
    }
}

struct FlushLoop {
    commands: CommandIntake,
}

impl TickHandler for FlushLoop {
    fn tick(&mut self, _now: Instant) {
        self.commands.flush_pending();
    }

    fn recover(&mut self, _now: Instant) {
        // Whatever was taken before the panic is gone; start clean
        let dropped = self.commands.pending().take_strips().len()
            + self.commands.pending().take_buses().len();
        log::warn!("Commands: Flush panicked, dropped {} queued writes", dropped);
    }

    fn finish(&mut self) {
        let written = self.commands.flush_pending();
        if written > 0 {
            log::debug!("Commands: Final flush wrote {} values", written);
        }
    }
}

/// Engine synchronization backend
pub struct Backend {
    remote: SharedRemote,
    timing: TimingConfig,
    status: Arc<StatusCell>,
    machine: Arc<Mutex<ConnectionMachine>>,
    store: Arc<SnapshotStore>,
    commands: CommandIntake,
    workers: Mutex<Vec<Worker>>,
}

impl Backend {
    /// Backend over any remote; `simulated` selects the status reported
    /// while online
    pub fn new(remote: SharedRemote, timing: TimingConfig, simulated: bool) -> Self {
        let status = Arc::new(StatusCell::new(BackendStatus::Connecting));
        let machine = ConnectionMachine::new(
            Backoff::new(timing.backoff_initial(), timing.backoff_max()),
            simulated,
            Arc::clone(&status),
        );
        let commands = CommandIntake::new(remote.clone(), Arc::new(PendingWrites::new()));

        Self {
            remote,
            timing,
            status,
            machine: Arc::new(Mutex::new(machine)),
            store: Arc::new(SnapshotStore::new()),
            commands,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Backend driving a [`SimulatedEngine`]; status reads `Simulated`
    pub fn simulated(engine: SimulatedEngine, timing: TimingConfig) -> Self {
        Self::new(SharedRemote::new(engine), timing, true)
    }

    /// Build the backend described by `config`
    ///
    /// In native mode a library that can't be found is not an error here:
    /// the backend starts, fails to log in and reports `Disconnected`.
    pub fn from_config(config: &HudConfig) -> Self {
        let timing = config.timing.clone();
        match config.engine.mode {
            EngineMode::Simulated => {
                let kind = config.engine.simulated_kind.engine_kind();
                log::info!("Backend: Using simulated {:?} engine", kind);
                Self::simulated(SimulatedEngine::new(kind), timing)
            }
            EngineMode::Native => {
                let remote = match NativeRemote::discover(config.engine.library_path.as_deref()) {
                    Ok(native) => SharedRemote::new(native),
                    Err(e) => {
                        log::error!("Backend: {}", e);
                        SharedRemote::new(UnavailableRemote::new(e.to_string()))
                    }
                };
                Self::new(remote, timing, false)
            }
        }
    }

    /// Log in and start the poll and flush threads
    ///
    /// Calling `start` again while running only retries a parked login.
    pub fn start(&self) {
        let mut workers = locked(&self.workers);
        locked(&self.machine).start(&self.remote, Instant::now());

        if !workers.is_empty() {
            return;
        }

        let poll = PollLoop {
            remote: self.remote.clone(),
            machine: Arc::clone(&self.machine),
            builder: SnapshotBuilder::new(self.timing.full_refresh()),
            store: Arc::clone(&self.store),
        };
        let flush = FlushLoop {
            commands: self.commands.clone(),
        };

        let spawned = [
            Worker::spawn(
                "vmhud-poll",
                self.timing.poll_start_delay(),
                self.timing.poll_interval(),
                poll,
            ),
            Worker::spawn(
                "vmhud-flush",
                self.timing.flush_interval(),
                self.timing.flush_interval(),
                flush,
            ),
        ];
        for worker in spawned {
            match worker {
                Ok(worker) => workers.push(worker),
                Err(e) => log::error!("Backend: Failed to spawn worker thread: {}", e),
            }
        }

        log::info!("Backend: Started ({})", self.status().label());
    }

    /// Stop both threads (bounded wait), flush what's queued and log out
    ///
    /// Safe to call repeatedly; only the first call after a `start` does
    /// anything beyond re-asserting `Disconnected`.
    ///
    /// If a worker is still busy at the deadline it is detached. It may be
    /// stuck in a native call with the connection machine locked, so logout is
    /// skipped rather than waited for in that case.
    pub fn stop(&self) {
        let workers = std::mem::take(&mut *locked(&self.workers));
        let deadline = Instant::now() + self.timing.stop_timeout();
        let running = !workers.is_empty();
        let mut detached = false;
        for worker in workers {
            detached |= !worker.stop(deadline);
        }

        let machine = if detached {
            match self.machine.try_lock() {
                Ok(machine) => Some(machine),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            }
        } else {
            Some(locked(&self.machine))
        };
        match machine {
            Some(mut machine) => machine.stop(&self.remote),
            None => {
                log::warn!("Backend: Poll thread holds the connection, skipping logout");
                self.status.set(BackendStatus::Disconnected);
            }
        }

        if running {
            log::info!("Backend: Stopped");
        }
    }

    /// Most recently published snapshot (empty before the first read)
    pub fn snapshot(&self) -> Arc<MatrixSnapshot> {
        self.store.current()
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    pub fn status(&self) -> BackendStatus {
        self.status.get()
    }

    /// `Connected` or `Simulated`
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Command handle that can be moved to another thread
    pub fn commands(&self) -> CommandIntake {
        self.commands.clone()
    }

    pub fn set_route(&self, strip: usize, bus_index: usize, enabled: bool) -> bool {
        self.commands.set_route(strip, bus_index, enabled)
    }

    pub fn set_strip_gain(&self, strip: usize, db: f32) -> bool {
        self.commands.set_strip_gain(strip, db)
    }

    pub fn set_bus_gain(&self, bus_index: usize, db: f32) -> bool {
        self.commands.set_bus_gain(bus_index, db)
    }

    pub fn queue_strip_gain(&self, strip: usize, db: f32) {
        self.commands.queue_strip_gain(strip, db);
    }

    pub fn queue_bus_gain(&self, bus_index: usize, db: f32) {
        self.commands.queue_bus_gain(bus_index, db);
    }

    pub fn commit_strip_gain(&self, strip: usize, db: f32) -> bool {
        self.commands.commit_strip_gain(strip, db)
    }

    pub fn commit_bus_gain(&self, bus_index: usize, db: f32) -> bool {
        self.commands.commit_bus_gain(bus_index, db)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("remote", &self.remote.describe())
            .field("status", &self.status())
            .field("subscribers", &self.store.hub().subscriber_count())
            .finish_non_exhaustive()
    }
}
