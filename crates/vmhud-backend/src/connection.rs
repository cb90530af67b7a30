//! Engine connection state machine
//!
//! Owns the login lifecycle: initial login on start, retry with exponential
//! backoff while the engine is launching, reconnect after the session is
//! lost, and a single logout on stop. The poll loop drives it once per tick.
//!
//! ```text
//!            start ──► login ok ─────────────► Online ──► stop ──► Idle
//!              │         │                      │
//!              │    not ready yet         session lost
//!              │         ▼                      ▼
//!              │      Retrying ◄──── backoff ── Retrying (immediate)
//!              │
//!         engine absent ──► Parked (until the next start)
//! ```

use crate::error::GatewayError;
use crate::gateway::{LoginCode, SharedRemote};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vmhud_core::{BackendStatus, Topology};

/// Published connection status, readable from any thread without locking
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: BackendStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> BackendStatus {
        BackendStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: BackendStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Exponential reconnect delay: `initial`, doubling, capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// One logged-in engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Increments on every successful login; lets readers notice a reconnect
    pub id: u64,
    pub topology: Topology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started, or stopped
    Idle,
    /// Waiting to retry login
    Retrying { next_attempt: Instant },
    Online(Session),
    /// Engine absent at start; no retries until started again
    Parked,
}

enum LoginFailure {
    /// Library missing or engine refused the login outright
    Absent(String),
    /// Engine is there but not ready to answer yet
    NotReady(String),
}

fn attempt_login(remote: &SharedRemote) -> Result<Topology, LoginFailure> {
    match remote.login() {
        Ok(LoginCode::Ready) => {}
        Ok(LoginCode::Launching(code)) => {
            log::debug!("Connection: Login returned {}, engine still launching", code);
        }
        Ok(LoginCode::NotInstalled(code)) => {
            return Err(LoginFailure::Absent(format!("login returned {}", code)));
        }
        Err(e) if e.is_session_fatal() => return Err(LoginFailure::Absent(e.to_string())),
        Err(e) => return Err(LoginFailure::NotReady(e.to_string())),
    }

    let kind = match remote.engine_kind() {
        Ok(kind) => kind,
        Err(e) => {
            // The engine refuses a second login until this one is released
            release(remote);
            return Err(if e.is_session_fatal() {
                LoginFailure::Absent(e.to_string())
            } else {
                LoginFailure::NotReady(e.to_string())
            });
        }
    };
    Ok(kind.topology())
}

/// Best-effort logout; the result only matters for logs
fn release(remote: &SharedRemote) {
    if let Err(e) = remote.logout() {
        log::debug!("Connection: Logout failed: {}", e);
    }
}

/// Connection lifecycle with reconnect backoff
#[derive(Debug)]
pub struct ConnectionMachine {
    phase: Phase,
    backoff: Backoff,
    /// Report `Simulated` instead of `Connected` while online
    simulated: bool,
    sessions: u64,
    status: Arc<StatusCell>,
}

impl ConnectionMachine {
    pub fn new(backoff: Backoff, simulated: bool, status: Arc<StatusCell>) -> Self {
        status.set(BackendStatus::Connecting);
        Self {
            phase: Phase::Idle,
            backoff,
            simulated,
            sessions: 0,
            status,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> BackendStatus {
        self.status.get()
    }

    /// Current session, if logged in
    pub fn session(&self) -> Option<Session> {
        match self.phase {
            Phase::Online(session) => Some(session),
            _ => None,
        }
    }

    /// Initial login. A second call while online is a no-op.
    pub fn start(&mut self, remote: &SharedRemote, now: Instant) {
        if let Phase::Online(_) = self.phase {
            log::debug!("Connection: Already online");
            return;
        }

        self.backoff.reset();
        self.status.set(BackendStatus::Connecting);
        log::info!("Connection: Logging in to {}", remote.describe());

        match attempt_login(remote) {
            Ok(topology) => {
                self.go_online(topology);
            }
            Err(LoginFailure::Absent(reason)) => {
                log::warn!("Connection: Engine not available ({}), staying disconnected", reason);
                self.phase = Phase::Parked;
                self.status.set(BackendStatus::Disconnected);
            }
            Err(LoginFailure::NotReady(reason)) => {
                let delay = self.backoff.next_delay();
                log::info!(
                    "Connection: Engine not ready ({}), retrying in {}ms",
                    reason,
                    delay.as_millis()
                );
                self.phase = Phase::Retrying {
                    next_attempt: now + delay,
                };
            }
        }
    }

    /// Advance the machine; returns the live session, if any
    ///
    /// While retrying, a login attempt is made only once the backoff delay
    /// has elapsed. Every failed attempt (absent or not ready) doubles the
    /// delay up to the cap.
    pub fn poll(&mut self, remote: &SharedRemote, now: Instant) -> Option<Session> {
        match self.phase {
            Phase::Online(session) => Some(session),
            Phase::Idle | Phase::Parked => None,
            Phase::Retrying { next_attempt } if now < next_attempt => None,
            Phase::Retrying { .. } => match attempt_login(remote) {
                Ok(topology) => Some(self.go_online(topology)),
                Err(LoginFailure::Absent(reason)) | Err(LoginFailure::NotReady(reason)) => {
                    let delay = self.backoff.next_delay();
                    log::debug!(
                        "Connection: Reconnect failed ({}), next attempt in {}ms",
                        reason,
                        delay.as_millis()
                    );
                    self.status.set(BackendStatus::Connecting);
                    self.phase = Phase::Retrying {
                        next_attempt: now + delay,
                    };
                    None
                }
            },
        }
    }

    /// The session died (fatal gateway error or a panicking tick)
    ///
    /// The dead session is logged out so the engine accepts the next login.
    /// Status drops to `Disconnected`; the next poll tries to log in again
    /// straight away, starting a fresh backoff sequence.
    pub fn session_lost(&mut self, remote: &SharedRemote, reason: &str, now: Instant) {
        if !matches!(self.phase, Phase::Online(_)) {
            return;
        }
        log::warn!("Connection: Session lost: {}", reason);
        release(remote);
        self.backoff.reset();
        self.status.set(BackendStatus::Disconnected);
        self.phase = Phase::Retrying { next_attempt: now };
    }

    /// Convenience for gateway errors
    pub fn gateway_failed(&mut self, remote: &SharedRemote, error: &GatewayError, now: Instant) {
        self.session_lost(remote, &error.to_string(), now);
    }

    /// Log out if logged in; always ends `Idle` + `Disconnected`
    pub fn stop(&mut self, remote: &SharedRemote) {
        if let Phase::Online(_) = self.phase {
            match remote.logout() {
                Ok(()) => log::info!("Connection: Logged out"),
                Err(e) => log::debug!("Connection: Logout failed: {}", e),
            }
        }
        self.phase = Phase::Idle;
        self.status.set(BackendStatus::Disconnected);
    }

    fn go_online(&mut self, topology: Topology) -> Session {
        self.sessions += 1;
        let session = Session {
            id: self.sessions,
            topology,
        };
        self.backoff.reset();
        self.phase = Phase::Online(session);
        self.status.set(if self.simulated {
            BackendStatus::Simulated
        } else {
            BackendStatus::Connected
        });
        log::info!(
            "Connection: Online ({:?}, {} strips, {} physical, {} buses)",
            topology.kind,
            topology.strips,
            topology.physical_inputs,
            topology.buses()
        );
        session
    }
}
