//! In-process simulated engine
//!
//! Behaves like the remote API of a running engine: a parameter store seeded
//! for the chosen variant's topology, a dirty flag that is set by every
//! change and cleared when queried, and return codes for unknown names.
//! Cloning yields another handle to the same engine, so a caller can hand one
//! clone to the backend and keep another to drive or inspect it.

use super::{LoginCode, RemoteApi};
use crate::error::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vmhud_core::{params, Bus, EngineKind};

/// Return code the engine uses for an unknown parameter name
const UNKNOWN_PARAMETER: i32 = -3;

/// Return code for calls made while the engine isn't ready
const NOT_READY: i32 = -1;

/// Login return code for a client that is already logged in
const LOGOUT_EXPECTED: i32 = -2;

/// Call counters, for diagnostics and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedStats {
    pub logins: usize,
    pub logouts: usize,
    pub dirty_queries: usize,
    pub float_reads: usize,
    pub string_reads: usize,
    /// Every accepted write, in call order
    pub writes: Vec<(String, f32)>,
}

impl SimulatedStats {
    /// Parameter reads of either kind
    pub fn reads(&self) -> usize {
        self.float_reads + self.string_reads
    }
}

#[derive(Debug)]
struct SimState {
    kind: EngineKind,
    installed: bool,
    not_ready_queries: u32,
    dirty_query_fails: bool,
    lost: bool,
    logged_in: bool,
    dirty: bool,
    floats: HashMap<String, f32>,
    strings: HashMap<String, String>,
    stats: SimulatedStats,
}

impl SimState {
    fn new(kind: EngineKind) -> Self {
        let mut floats = HashMap::new();
        let mut strings = HashMap::new();

        for strip in 0..kind.topology().strips {
            for bus in Bus::ALL {
                floats.insert(params::strip_route(strip, bus), 0.0);
            }
            floats.insert(params::strip_gain(strip), 0.0);
            strings.insert(params::strip_label(strip), String::new());
        }
        for bus in Bus::ALL {
            floats.insert(params::bus_gain(bus), 0.0);
            strings.insert(params::bus_label(bus), String::new());
        }

        Self {
            kind,
            installed: true,
            not_ready_queries: 0,
            dirty_query_fails: false,
            lost: false,
            logged_in: false,
            dirty: true,
            floats,
            strings,
            stats: SimulatedStats::default(),
        }
    }

    fn ensure_alive(&self) -> GatewayResult<()> {
        if self.lost {
            Err(GatewayError::EngineLost)
        } else {
            Ok(())
        }
    }
}

/// Simulated engine handle
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    /// Engine of the given variant with every parameter at 0 and empty labels
    pub fn new(kind: EngineKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(kind))),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `false` makes login report "not installed"
    pub fn set_installed(&self, installed: bool) {
        self.state().installed = installed;
    }

    /// Number of upcoming engine-type queries that fail as "not ready"
    pub fn set_not_ready_queries(&self, count: u32) {
        self.state().not_ready_queries = count;
    }

    /// Make dirty-flag queries return an error
    pub fn set_dirty_query_fails(&self, fails: bool) {
        self.state().dirty_query_fails = fails;
    }

    /// Simulate the engine process going away (every call fails fatally)
    pub fn set_lost(&self, lost: bool) {
        let mut state = self.state();
        state.lost = lost;
        if lost {
            state.logged_in = false;
        }
    }

    /// Change a float parameter from the engine side (e.g. the engine's own UI)
    ///
    /// Returns false if the parameter doesn't exist for this variant.
    pub fn set_param(&self, name: &str, value: f32) -> bool {
        let mut guard = self.state();
        let state = &mut *guard;
        match state.floats.get_mut(name) {
            Some(slot) => {
                *slot = value;
                state.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Change a label from the engine side
    pub fn set_label(&self, name: &str, value: &str) -> bool {
        let mut guard = self.state();
        let state = &mut *guard;
        match state.strings.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                state.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Raise the dirty flag without changing anything
    pub fn mark_dirty(&self) {
        self.state().dirty = true;
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.state().floats.get(name).copied()
    }

    pub fn label(&self, name: &str) -> Option<String> {
        self.state().strings.get(name).cloned()
    }

    pub fn kind(&self) -> EngineKind {
        self.state().kind
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().logged_in
    }

    pub fn stats(&self) -> SimulatedStats {
        self.state().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.state().stats = SimulatedStats::default();
    }
}

impl RemoteApi for SimulatedEngine {
    fn describe(&self) -> String {
        format!("simulated {:?}", self.kind())
    }

    fn login(&self) -> GatewayResult<LoginCode> {
        let mut state = self.state();
        state.ensure_alive()?;
        state.stats.logins += 1;
        if !state.installed {
            return Ok(LoginCode::NotInstalled(-1));
        }
        if state.logged_in {
            return Ok(LoginCode::NotInstalled(LOGOUT_EXPECTED));
        }
        state.logged_in = true;
        state.dirty = true;
        if state.not_ready_queries > 0 {
            Ok(LoginCode::Launching(1))
        } else {
            Ok(LoginCode::Ready)
        }
    }

    fn logout(&self) -> GatewayResult<()> {
        let mut state = self.state();
        state.stats.logouts += 1;
        state.logged_in = false;
        Ok(())
    }

    fn engine_kind(&self) -> GatewayResult<EngineKind> {
        let mut state = self.state();
        state.ensure_alive()?;
        if !state.logged_in || state.not_ready_queries > 0 {
            state.not_ready_queries = state.not_ready_queries.saturating_sub(1);
            return Err(GatewayError::Call {
                call: "GetVoicemeeterType",
                code: NOT_READY,
            });
        }
        Ok(state.kind)
    }

    fn is_dirty(&self) -> GatewayResult<bool> {
        let mut state = self.state();
        state.ensure_alive()?;
        state.stats.dirty_queries += 1;
        if state.dirty_query_fails {
            return Err(GatewayError::Call {
                call: "IsParametersDirty",
                code: NOT_READY,
            });
        }
        Ok(std::mem::take(&mut state.dirty))
    }

    fn get_float(&self, name: &str) -> GatewayResult<f32> {
        let mut state = self.state();
        state.ensure_alive()?;
        state.stats.float_reads += 1;
        state.floats.get(name).copied().ok_or(GatewayError::Call {
            call: "GetParameterFloat",
            code: UNKNOWN_PARAMETER,
        })
    }

    fn get_string(&self, name: &str) -> GatewayResult<String> {
        let mut state = self.state();
        state.ensure_alive()?;
        state.stats.string_reads += 1;
        state.strings.get(name).cloned().ok_or(GatewayError::Call {
            call: "GetParameterString",
            code: UNKNOWN_PARAMETER,
        })
    }

    fn set_float(&self, name: &str, value: f32) -> GatewayResult<()> {
        let mut state = self.state();
        state.ensure_alive()?;
        match state.floats.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                return Err(GatewayError::Call {
                    call: "SetParameterFloat",
                    code: UNKNOWN_PARAMETER,
                })
            }
        }
        state.dirty = true;
        state.stats.writes.push((name.to_string(), value));
        Ok(())
    }
}
