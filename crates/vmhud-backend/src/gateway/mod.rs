//! Native call gateway
//!
//! Everything the backend knows about the engine goes through [`RemoteApi`]:
//! login/logout, engine type, the dirty flag and named float/string
//! parameters. Implementations:
//!
//! - [`NativeRemote`]: the vendor's remote-control DLL loaded with `libloading`
//! - [`SimulatedEngine`]: in-process engine for demo mode and tests
//! - [`UnavailableRemote`]: stand-in when no library could be loaded
//!
//! The engine is not assumed to tolerate concurrent calls, so the backend
//! only ever talks to it through [`SharedRemote`], which serializes calls
//! behind one mutex (held per call, never across business logic).

mod native;
mod simulated;

pub use native::{candidate_library_paths, library_file_name, NativeRemote};
pub use simulated::{SimulatedEngine, SimulatedStats};

use crate::error::{GatewayError, GatewayResult};
use std::sync::{Arc, Mutex, PoisonError};
use vmhud_core::EngineKind;

/// Outcome of a login call, decoded from the engine's return code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginCode {
    /// `0`: logged in, engine running
    Ready,
    /// `> 0`: logged in but the engine application is still starting
    Launching(i32),
    /// `< 0`: engine not installed / library refused
    NotInstalled(i32),
}

impl LoginCode {
    pub fn from_raw(rc: i32) -> Self {
        match rc {
            0 => LoginCode::Ready,
            rc if rc > 0 => LoginCode::Launching(rc),
            rc => LoginCode::NotInstalled(rc),
        }
    }
}

/// Return code of parameter and dirty-flag calls when the engine application
/// is not running
pub(crate) const NO_SERVER: i32 = -2;

/// Decode the return code of a call made during a session
///
/// "No server" means the engine went away, which is fatal for the session;
/// any other nonzero code concerns this one call only.
pub(crate) fn session_status(call: &'static str, code: i32) -> GatewayResult<()> {
    match code {
        0 => Ok(()),
        NO_SERVER => Err(GatewayError::EngineLost),
        code => Err(GatewayError::Call { call, code }),
    }
}

/// Decode `VBVMR_IsParametersDirty`: `1` changed, `0` unchanged
pub(crate) fn dirty_status(code: i32) -> GatewayResult<bool> {
    match code {
        0 => Ok(false),
        code if code > 0 => Ok(true),
        code => session_status("VBVMR_IsParametersDirty", code).map(|()| true),
    }
}

/// Call contract of the engine's remote API
///
/// Every method maps one-to-one onto a native call. A nonzero engine status
/// is reported as [`GatewayError::Call`]; callers decide whether that means
/// "use a default" or "retry later".
pub trait RemoteApi: Send {
    /// Short description for logs (library path, "simulated", ...)
    fn describe(&self) -> String;

    fn login(&self) -> GatewayResult<LoginCode>;

    fn logout(&self) -> GatewayResult<()>;

    /// Engine variant; fails while the engine is still initializing
    fn engine_kind(&self) -> GatewayResult<EngineKind>;

    /// Whether any parameter changed since the last query
    fn is_dirty(&self) -> GatewayResult<bool>;

    fn get_float(&self, name: &str) -> GatewayResult<f32>;

    fn get_string(&self, name: &str) -> GatewayResult<String>;

    fn set_float(&self, name: &str, value: f32) -> GatewayResult<()>;
}

/// Remote used when the library could not be loaded
///
/// Every call reports the library as missing, which the connection machine
/// treats as "engine absent".
#[derive(Debug, Clone)]
pub struct UnavailableRemote {
    reason: String,
}

impl UnavailableRemote {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn missing<T>(&self) -> GatewayResult<T> {
        Err(GatewayError::LibraryMissing(self.reason.clone()))
    }
}

impl RemoteApi for UnavailableRemote {
    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }

    fn login(&self) -> GatewayResult<LoginCode> {
        self.missing()
    }

    fn logout(&self) -> GatewayResult<()> {
        self.missing()
    }

    fn engine_kind(&self) -> GatewayResult<EngineKind> {
        self.missing()
    }

    fn is_dirty(&self) -> GatewayResult<bool> {
        self.missing()
    }

    fn get_float(&self, _name: &str) -> GatewayResult<f32> {
        self.missing()
    }

    fn get_string(&self, _name: &str) -> GatewayResult<String> {
        self.missing()
    }

    fn set_float(&self, _name: &str, _value: f32) -> GatewayResult<()> {
        self.missing()
    }
}

/// Serialized, clonable handle to the active [`RemoteApi`]
///
/// The poll thread, the flush thread and command callers all hold a clone.
/// Each method takes the call lock for exactly one native call.
#[derive(Clone)]
pub struct SharedRemote {
    inner: Arc<Mutex<Box<dyn RemoteApi>>>,
}

impl SharedRemote {
    pub fn new(api: impl RemoteApi + 'static) -> Self {
        Self::from_boxed(Box::new(api))
    }

    pub fn from_boxed(api: Box<dyn RemoteApi>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(api)),
        }
    }

    fn call<T>(&self, f: impl FnOnce(&dyn RemoteApi) -> T) -> T {
        // A panic inside a previous call must not wedge every later call
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&**guard)
    }

    pub fn describe(&self) -> String {
        self.call(|api| api.describe())
    }

    pub fn login(&self) -> GatewayResult<LoginCode> {
        self.call(|api| api.login())
    }

    pub fn logout(&self) -> GatewayResult<()> {
        self.call(|api| api.logout())
    }

    pub fn engine_kind(&self) -> GatewayResult<EngineKind> {
        self.call(|api| api.engine_kind())
    }

    pub fn is_dirty(&self) -> GatewayResult<bool> {
        self.call(|api| api.is_dirty())
    }

    pub fn get_float(&self, name: &str) -> GatewayResult<f32> {
        self.call(|api| api.get_float(name))
    }

    pub fn get_string(&self, name: &str) -> GatewayResult<String> {
        self.call(|api| api.get_string(name))
    }

    pub fn set_float(&self, name: &str, value: f32) -> GatewayResult<()> {
        self.call(|api| api.set_float(name, value))
    }
}

impl std::fmt::Debug for SharedRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRemote").finish_non_exhaustive()
    }
}
