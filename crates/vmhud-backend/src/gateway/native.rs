//! Voicemeeter remote API bound at runtime
//!
//! The vendor ships `VoicemeeterRemote.dll` (32-bit) and
//! `VoicemeeterRemote64.dll` (64-bit) in its install directory. We pick the
//! one matching our pointer width, resolve every export once at load time and
//! keep the `Library` alive for as long as the function pointers are.

use super::{dirty_status, session_status, LoginCode, RemoteApi};
use crate::error::{GatewayError, GatewayResult};
use libloading::Library;
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use vmhud_core::EngineKind;

/// Size of the ANSI buffer `VBVMR_GetParameterStringA` writes into
const STRING_BUFFER_LEN: usize = 512;

type NoArgFn = unsafe extern "system" fn() -> i32;
type GetTypeFn = unsafe extern "system" fn(*mut i32) -> i32;
type GetFloatFn = unsafe extern "system" fn(*const c_char, *mut f32) -> i32;
type GetStringFn = unsafe extern "system" fn(*const c_char, *mut c_char) -> i32;
type SetFloatFn = unsafe extern "system" fn(*const c_char, f32) -> i32;

/// Resolved exports
struct RemoteFns {
    login: NoArgFn,
    logout: NoArgFn,
    get_type: GetTypeFn,
    is_dirty: NoArgFn,
    get_float: GetFloatFn,
    get_string: GetStringFn,
    set_float: SetFloatFn,
}

/// Remote API backed by the vendor DLL
pub struct NativeRemote {
    path: PathBuf,
    fns: RemoteFns,
    // Must outlive `fns`; fields drop in declaration order
    _library: Library,
}

/// Library file name for this process architecture
pub fn library_file_name() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "VoicemeeterRemote64.dll"
    } else {
        "VoicemeeterRemote.dll"
    }
}

/// Paths tried, in order, when loading the remote library
///
/// 1. `override_path` (a file, or a directory containing the library)
/// 2. `%ProgramFiles(x86)%\VB\Voicemeeter`
/// 3. `%ProgramFiles%\VB\Voicemeeter`
/// 4. the bare file name, resolved by the OS loader's search path
pub fn candidate_library_paths(override_path: Option<&Path>) -> Vec<PathBuf> {
    let file_name = library_file_name();
    let mut candidates = Vec::new();

    if let Some(path) = override_path {
        if path.is_dir() {
            candidates.push(path.join(file_name));
        } else {
            candidates.push(path.to_path_buf());
        }
    }

    for var in ["ProgramFiles(x86)", "ProgramFiles"] {
        if let Some(dir) = std::env::var_os(var) {
            candidates.push(PathBuf::from(dir).join("VB").join("Voicemeeter").join(file_name));
        }
    }

    candidates.push(PathBuf::from(file_name));
    candidates.dedup();
    candidates
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &'static str) -> GatewayResult<T> {
    // SAFETY: every `T` requested below matches the export's signature in
    // VoicemeeterRemote.h (stdcall, long return).
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|_| GatewayError::SymbolMissing {
            path: path.to_path_buf(),
            symbol: name,
        })
}

fn param_name(name: &str) -> GatewayResult<CString> {
    CString::new(name).map_err(|_| GatewayError::InvalidName(name.to_string()))
}

fn check(call: &'static str, code: i32) -> GatewayResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(GatewayError::Call { call, code })
    }
}

impl NativeRemote {
    /// Load the library at `path` and resolve all exports
    pub fn load(path: &Path) -> GatewayResult<Self> {
        // SAFETY: loading runs the vendor DLL's initializers, which is how
        // the remote API is meant to be used.
        let library = unsafe { Library::new(path) }
            .map_err(|e| GatewayError::LibraryMissing(format!("{}: {}", path.display(), e)))?;

        let fns = RemoteFns {
            login: symbol(&library, path, "VBVMR_Login")?,
            logout: symbol(&library, path, "VBVMR_Logout")?,
            get_type: symbol(&library, path, "VBVMR_GetVoicemeeterType")?,
            is_dirty: symbol(&library, path, "VBVMR_IsParametersDirty")?,
            get_float: symbol(&library, path, "VBVMR_GetParameterFloat")?,
            get_string: symbol(&library, path, "VBVMR_GetParameterStringA")?,
            set_float: symbol(&library, path, "VBVMR_SetParameterFloat")?,
        };

        log::info!("Remote: Loaded {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            fns,
            _library: library,
        })
    }

    /// Try each candidate location and return the first library that loads
    pub fn discover(override_path: Option<&Path>) -> GatewayResult<Self> {
        let mut last_error = GatewayError::LibraryMissing(library_file_name().to_string());

        for candidate in candidate_library_paths(override_path) {
            match Self::load(&candidate) {
                Ok(remote) => return Ok(remote),
                Err(e) => {
                    log::debug!("Remote: {} not usable: {}", candidate.display(), e);
                    last_error = e;
                }
            }
        }

        log::warn!("Remote: {} not found in default locations", library_file_name());
        Err(last_error)
    }
}

impl RemoteApi for NativeRemote {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn login(&self) -> GatewayResult<LoginCode> {
        // SAFETY: resolved from the loaded library, which `self` keeps alive.
        let rc = unsafe { (self.fns.login)() };
        Ok(LoginCode::from_raw(rc))
    }

    fn logout(&self) -> GatewayResult<()> {
        // SAFETY: as above.
        let rc = unsafe { (self.fns.logout)() };
        check("VBVMR_Logout", rc)
    }

    fn engine_kind(&self) -> GatewayResult<EngineKind> {
        let mut kind = 0i32;
        // SAFETY: `kind` is a valid out-pointer for the duration of the call.
        let rc = unsafe { (self.fns.get_type)(&mut kind) };
        // Only asked during login, where "no server" means "still launching"
        check("VBVMR_GetVoicemeeterType", rc)?;
        Ok(EngineKind::from_raw(kind))
    }

    fn is_dirty(&self) -> GatewayResult<bool> {
        // SAFETY: no arguments.
        let rc = unsafe { (self.fns.is_dirty)() };
        dirty_status(rc)
    }

    fn get_float(&self, name: &str) -> GatewayResult<f32> {
        let c_name = param_name(name)?;
        let mut value = 0.0f32;
        // SAFETY: `c_name` is NUL-terminated and `value` outlives the call.
        let rc = unsafe { (self.fns.get_float)(c_name.as_ptr(), &mut value) };
        session_status("VBVMR_GetParameterFloat", rc)?;
        Ok(value)
    }

    fn get_string(&self, name: &str) -> GatewayResult<String> {
        let c_name = param_name(name)?;
        let mut buffer = [0 as c_char; STRING_BUFFER_LEN];
        // SAFETY: the API writes at most STRING_BUFFER_LEN bytes including NUL.
        let rc = unsafe { (self.fns.get_string)(c_name.as_ptr(), buffer.as_mut_ptr()) };
        session_status("VBVMR_GetParameterStringA", rc)?;

        buffer[STRING_BUFFER_LEN - 1] = 0;
        // SAFETY: the buffer is NUL-terminated (forced above).
        let value = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        Ok(value.to_string_lossy().into_owned())
    }

    fn set_float(&self, name: &str, value: f32) -> GatewayResult<()> {
        let c_name = param_name(name)?;
        // SAFETY: `c_name` is NUL-terminated.
        let rc = unsafe { (self.fns.set_float)(c_name.as_ptr(), value) };
        session_status("VBVMR_SetParameterFloat", rc)
    }
}
