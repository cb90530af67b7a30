//! HUD configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/vmhud/config.yaml (platform config dir)
//!
//! ```yaml
//! engine:
//!   mode: native            # or: simulated
//!   library_path: null      # explicit VoicemeeterRemote DLL override
//!   simulated_kind: potato
//! timing:
//!   poll_interval_ms: 50
//!   full_refresh_ms: 2000
//! ```

mod io;

pub use io::{load_config, load_or_create_config, save_config};

use crate::types::EngineKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Which engine to talk to and where to find it
    pub engine: EngineConfig,
    /// Poll, flush and reconnect cadence
    pub timing: TimingConfig,
}

/// Engine selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Load the vendor's remote-control library
    #[default]
    Native,
    /// In-process engine, no vendor software required
    Simulated,
}

/// Variant emulated in simulated mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedKind {
    Standard,
    Banana,
    #[default]
    Potato,
}

impl SimulatedKind {
    pub fn engine_kind(self) -> EngineKind {
        match self {
            SimulatedKind::Standard => EngineKind::Standard,
            SimulatedKind::Banana => EngineKind::Banana,
            SimulatedKind::Potato => EngineKind::Potato,
        }
    }
}

/// Engine configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: EngineMode,
    /// Explicit path to the remote-control library, tried before the
    /// default install directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
    pub simulated_kind: SimulatedKind,
}

/// Timing configuration section (all values in milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Poll timer period while running
    pub poll_interval_ms: u64,
    /// Delay before the first poll tick after start
    pub poll_start_delay_ms: u64,
    /// Longest time between full reads when the engine reports nothing dirty
    pub full_refresh_ms: u64,
    /// Pending gain flush period (~120 Hz)
    pub flush_interval_ms: u64,
    /// First reconnect delay; doubles per consecutive failure
    pub backoff_initial_ms: u64,
    /// Reconnect delay ceiling
    pub backoff_max_ms: u64,
    /// How long stop waits for in-flight ticks before logging out
    pub stop_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            poll_start_delay_ms: 200,
            full_refresh_ms: 2000,
            flush_interval_ms: 8,
            backoff_initial_ms: 250,
            backoff_max_ms: 5000,
            stop_timeout_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn poll_start_delay(&self) -> Duration {
        Duration::from_millis(self.poll_start_delay_ms)
    }

    pub fn full_refresh(&self) -> Duration {
        Duration::from_millis(self.full_refresh_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms.max(1))
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms.max(self.backoff_initial_ms).max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Get the default config file path
///
/// Returns: `<config dir>/vmhud/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("vmhud")
        .join("config.yaml")
}
