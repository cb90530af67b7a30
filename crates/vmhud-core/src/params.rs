//! Engine parameter naming
//!
//! The remote API addresses every control by a string such as
//! `Strip[2].B3` or `Bus[0].Gain`. All names the backend reads or writes are
//! produced here so the convention lives in one place.

use crate::types::Bus;

/// Route flag for `strip` → `bus` (`Strip[i].A1` .. `Strip[i].B3`), 0.0/1.0
pub fn strip_route(strip: usize, bus: Bus) -> String {
    format!("Strip[{}].{}", strip, bus.name())
}

/// Strip gain in dB
pub fn strip_gain(strip: usize) -> String {
    format!("Strip[{}].Gain", strip)
}

/// Strip label (string parameter)
pub fn strip_label(strip: usize) -> String {
    format!("Strip[{}].Label", strip)
}

/// Bus gain in dB
pub fn bus_gain(bus: Bus) -> String {
    format!("Bus[{}].Gain", bus.index())
}

/// Bus label (string parameter)
pub fn bus_label(bus: Bus) -> String {
    format!("Bus[{}].Label", bus.index())
}

/// Route flags are floats; anything at or above this reads as "on"
pub const ROUTE_ON_THRESHOLD: f32 = 0.5;

/// Interpret a route-flag float
pub fn route_enabled(value: f32) -> bool {
    value >= ROUTE_ON_THRESHOLD
}

/// Float written for a route flag
pub fn route_value(enabled: bool) -> f32 {
    if enabled {
        1.0
    } else {
        0.0
    }
}
