//! Display-name fallback policy
//!
//! Labels come from the engine as free text and are frequently empty. These
//! functions decide what the matrix shows instead.

use crate::types::Bus;

/// Engine label if it has visible content
fn usable_label(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Fallback strip name: 1-based, e.g. `Strip 3` for index 2
pub fn default_strip_name(strip: usize) -> String {
    format!("Strip {}", strip + 1)
}

/// Name shown for a strip given the label read from the engine (if any)
pub fn strip_display_name(strip: usize, raw: Option<&str>) -> String {
    match usable_label(raw) {
        Some(label) => label.to_string(),
        None => default_strip_name(strip),
    }
}

/// Name shown for a bus given the label read from the engine (if any)
pub fn bus_display_name(bus: Bus, raw: Option<&str>) -> String {
    usable_label(raw).unwrap_or(bus.name()).to_string()
}
