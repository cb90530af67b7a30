//! Snapshot change detection
//!
//! Decides whether a freshly built snapshot is worth publishing. Fields are
//! compared in a fixed order and the first mismatch is reported; the capture
//! time is ignored.

use vmhud_core::MatrixSnapshot;

/// First field found to differ between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difference {
    BusNames,
    StripCount,
    /// Name or routing of the strip at this index
    Strip(usize),
    StripGains,
    BusGains,
}

/// Exact float comparison, except NaN equals NaN so an engine reporting NaN
/// doesn't republish on every read
fn same_value(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_values(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_value(*x, *y))
}

/// Compare in order: bus names, strip count, each strip's name and routes,
/// strip gains, bus gains
pub fn first_difference(prev: &MatrixSnapshot, next: &MatrixSnapshot) -> Option<Difference> {
    if prev.bus_names() != next.bus_names() {
        return Some(Difference::BusNames);
    }

    if prev.strips().len() != next.strips().len() {
        return Some(Difference::StripCount);
    }

    for (i, (a, b)) in prev.strips().iter().zip(next.strips()).enumerate() {
        if a.name != b.name || a.routes != b.routes {
            return Some(Difference::Strip(i));
        }
    }

    if !same_values(prev.strip_gains(), next.strip_gains()) {
        return Some(Difference::StripGains);
    }

    if !same_values(prev.bus_gains(), next.bus_gains()) {
        return Some(Difference::BusGains);
    }

    None
}
