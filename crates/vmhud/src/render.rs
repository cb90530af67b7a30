//! Text rendering of a matrix snapshot

use std::fmt::Write;
use vmhud_core::{Bus, MatrixSnapshot};

const NAME_WIDTH: usize = 16;
const CELL_WIDTH: usize = 4;

fn clip(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut clipped: String = name.chars().take(width - 1).collect();
        clipped.push('~');
        clipped
    }
}

fn gain(db: f32) -> String {
    if db.is_nan() {
        "   --".to_string()
    } else {
        format!("{:+5.1}", db)
    }
}

/// Strip-by-bus grid with gains
///
/// ```text
///                       A1  A2  A3  A4  A5  B1  B2  B3    dB
/// HW Mic                 ●   ·   ·   ·   ·   ●   ·   ·  -6.0
/// VI Strip 6             ·   ●   ·   ·   ·   ·   ·   ·  +0.0
/// ```
pub fn render_matrix(snapshot: &MatrixSnapshot) -> String {
    let mut out = String::new();
    if snapshot.strips().is_empty() {
        out.push_str("(no matrix yet)\n");
        return out;
    }

    let _ = write!(out, "{:width$}", "", width = NAME_WIDTH + 3);
    for bus in Bus::ALL {
        let _ = write!(out, "{:>width$}", bus.name(), width = CELL_WIDTH);
    }
    out.push_str("    dB\n");

    for (i, strip) in snapshot.strips().iter().enumerate() {
        let kind = if snapshot.is_physical(i) { "HW" } else { "VI" };
        let _ = write!(out, "{} {:width$}", kind, clip(&strip.name, NAME_WIDTH), width = NAME_WIDTH);
        for bus in Bus::ALL {
            let mark = if strip.is_routed(bus) { "●" } else { "·" };
            let _ = write!(out, "{:>width$}", mark, width = CELL_WIDTH);
        }
        let db = snapshot.strip_gain(i).unwrap_or(0.0);
        let _ = writeln!(out, " {}", gain(db));
    }

    out.push_str("buses:");
    for bus in Bus::ALL {
        let name = &snapshot.bus_names()[bus.index()];
        let _ = write!(out, " {}={}", clip(name, NAME_WIDTH), gain(snapshot.bus_gain(bus)).trim());
    }
    out.push('\n');
    out
}
