//! Routing matrix types
//!
//! A [`MatrixSnapshot`] is a point-in-time capture of every strip's routing
//! flags and gain plus every bus's name and gain. Snapshots are built whole
//! on the poll thread and never mutated afterwards; consumers share them via
//! `Arc` and compare them structurally (see `vmhud_backend::diff`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Number of output buses (A1..A5, B1..B3), fixed for every engine variant
pub const BUS_COUNT: usize = 8;

/// Output bus identifiers in engine order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Bus {
    A1 = 0,
    A2 = 1,
    A3 = 2,
    A4 = 3,
    A5 = 4,
    B1 = 5,
    B2 = 6,
    B3 = 7,
}

impl Bus {
    /// All buses in positional order
    pub const ALL: [Bus; BUS_COUNT] = [
        Bus::A1,
        Bus::A2,
        Bus::A3,
        Bus::A4,
        Bus::A5,
        Bus::B1,
        Bus::B2,
        Bus::B3,
    ];

    /// Convert from positional index (0-7) to Bus
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Parse a canonical bus name ("A1".."B3", case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|bus| bus.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Positional index (0-7)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical name, also the route-flag suffix in parameter names
    pub fn name(self) -> &'static str {
        match self {
            Bus::A1 => "A1",
            Bus::A2 => "A2",
            Bus::A3 => "A3",
            Bus::A4 => "A4",
            Bus::A5 => "A5",
            Bus::B1 => "B1",
            Bus::B2 => "B2",
            Bus::B3 => "B3",
        }
    }

    /// Whether this is a physical (A) output rather than a virtual (B) one
    pub fn is_physical(self) -> bool {
        self.index() < 5
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine variant reported by the engine-type query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// 2 hardware + 1 virtual input
    Standard,
    /// 3 hardware + 2 virtual inputs
    Banana,
    /// 5 hardware + 3 virtual inputs
    Potato,
    /// Variant id this build doesn't know; treated like the largest layout
    Unknown(i32),
}

impl EngineKind {
    /// Map the raw variant id returned by the engine
    pub fn from_raw(id: i32) -> Self {
        match id {
            1 => EngineKind::Standard,
            2 => EngineKind::Banana,
            3 => EngineKind::Potato,
            other => EngineKind::Unknown(other),
        }
    }

    /// Strip and bus layout for this variant
    pub fn topology(self) -> Topology {
        let (strips, physical_inputs) = match self {
            EngineKind::Standard => (3, 2),
            EngineKind::Banana => (5, 3),
            EngineKind::Potato | EngineKind::Unknown(_) => (8, 5),
        };
        Topology {
            kind: self,
            strips,
            physical_inputs,
        }
    }
}

/// Strip/bus layout inferred from the engine variant
///
/// Bus count is always [`BUS_COUNT`]; only the strip count varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    /// Variant this layout was derived from
    pub kind: EngineKind,
    /// Number of input strips (physical + virtual)
    pub strips: usize,
    /// Leading strips that are hardware inputs
    pub physical_inputs: usize,
}

impl Topology {
    /// Number of output buses
    pub fn buses(&self) -> usize {
        BUS_COUNT
    }
}

/// Backend connection status as seen by consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BackendStatus {
    #[default]
    Connecting = 0,
    Connected = 1,
    /// Connected to the in-process simulated engine
    Simulated = 2,
    Disconnected = 3,
}

impl BackendStatus {
    /// Inverse of `status as u8`; unknown values read as Disconnected
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => BackendStatus::Connecting,
            1 => BackendStatus::Connected,
            2 => BackendStatus::Simulated,
            _ => BackendStatus::Disconnected,
        }
    }

    /// True while an engine session (real or simulated) is live
    pub fn is_connected(self) -> bool {
        matches!(self, BackendStatus::Connected | BackendStatus::Simulated)
    }

    /// Human-readable label for status lines
    pub fn label(self) -> &'static str {
        match self {
            BackendStatus::Connecting => "Connecting…",
            BackendStatus::Connected => "Connected",
            BackendStatus::Simulated => "Simulated",
            BackendStatus::Disconnected => "Disconnected",
        }
    }
}

/// One input strip as captured in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputStrip {
    /// Index into the engine's strip array
    pub id: usize,
    /// Display name (label or fallback)
    pub name: String,
    /// Route flags ordered A1..A5, B1..B3
    pub routes: [bool; BUS_COUNT],
}

impl InputStrip {
    /// Whether this strip feeds the given bus
    pub fn is_routed(&self, bus: Bus) -> bool {
        self.routes[bus.index()]
    }
}

/// Constructor input whose strip and gain sequences disagree in length
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("snapshot has {strips} strips but {gains} strip gains")]
pub struct SnapshotShapeError {
    pub strips: usize,
    pub gains: usize,
}

/// Immutable capture of the whole routing matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSnapshot {
    strips: Vec<InputStrip>,
    strip_gains: Vec<f32>,
    bus_names: [String; BUS_COUNT],
    bus_gains: [f32; BUS_COUNT],
    physical_inputs: usize,
    captured_at: SystemTime,
}

impl MatrixSnapshot {
    /// Assemble a snapshot, rejecting strip/gain sequences of different length
    pub fn new(
        strips: Vec<InputStrip>,
        strip_gains: Vec<f32>,
        bus_names: [String; BUS_COUNT],
        bus_gains: [f32; BUS_COUNT],
        physical_inputs: usize,
        captured_at: SystemTime,
    ) -> Result<Self, SnapshotShapeError> {
        if strips.len() != strip_gains.len() {
            return Err(SnapshotShapeError {
                strips: strips.len(),
                gains: strip_gains.len(),
            });
        }
        Ok(Self {
            strips,
            strip_gains,
            bus_names,
            bus_gains,
            physical_inputs,
            captured_at,
        })
    }

    /// Assemble a snapshot from per-strip `(strip, gain)` rows and per-bus
    /// `(name, gain)` pairs; the parallel sequences can't disagree
    pub fn from_rows(
        rows: Vec<(InputStrip, f32)>,
        buses: [(String, f32); BUS_COUNT],
        physical_inputs: usize,
        captured_at: SystemTime,
    ) -> Self {
        let (strips, strip_gains) = rows.into_iter().unzip();
        let bus_gains = buses.each_ref().map(|(_, gain)| *gain);
        let bus_names = buses.map(|(name, _)| name);
        Self {
            strips,
            strip_gains,
            bus_names,
            bus_gains,
            physical_inputs,
            captured_at,
        }
    }

    /// Snapshot current before the first successful read
    pub fn empty() -> Self {
        Self {
            strips: Vec::new(),
            strip_gains: Vec::new(),
            bus_names: Bus::ALL.map(|bus| bus.name().to_string()),
            bus_gains: [0.0; BUS_COUNT],
            physical_inputs: 0,
            captured_at: SystemTime::now(),
        }
    }

    pub fn strips(&self) -> &[InputStrip] {
        &self.strips
    }

    /// Strip gains in dB, parallel to [`strips`](Self::strips)
    pub fn strip_gains(&self) -> &[f32] {
        &self.strip_gains
    }

    pub fn bus_names(&self) -> &[String; BUS_COUNT] {
        &self.bus_names
    }

    /// Bus gains in dB, parallel to [`bus_names`](Self::bus_names)
    pub fn bus_gains(&self) -> &[f32; BUS_COUNT] {
        &self.bus_gains
    }

    /// Number of leading strips that are hardware inputs
    pub fn physical_inputs(&self) -> usize {
        self.physical_inputs
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Whether `strip` is a hardware input in this capture
    pub fn is_physical(&self, strip: usize) -> bool {
        strip < self.physical_inputs
    }

    /// Gain of a strip, if it exists in this capture
    pub fn strip_gain(&self, strip: usize) -> Option<f32> {
        self.strip_gains.get(strip).copied()
    }

    /// Gain of a bus
    pub fn bus_gain(&self, bus: Bus) -> f32 {
        self.bus_gains[bus.index()]
    }
}

impl Default for MatrixSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(id: usize) -> InputStrip {
        InputStrip {
            id,
            name: format!("In {}", id),
            routes: [false; BUS_COUNT],
        }
    }

    #[test]
    fn test_bus_index_roundtrip() {
        for (idx, bus) in Bus::ALL.iter().enumerate() {
            assert_eq!(bus.index(), idx);
            assert_eq!(Bus::from_index(idx), Some(*bus));
        }
        assert_eq!(Bus::from_index(8), None);
    }

    #[test]
    fn test_bus_from_name() {
        assert_eq!(Bus::from_name("b3"), Some(Bus::B3));
        assert_eq!(Bus::from_name(" A1 "), Some(Bus::A1));
        assert_eq!(Bus::from_name("C1"), None);
        assert!(Bus::A5.is_physical());
        assert!(!Bus::B1.is_physical());
    }

    #[test]
    fn test_engine_topology() {
        assert_eq!(EngineKind::from_raw(1).topology().strips, 3);
        assert_eq!(EngineKind::from_raw(2).topology().strips, 5);
        let potato = EngineKind::from_raw(3).topology();
        assert_eq!(potato.kind, EngineKind::Potato);
        assert_eq!(potato.strips, 8);
        assert_eq!(potato.physical_inputs, 5);
        assert_eq!(potato.buses(), 8);
        // Unknown ids keep the largest layout
        let unknown = EngineKind::from_raw(6).topology();
        assert_eq!(unknown.kind, EngineKind::Unknown(6));
        assert_eq!(unknown.strips, 8);
    }

    #[test]
    fn test_status_u8_roundtrip() {
        for status in [
            BackendStatus::Connecting,
            BackendStatus::Connected,
            BackendStatus::Simulated,
            BackendStatus::Disconnected,
        ] {
            assert_eq!(BackendStatus::from_u8(status as u8), status);
        }
        assert!(BackendStatus::Simulated.is_connected());
        assert!(!BackendStatus::Connecting.is_connected());
        assert_eq!(BackendStatus::default(), BackendStatus::Connecting);
    }

    #[test]
    fn test_snapshot_rejects_mismatched_gains() {
        let err = MatrixSnapshot::new(
            vec![strip(0), strip(1)],
            vec![0.0],
            Bus::ALL.map(|b| b.name().to_string()),
            [0.0; BUS_COUNT],
            1,
            SystemTime::now(),
        )
        .unwrap_err();
        assert_eq!(err, SnapshotShapeError { strips: 2, gains: 1 });
    }

    #[test]
    fn test_empty_snapshot_has_canonical_buses() {
        let snapshot = MatrixSnapshot::empty();
        assert!(snapshot.strips().is_empty());
        assert_eq!(snapshot.bus_names()[0], "A1");
        assert_eq!(snapshot.bus_names()[7], "B3");
        assert_eq!(snapshot.bus_gains().len(), BUS_COUNT);
    }

    #[test]
    fn test_snapshot_accessors() {
        let mut routed = strip(0);
        routed.routes[Bus::B2.index()] = true;
        let snapshot = MatrixSnapshot::new(
            vec![routed, strip(1)],
            vec![-6.0, 0.0],
            Bus::ALL.map(|b| b.name().to_string()),
            [1.5; BUS_COUNT],
            1,
            SystemTime::now(),
        )
        .unwrap();
        assert!(snapshot.strips()[0].is_routed(Bus::B2));
        assert!(!snapshot.strips()[0].is_routed(Bus::A1));
        assert_eq!(snapshot.strip_gain(0), Some(-6.0));
        assert_eq!(snapshot.strip_gain(5), None);
        assert_eq!(snapshot.bus_gain(Bus::A3), 1.5);
        assert!(snapshot.is_physical(0));
        assert!(!snapshot.is_physical(1));
    }

    #[test]
    fn test_from_rows_keeps_sequences_parallel() {
        let buses = Bus::ALL.map(|b| (format!("Out {}", b.name()), b.index() as f32));
        let snapshot = MatrixSnapshot::from_rows(
            vec![(strip(0), -1.0), (strip(1), -2.0), (strip(2), -3.0)],
            buses,
            2,
            SystemTime::now(),
        );
        assert_eq!(snapshot.strips().len(), snapshot.strip_gains().len());
        assert_eq!(snapshot.strip_gains(), &[-1.0, -2.0, -3.0]);
        assert_eq!(snapshot.bus_names()[5], "Out B1");
        assert_eq!(snapshot.bus_gain(Bus::B1), 5.0);
        assert_eq!(snapshot.physical_inputs(), 2);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let json = serde_json::to_string(&MatrixSnapshot::empty()).unwrap();
        assert!(json.contains("\"bus_names\":[\"A1\""));
    }
}
