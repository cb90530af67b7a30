//! Command intake
//!
//! User actions arrive from the UI thread: routing toggles and gain changes.
//! Toggles and final gain values are written straight away; in-progress drag
//! values are queued in [`PendingWrites`] and written by the flush worker.
//! Write failures are logged and dropped; the next snapshot shows the truth.

use crate::gateway::SharedRemote;
use crate::pending::PendingWrites;
use std::sync::Arc;
use vmhud_core::{params, Bus};

/// Clonable handle for issuing commands from any thread
#[derive(Debug, Clone)]
pub struct CommandIntake {
    remote: SharedRemote,
    pending: Arc<PendingWrites>,
}

fn bus_at(index: usize) -> Option<Bus> {
    let bus = Bus::from_index(index);
    if bus.is_none() {
        log::warn!("Commands: Ignoring bus index {} (valid: 0..{})", index, Bus::ALL.len());
    }
    bus
}

impl CommandIntake {
    pub fn new(remote: SharedRemote, pending: Arc<PendingWrites>) -> Self {
        Self { remote, pending }
    }

    fn write(&self, name: &str, value: f32) -> bool {
        match self.remote.set_float(name, value) {
            Ok(()) => {
                log::trace!("Commands: {} = {}", name, value);
                true
            }
            Err(e) if e.is_session_fatal() => {
                log::debug!("Commands: {} not written: {}", name, e);
                false
            }
            Err(e) => {
                log::warn!("Commands: {} not written: {}", name, e);
                false
            }
        }
    }

    /// Enable or disable routing of a strip to a bus
    pub fn set_route(&self, strip: usize, bus_index: usize, enabled: bool) -> bool {
        let Some(bus) = bus_at(bus_index) else {
            return false;
        };
        self.write(&params::strip_route(strip, bus), params::route_value(enabled))
    }

    pub fn set_strip_gain(&self, strip: usize, db: f32) -> bool {
        self.write(&params::strip_gain(strip), db)
    }

    pub fn set_bus_gain(&self, bus_index: usize, db: f32) -> bool {
        let Some(bus) = bus_at(bus_index) else {
            return false;
        };
        self.write(&params::bus_gain(bus), db)
    }

    /// Queue a strip gain while dragging; only the last value before a flush
    /// is written
    pub fn queue_strip_gain(&self, strip: usize, db: f32) {
        self.pending.queue_strip(strip, db);
    }

    pub fn queue_bus_gain(&self, bus_index: usize, db: f32) {
        if let Some(bus) = bus_at(bus_index) {
            self.pending.queue_bus(bus, db);
        }
    }

    /// Drag finished: drop any queued value and write the final one now
    pub fn commit_strip_gain(&self, strip: usize, db: f32) -> bool {
        self.pending.cancel_strip(strip);
        self.set_strip_gain(strip, db)
    }

    pub fn commit_bus_gain(&self, bus_index: usize, db: f32) -> bool {
        let Some(bus) = bus_at(bus_index) else {
            return false;
        };
        self.pending.cancel_bus(bus);
        self.write(&params::bus_gain(bus), db)
    }

    /// Write everything queued since the last flush; returns writes attempted
    pub fn flush_pending(&self) -> usize {
        let strips = self.pending.take_strips();
        let buses = self.pending.take_buses();

        for (&strip, &db) in &strips {
            self.write(&params::strip_gain(strip), db);
        }
        for (&bus, &db) in &buses {
            self.write(&params::bus_gain(bus), db);
        }
        strips.len() + buses.len()
    }

    pub fn pending(&self) -> &PendingWrites {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{RemoteApi, SimulatedEngine, UnavailableRemote};
    use vmhud_core::EngineKind;

    fn intake() -> (SimulatedEngine, CommandIntake) {
        let engine = SimulatedEngine::new(EngineKind::Potato);
        engine.login().unwrap();
        let intake = CommandIntake::new(
            SharedRemote::new(engine.clone()),
            Arc::new(PendingWrites::new()),
        );
        (engine, intake)
    }

    #[test]
    fn test_set_route_writes_flag() {
        let (engine, intake) = intake();
        assert!(intake.set_route(2, 5, true));
        assert_eq!(engine.param("Strip[2].B1"), Some(1.0));
        assert!(intake.set_route(2, 5, false));
        assert_eq!(engine.param("Strip[2].B1"), Some(0.0));
    }

    #[test]
    fn test_route_to_last_bus_is_single_write() {
        let (engine, intake) = intake();
        assert!(intake.set_route(2, 7, true));
        assert_eq!(engine.stats().writes, vec![("Strip[2].B3".to_string(), 1.0)]);
    }

    #[test]
    fn test_invalid_bus_is_ignored() {
        let (engine, intake) = intake();
        assert!(!intake.set_route(0, 8, true));
        assert!(!intake.set_bus_gain(12, -3.0));
        intake.queue_bus_gain(99, 0.0);
        assert!(!intake.commit_bus_gain(8, 0.0));
        assert!(engine.stats().writes.is_empty());
        assert!(intake.pending().is_empty());
    }

    #[test]
    fn test_immediate_gains() {
        let (engine, intake) = intake();
        assert!(intake.set_strip_gain(1, -12.0));
        assert!(intake.set_bus_gain(7, 4.5));
        assert_eq!(engine.param("Strip[1].Gain"), Some(-12.0));
        assert_eq!(engine.param("Bus[7].Gain"), Some(4.5));
    }

    #[test]
    fn test_flush_writes_latest_values_once() {
        let (engine, intake) = intake();
        for db in [-20.0, -15.0, -10.0] {
            intake.queue_strip_gain(0, db);
        }
        intake.queue_bus_gain(1, 2.0);
        assert!(engine.stats().writes.is_empty());

        assert_eq!(intake.flush_pending(), 2);
        let writes = engine.stats().writes;
        assert_eq!(writes.len(), 2);
        assert!(writes.contains(&("Strip[0].Gain".to_string(), -10.0)));
        assert!(writes.contains(&("Bus[1].Gain".to_string(), 2.0)));

        assert_eq!(intake.flush_pending(), 0);
        assert_eq!(engine.stats().writes.len(), 2);
    }

    #[test]
    fn test_commit_supersedes_queued_value() {
        let (engine, intake) = intake();
        intake.queue_strip_gain(3, -30.0);
        intake.queue_bus_gain(4, -8.0);
        assert!(intake.commit_strip_gain(3, -6.0));
        assert!(intake.commit_bus_gain(4, -1.0));
        assert_eq!(intake.flush_pending(), 0);

        assert_eq!(
            engine.stats().writes,
            vec![
                ("Strip[3].Gain".to_string(), -6.0),
                ("Bus[4].Gain".to_string(), -1.0)
            ]
        );
    }

    #[test]
    fn test_failed_writes_are_swallowed() {
        let intake = CommandIntake::new(
            SharedRemote::new(UnavailableRemote::new("missing")),
            Arc::new(PendingWrites::new()),
        );
        assert!(!intake.set_route(0, 0, true));
        intake.queue_strip_gain(0, 1.0);
        assert_eq!(intake.flush_pending(), 1);
        assert!(intake.pending().is_empty());
    }

    #[test]
    fn test_unknown_strip_write_fails_quietly() {
        let (engine, intake) = intake();
        assert!(!intake.set_strip_gain(40, 0.0));
        assert!(engine.stats().writes.is_empty());
    }
}
