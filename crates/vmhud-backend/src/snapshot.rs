//! Snapshot builder
//!
//! Reads the full matrix state from the engine, but only when something
//! changed (dirty flag) or the periodic full refresh is due. Individual
//! parameters that fail to read fall back to defaults so one bad name can't
//! blank the whole matrix; only session-fatal errors abort the read.

use crate::connection::Session;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::SharedRemote;
use std::time::{Duration, Instant, SystemTime};
use vmhud_core::{fallback, params, Bus, InputStrip, MatrixSnapshot, Topology, BUS_COUNT};

/// Result of one builder tick
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing dirty and the refresh interval hasn't elapsed
    Skipped,
    Built(MatrixSnapshot),
}

/// Dirty-flag throttled reader
#[derive(Debug)]
pub struct SnapshotBuilder {
    full_refresh: Duration,
    last_read: Option<Instant>,
    /// Session the last read belonged to
    session_id: Option<u64>,
}

impl SnapshotBuilder {
    pub fn new(full_refresh: Duration) -> Self {
        Self {
            full_refresh,
            last_read: None,
            session_id: None,
        }
    }

    /// Read a snapshot if the engine reports changes or a refresh is due
    ///
    /// The first call of each session always reads. A failing dirty query
    /// counts as dirty.
    pub fn poll(
        &mut self,
        remote: &SharedRemote,
        session: &Session,
        now: Instant,
    ) -> GatewayResult<PollOutcome> {
        let dirty = match remote.is_dirty() {
            Ok(dirty) => dirty,
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                log::debug!("Snapshot: Dirty query failed ({}), reading anyway", e);
                true
            }
        };

        let due = match self.last_read {
            Some(at) if self.session_id == Some(session.id) => {
                now.saturating_duration_since(at) >= self.full_refresh
            }
            _ => true,
        };

        if !dirty && !due {
            return Ok(PollOutcome::Skipped);
        }

        let snapshot = read_snapshot(remote, session.topology)?;
        self.last_read = Some(now);
        self.session_id = Some(session.id);
        Ok(PollOutcome::Built(snapshot))
    }
}

/// `Ok(None)` for a per-parameter failure, `Err` only when the session is gone
fn read_float(remote: &SharedRemote, name: &str) -> GatewayResult<Option<f32>> {
    match remote.get_float(name) {
        Ok(value) => Ok(Some(value)),
        Err(e) => skip_unless_fatal(name, e),
    }
}

fn read_string(remote: &SharedRemote, name: &str) -> GatewayResult<Option<String>> {
    match remote.get_string(name) {
        Ok(value) => Ok(Some(value)),
        Err(e) => skip_unless_fatal(name, e),
    }
}

fn skip_unless_fatal<T>(name: &str, error: GatewayError) -> GatewayResult<Option<T>> {
    if error.is_session_fatal() {
        return Err(error);
    }
    log::debug!("Snapshot: {} unreadable: {}", name, error);
    Ok(None)
}

fn read_strip(remote: &SharedRemote, strip: usize) -> GatewayResult<(InputStrip, f32)> {
    let mut routes = [false; BUS_COUNT];
    for bus in Bus::ALL {
        routes[bus.index()] = read_float(remote, &params::strip_route(strip, bus))?
            .map(params::route_enabled)
            .unwrap_or(false);
    }
    let gain = read_float(remote, &params::strip_gain(strip))?.unwrap_or(0.0);
    let label = read_string(remote, &params::strip_label(strip))?;

    Ok((
        InputStrip {
            id: strip,
            name: fallback::strip_display_name(strip, label.as_deref()),
            routes,
        },
        gain,
    ))
}

fn read_bus(remote: &SharedRemote, bus: Bus) -> GatewayResult<(String, f32)> {
    let label = read_string(remote, &params::bus_label(bus))?;
    let gain = read_float(remote, &params::bus_gain(bus))?.unwrap_or(0.0);
    Ok((fallback::bus_display_name(bus, label.as_deref()), gain))
}

/// Read every strip and bus for `topology`
pub fn read_snapshot(remote: &SharedRemote, topology: Topology) -> GatewayResult<MatrixSnapshot> {
    let rows = (0..topology.strips)
        .map(|strip| read_strip(remote, strip))
        .collect::<GatewayResult<Vec<_>>>()?;

    let mut buses: [(String, f32); BUS_COUNT] = Default::default();
    for bus in Bus::ALL {
        buses[bus.index()] = read_bus(remote, bus)?;
    }

    Ok(MatrixSnapshot::from_rows(
        rows,
        buses,
        topology.physical_inputs,
        SystemTime::now(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{RemoteApi, SimulatedEngine};
    use vmhud_core::EngineKind;

    fn online(kind: EngineKind) -> (SimulatedEngine, SharedRemote, Session) {
        let engine = SimulatedEngine::new(kind);
        engine.login().unwrap();
        let remote = SharedRemote::new(engine.clone());
        let session = Session {
            id: 1,
            topology: kind.topology(),
        };
        (engine, remote, session)
    }

    fn built(outcome: PollOutcome) -> MatrixSnapshot {
        match outcome {
            PollOutcome::Built(snapshot) => snapshot,
            PollOutcome::Skipped => panic!("expected a snapshot"),
        }
    }

    #[test]
    fn test_read_uses_labels_and_fallbacks() {
        let (engine, remote, session) = online(EngineKind::Banana);
        engine.set_label("Strip[0].Label", "  Mic  ");
        engine.set_label("Bus[5].Label", "Stream");
        engine.set_param("Strip[0].B1", 1.0);
        engine.set_param("Strip[3].A2", 0.6);
        engine.set_param("Strip[4].A3", 0.4);
        engine.set_param("Strip[2].Gain", -6.5);
        engine.set_param("Bus[0].Gain", -3.0);

        let snapshot = read_snapshot(&remote, session.topology).unwrap();
        assert_eq!(snapshot.strips().len(), 5);
        assert_eq!(snapshot.strip_gains().len(), 5);
        assert_eq!(snapshot.physical_inputs(), 3);
        assert_eq!(snapshot.strips()[0].name, "Mic");
        assert_eq!(snapshot.strips()[1].name, "Strip 2");
        assert!(snapshot.strips()[0].is_routed(Bus::B1));
        assert!(snapshot.strips()[3].is_routed(Bus::A2));
        assert!(!snapshot.strips()[4].is_routed(Bus::A3));
        assert_eq!(snapshot.strip_gain(2), Some(-6.5));
        assert_eq!(snapshot.bus_names()[5], "Stream");
        assert_eq!(snapshot.bus_names()[0], "A1");
        assert_eq!(snapshot.bus_gain(Bus::A1), -3.0);
    }

    #[test]
    fn test_strip_ids_match_position() {
        let (_engine, remote, session) = online(EngineKind::Potato);
        let snapshot = read_snapshot(&remote, session.topology).unwrap();
        for (i, strip) in snapshot.strips().iter().enumerate() {
            assert_eq!(strip.id, i);
        }
        let names: Vec<&str> = snapshot.bus_names().iter().map(String::as_str).collect();
        assert_eq!(names, ["A1", "A2", "A3", "A4", "A5", "B1", "B2", "B3"]);
    }

    #[test]
    fn test_unknown_parameters_default() {
        // Reading a Potato layout from a Standard engine: strips 3..8 don't exist
        let (_engine, remote, _) = online(EngineKind::Standard);
        let snapshot = read_snapshot(&remote, EngineKind::Potato.topology()).unwrap();
        assert_eq!(snapshot.strips().len(), 8);
        assert_eq!(snapshot.strips()[7].name, "Strip 8");
        assert!(snapshot.strips()[7].routes.iter().all(|r| !r));
        assert_eq!(snapshot.strip_gain(7), Some(0.0));
    }

    #[test]
    fn test_fatal_error_aborts_read() {
        let (engine, remote, session) = online(EngineKind::Potato);
        engine.set_lost(true);
        assert_eq!(
            read_snapshot(&remote, session.topology).unwrap_err(),
            GatewayError::EngineLost
        );
    }

    #[test]
    fn test_throttled_by_dirty_flag() {
        let (engine, remote, session) = online(EngineKind::Potato);
        let mut builder = SnapshotBuilder::new(Duration::from_millis(2000));
        let t0 = Instant::now();

        built(builder.poll(&remote, &session, t0).unwrap());

        engine.reset_stats();
        let outcome = builder.poll(&remote, &session, t0 + Duration::from_millis(50)).unwrap();
        assert!(matches!(outcome, PollOutcome::Skipped));
        assert_eq!(engine.stats().reads(), 0);
        assert_eq!(engine.stats().dirty_queries, 1);

        engine.set_param("Strip[1].A1", 1.0);
        let snapshot = built(builder.poll(&remote, &session, t0 + Duration::from_millis(100)).unwrap());
        assert!(snapshot.strips()[1].is_routed(Bus::A1));
    }

    #[test]
    fn test_full_refresh_when_due() {
        let (_engine, remote, session) = online(EngineKind::Standard);
        let mut builder = SnapshotBuilder::new(Duration::from_millis(2000));
        let t0 = Instant::now();
        built(builder.poll(&remote, &session, t0).unwrap());

        let early = builder.poll(&remote, &session, t0 + Duration::from_millis(1999)).unwrap();
        assert!(matches!(early, PollOutcome::Skipped));
        built(builder.poll(&remote, &session, t0 + Duration::from_millis(2000)).unwrap());
    }

    #[test]
    fn test_new_session_forces_read() {
        let (_engine, remote, session) = online(EngineKind::Standard);
        let mut builder = SnapshotBuilder::new(Duration::from_millis(2000));
        let t0 = Instant::now();
        built(builder.poll(&remote, &session, t0).unwrap());

        let next = Session { id: 2, ..session };
        built(builder.poll(&remote, &next, t0 + Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_failed_dirty_query_counts_as_dirty() {
        let (engine, remote, session) = online(EngineKind::Standard);
        let mut builder = SnapshotBuilder::new(Duration::from_millis(2000));
        let t0 = Instant::now();
        built(builder.poll(&remote, &session, t0).unwrap());

        engine.set_dirty_query_fails(true);
        built(builder.poll(&remote, &session, t0 + Duration::from_millis(50)).unwrap());
    }
}
