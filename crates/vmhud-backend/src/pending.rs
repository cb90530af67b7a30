//! Coalesced pending gain writes
//!
//! Drag gestures produce far more gain updates than the engine needs. Each
//! update overwrites the pending value for its target; the flush worker
//! periodically takes everything queued and writes only the latest values.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use vmhud_core::Bus;

fn locked<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest-value-wins gain targets, one map for strips and one for buses
#[derive(Debug, Default)]
pub struct PendingWrites {
    strips: Mutex<HashMap<usize, f32>>,
    buses: Mutex<HashMap<Bus, f32>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_strip(&self, strip: usize, db: f32) {
        locked(&self.strips).insert(strip, db);
    }

    pub fn queue_bus(&self, bus: Bus, db: f32) {
        locked(&self.buses).insert(bus, db);
    }

    /// Drop a queued strip value so a later flush can't overwrite a commit
    pub fn cancel_strip(&self, strip: usize) -> Option<f32> {
        locked(&self.strips).remove(&strip)
    }

    pub fn cancel_bus(&self, bus: Bus) -> Option<f32> {
        locked(&self.buses).remove(&bus)
    }

    /// Take every queued strip value, leaving the map empty
    ///
    /// Swapping under the lock means an update racing with the flush either
    /// lands in this batch or the next one, never neither.
    pub fn take_strips(&self) -> HashMap<usize, f32> {
        std::mem::take(&mut *locked(&self.strips))
    }

    pub fn take_buses(&self) -> HashMap<Bus, f32> {
        std::mem::take(&mut *locked(&self.buses))
    }

    pub fn is_empty(&self) -> bool {
        locked(&self.strips).is_empty() && locked(&self.buses).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latest_value_wins() {
        let pending = PendingWrites::new();
        pending.queue_strip(2, -10.0);
        pending.queue_strip(2, -5.0);
        pending.queue_strip(2, -1.5);
        pending.queue_bus(Bus::A1, 3.0);

        let strips = pending.take_strips();
        assert_eq!(strips.len(), 1);
        assert_eq!(strips[&2], -1.5);
        assert_eq!(pending.take_buses()[&Bus::A1], 3.0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_empties() {
        let pending = PendingWrites::new();
        pending.queue_bus(Bus::B2, 0.0);
        assert_eq!(pending.take_buses().len(), 1);
        assert!(pending.take_buses().is_empty());
    }

    #[test]
    fn test_cancel() {
        let pending = PendingWrites::new();
        pending.queue_strip(0, -20.0);
        pending.queue_bus(Bus::A3, -2.0);
        assert_eq!(pending.cancel_strip(0), Some(-20.0));
        assert_eq!(pending.cancel_strip(0), None);
        assert_eq!(pending.cancel_bus(Bus::A3), Some(-2.0));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_concurrent_queue_and_take_loses_nothing() {
        let pending = Arc::new(PendingWrites::new());
        let writer = {
            let pending = Arc::clone(&pending);
            thread::spawn(move || {
                for strip in 0..500 {
                    pending.queue_strip(strip, strip as f32);
                }
            })
        };

        let mut seen = HashMap::new();
        while !writer.is_finished() {
            seen.extend(pending.take_strips());
        }
        writer.join().unwrap();
        seen.extend(pending.take_strips());
        assert_eq!(seen.len(), 500);
    }
}
