//! Snapshot publication
//!
//! [`SnapshotStore`] holds the current snapshot (lock-free reads through
//! `ArcSwap`) and fans changed snapshots out to subscribers through a
//! [`SnapshotHub`]. Each subscriber owns an unbounded flume channel; a
//! subscriber that is slow only grows its own queue.

use crate::diff;
use arc_swap::ArcSwap;
use flume::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use vmhud_core::MatrixSnapshot;

struct Subscriber {
    id: u64,
    tx: Sender<Arc<MatrixSnapshot>>,
}

/// Subscriber registry
#[derive(Default)]
pub struct SnapshotHub {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SnapshotHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::unbounded();
        self.subscribers().push(Subscriber { id, tx });
        log::debug!("Snapshot: Subscriber {} added", id);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        if subscribers.len() != before {
            log::debug!("Snapshot: Subscriber {} removed", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Deliver to every subscriber registered at the time of the call
    ///
    /// The list is copied and the lock released before sending, so a
    /// subscriber may (un)subscribe from any thread while a publish is in
    /// flight. Returns the number of deliveries.
    pub fn publish(&self, snapshot: &Arc<MatrixSnapshot>) -> usize {
        let targets: Vec<Sender<Arc<MatrixSnapshot>>> =
            self.subscribers().iter().map(|s| s.tx.clone()).collect();

        targets
            .iter()
            .filter(|tx| tx.send(Arc::clone(snapshot)).is_ok())
            .count()
    }
}

impl std::fmt::Debug for SnapshotHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving end of a snapshot subscription
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the
/// subscriber; snapshots published afterwards are not delivered to it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: Receiver<Arc<MatrixSnapshot>>,
    hub: Weak<SnapshotHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next snapshot; fails once the backend is gone
    pub fn recv(&self) -> Result<Arc<MatrixSnapshot>, RecvError> {
        self.rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<MatrixSnapshot>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Arc<MatrixSnapshot>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Most recent queued snapshot, discarding older ones
    pub fn latest(&self) -> Option<Arc<MatrixSnapshot>> {
        self.rx.try_iter().last()
    }

    /// Same as dropping the subscription
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

/// Current snapshot plus change-gated publication
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<MatrixSnapshot>,
    hub: Arc<SnapshotHub>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(MatrixSnapshot::empty()),
            hub: SnapshotHub::new(),
        }
    }

    pub fn current(&self) -> Arc<MatrixSnapshot> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn hub(&self) -> &Arc<SnapshotHub> {
        &self.hub
    }

    /// Replace and publish `candidate` if it differs from the current one
    ///
    /// Only the poll thread calls this, so load-compare-store needs no lock.
    pub fn offer(&self, candidate: MatrixSnapshot) -> bool {
        let change = diff::first_difference(&self.current.load(), &candidate);
        let Some(change) = change else {
            return false;
        };

        log::debug!("Snapshot: Changed ({:?}), publishing", change);
        let snapshot = Arc::new(candidate);
        self.current.store(Arc::clone(&snapshot));
        self.hub.publish(&snapshot);
        true
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use vmhud_core::{Bus, InputStrip, BUS_COUNT};

    fn snapshot(gain: f32) -> MatrixSnapshot {
        let rows = (0..3)
            .map(|id| {
                (
                    InputStrip {
                        id,
                        name: format!("Strip {}", id + 1),
                        routes: [false; BUS_COUNT],
                    },
                    gain,
                )
            })
            .collect();
        MatrixSnapshot::from_rows(
            rows,
            Bus::ALL.map(|b| (b.name().to_string(), 0.0)),
            2,
            SystemTime::now(),
        )
    }

    #[test]
    fn test_offer_publishes_only_changes() {
        let store = SnapshotStore::new();
        let sub = store.subscribe();

        assert!(store.offer(snapshot(0.0)));
        assert!(!store.offer(snapshot(0.0)));
        assert!(store.offer(snapshot(-3.0)));

        assert_eq!(sub.try_recv().unwrap().strip_gain(0), Some(0.0));
        assert_eq!(sub.try_recv().unwrap().strip_gain(0), Some(-3.0));
        assert!(sub.try_recv().is_err());
        assert_eq!(store.current().strip_gain(0), Some(-3.0));
    }

    #[test]
    fn test_current_starts_empty() {
        let store = SnapshotStore::new();
        assert!(store.current().strips().is_empty());
    }

    #[test]
    fn test_every_subscriber_receives_same_snapshot() {
        let store = SnapshotStore::new();
        let a = store.subscribe();
        let b = store.subscribe();
        store.offer(snapshot(1.0));

        let from_a = a.try_recv().unwrap();
        let from_b = b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&from_a, &from_b));
        assert!(Arc::ptr_eq(&from_a, &store.current()));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = SnapshotStore::new();
        let keep = store.subscribe();
        let gone = store.subscribe();
        assert_eq!(store.hub().subscriber_count(), 2);

        gone.unsubscribe();
        assert_eq!(store.hub().subscriber_count(), 1);
        store.offer(snapshot(2.0));
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = SnapshotHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(&Arc::new(snapshot(0.0))), 0);
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub = SnapshotHub::new();
        let sub = hub.subscribe();
        drop(hub);
        assert!(sub.try_recv().is_err());
        drop(sub);
    }

    #[test]
    fn test_latest_skips_backlog() {
        let store = SnapshotStore::new();
        let sub = store.subscribe();
        for gain in [1.0, 2.0, 3.0] {
            store.offer(snapshot(gain));
        }
        assert_eq!(sub.latest().unwrap().strip_gain(0), Some(3.0));
        assert!(sub.latest().is_none());
    }

    #[test]
    fn test_subscribe_from_another_thread() {
        let store = Arc::new(SnapshotStore::new());
        let remote_store = Arc::clone(&store);
        let sub = std::thread::spawn(move || remote_store.subscribe()).join().unwrap();
        store.offer(snapshot(4.0));
        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).unwrap().strip_gain(0), Some(4.0));
    }
}
