//! Periodic worker threads
//!
//! A [`Worker`] runs a [`TickHandler`] on its own named thread: it waits out
//! a start delay, then ticks at a fixed interval until told to stop. The
//! handler is called from exactly one thread, so it may own mutable state.
//!
//! Shutdown is signalled by dropping the shutdown sender, which wakes the
//! thread's `select!` immediately. [`Worker::stop`] waits for the thread only
//! until a deadline; a thread stuck in a native call is detached rather than
//! blocking the caller.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use crossbeam::select;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work done on every tick of a [`Worker`]
pub trait TickHandler: Send + 'static {
    fn tick(&mut self, now: Instant);

    /// Called after `tick` panicked; the worker keeps running
    fn recover(&mut self, _now: Instant) {}

    /// Called once on the worker thread when shutdown is requested
    fn finish(&mut self) {}
}

/// Handle to a running worker thread
///
/// Dropping the handle stops the worker (with a short bounded wait).
pub struct Worker {
    name: String,
    /// Dropped to request shutdown
    shutdown: Option<Sender<()>>,
    /// Disconnects when the thread exits
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker that first ticks after `start_delay`, then every
    /// `interval`
    pub fn spawn<H: TickHandler>(
        name: &str,
        start_delay: Duration,
        interval: Duration,
        handler: H,
    ) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            // Held until the thread exits, even by unwinding
            let _done = done_tx;
            run(&thread_name, start_delay, interval, handler, shutdown_rx);
        })?;

        log::debug!("Worker {}: started", name);
        Ok(Self {
            name: name.to_string(),
            shutdown: Some(shutdown_tx),
            done: done_rx,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request shutdown and wait for the thread until `deadline`
    ///
    /// Returns `true` if the thread finished and was joined, `false` if it
    /// was still busy at the deadline and has been detached.
    pub fn stop(mut self, deadline: Instant) -> bool {
        self.stop_by(deadline)
    }

    fn stop_by(&mut self, deadline: Instant) -> bool {
        self.shutdown.take();
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Worker {}: still busy after shutdown request, detaching", self.name);
                false
            }
            // The done sender is never used to send; disconnection means exit
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Worker {}: thread panicked", self.name);
                }
                log::debug!("Worker {}: stopped", self.name);
                true
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_by(Instant::now() + Duration::from_millis(100));
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run<H: TickHandler>(
    name: &str,
    start_delay: Duration,
    interval: Duration,
    mut handler: H,
    shutdown: Receiver<()>,
) {
    select! {
        recv(shutdown) -> _ => {
            handler.finish();
            return;
        }
        recv(channel::after(start_delay)) -> _ => {}
    }

    let ticker = channel::tick(interval);
    loop {
        // select! picks randomly among ready channels; shutdown wins
        if let Err(TryRecvError::Disconnected) = shutdown.try_recv() {
            break;
        }
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> msg => {
                let now = msg.unwrap_or_else(|_| Instant::now());
                let result = panic::catch_unwind(AssertUnwindSafe(|| handler.tick(now)));
                if result.is_err() {
                    log::error!("Worker {}: tick panicked, recovering", name);
                    handler.recover(Instant::now());
                }
            }
        }
    }

    handler.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        ticks: AtomicUsize,
        recovered: AtomicUsize,
        finished: AtomicBool,
    }

    struct Counting {
        counters: Arc<Counters>,
        panic_on_first: bool,
        block_for: Option<Duration>,
    }

    impl TickHandler for Counting {
        fn tick(&mut self, _now: Instant) {
            let n = self.counters.ticks.fetch_add(1, Ordering::SeqCst);
            if let Some(block) = self.block_for {
                thread::sleep(block);
            }
            if self.panic_on_first && n == 0 {
                panic!("first tick");
            }
        }

        fn recover(&mut self, _now: Instant) {
            self.counters.recovered.fetch_add(1, Ordering::SeqCst);
        }

        fn finish(&mut self) {
            self.counters.finished.store(true, Ordering::SeqCst);
        }
    }

    fn counting(panic_on_first: bool, block_for: Option<Duration>) -> (Arc<Counters>, Counting) {
        let counters = Arc::new(Counters::default());
        let handler = Counting {
            counters: Arc::clone(&counters),
            panic_on_first,
            block_for,
        };
        (counters, handler)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_ticks_until_stopped() {
        let (counters, handler) = counting(false, None);
        let worker =
            Worker::spawn("test-ticks", Duration::ZERO, Duration::from_millis(5), handler).unwrap();
        assert!(wait_for(|| counters.ticks.load(Ordering::SeqCst) >= 3));

        assert!(worker.stop(Instant::now() + Duration::from_secs(1)));
        assert!(counters.finished.load(Ordering::SeqCst));
        let ticks = counters.ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counters.ticks.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn test_stop_during_start_delay() {
        let (counters, handler) = counting(false, None);
        let worker =
            Worker::spawn("test-delay", Duration::from_secs(10), Duration::from_millis(5), handler)
                .unwrap();
        let started = Instant::now();
        assert!(worker.stop(Instant::now() + Duration::from_secs(1)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);
        assert!(counters.finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_tick_recovers() {
        let (counters, handler) = counting(true, None);
        let worker =
            Worker::spawn("test-panic", Duration::ZERO, Duration::from_millis(5), handler).unwrap();
        assert!(wait_for(|| counters.ticks.load(Ordering::SeqCst) >= 2));
        assert_eq!(counters.recovered.load(Ordering::SeqCst), 1);
        assert!(worker.stop(Instant::now() + Duration::from_secs(1)));
    }

    #[test]
    fn test_busy_worker_is_detached() {
        let (counters, handler) = counting(false, Some(Duration::from_millis(300)));
        let worker =
            Worker::spawn("test-busy", Duration::ZERO, Duration::from_millis(5), handler).unwrap();
        assert!(wait_for(|| counters.ticks.load(Ordering::SeqCst) >= 1));

        let started = Instant::now();
        assert!(!worker.stop(Instant::now() + Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_millis(250));

        // The detached thread still finishes on its own
        assert!(wait_for(|| counters.finished.load(Ordering::SeqCst)));
    }
}
