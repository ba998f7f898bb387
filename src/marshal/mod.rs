// File: src/marshal/mod.rs
//
// Starter Gate and Completion Latch Primitives
//
// The marshal is a one-shot broadcast release barrier: every flood worker
// parks on it via `halt()`, and a single `flood()` call releases all of them
// at once. Separating "wait for clearance" from "grant clearance" is what
// produces maximal interleaving - all workers are held at the same control
// point before any of them proceeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct MarshalState {
    /// Set exactly once; halting after release returns immediately.
    released: bool,
    /// Number of callers currently blocked in `halt()`.
    parked: usize,
}

struct MarshalInner {
    state: Mutex<MarshalState>,
    /// Signalled on release, wakes every parked caller.
    released_cv: Condvar,
    /// Signalled when a caller parks, for `wait_for_parked`.
    parked_cv: Condvar,
}

/// One-shot release barrier for flood workers.
///
/// Clones share the same barrier. `halt()` blocks until some clone's
/// `flood()` has run; `flood()` releases all currently-parked and all future
/// callers exactly once and is idempotent.
///
/// # Example
///
/// ```rust
/// use flood_harness::FloodMarshal;
/// use std::thread;
///
/// let marshal = FloodMarshal::new();
/// let worker = {
///     let marshal = marshal.clone();
///     thread::spawn(move || marshal.halt())
/// };
///
/// marshal.flood();
/// marshal.flood(); // no-op
/// worker.join().unwrap();
/// ```
#[derive(Clone)]
pub struct FloodMarshal {
    inner: Arc<MarshalInner>,
}

impl FloodMarshal {
    /// Create an unreleased marshal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MarshalInner {
                state: Mutex::new(MarshalState {
                    released: false,
                    parked: 0,
                }),
                released_cv: Condvar::new(),
                parked_cv: Condvar::new(),
            }),
        }
    }

    /// Block the calling thread until the marshal is released.
    ///
    /// Returns immediately if `flood()` already ran.
    pub fn halt(&self) {
        let mut state = self.inner.state.lock();
        if state.released {
            return;
        }
        state.parked += 1;
        self.inner.parked_cv.notify_all();
        while !state.released {
            self.inner.released_cv.wait(&mut state);
        }
        state.parked -= 1;
    }

    /// Release every parked and future caller. Idempotent.
    pub fn flood(&self) {
        let mut state = self.inner.state.lock();
        if state.released {
            log::debug!("marshal already released, ignoring repeated flood()");
            return;
        }
        state.released = true;
        log::info!("marshal released, {} worker(s) unblocked", state.parked);
        self.inner.released_cv.notify_all();
    }

    /// True once `flood()` has run.
    pub fn is_released(&self) -> bool {
        self.inner.state.lock().released
    }

    /// Number of callers currently blocked in `halt()`.
    pub fn awaiting(&self) -> usize {
        self.inner.state.lock().parked
    }

    /// Wait (bounded) until at least `count` callers are parked.
    ///
    /// Used by a coordinator to confirm every worker reached the barrier
    /// before releasing it. Returns false if the deadline elapsed first.
    pub fn wait_for_parked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.parked < count && !state.released {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.inner.parked_cv.wait_for(&mut state, deadline - now);
            if result.timed_out() && state.parked < count {
                return false;
            }
        }
        true
    }
}

impl Default for FloodMarshal {
    fn default() -> Self {
        Self::new()
    }
}

/// A marshal whose release authority belongs to a named coordinator.
///
/// One external marshal may be shared by several independent flood sessions;
/// the coordinator identity exists purely for diagnostics when a `Floodgate`
/// defers release to a `Torrent`.
#[derive(Clone)]
pub struct ExternalFloodMarshal {
    marshal: FloodMarshal,
    coordinator: String,
}

impl ExternalFloodMarshal {
    /// Wrap a fresh marshal owned by `coordinator`.
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            marshal: FloodMarshal::new(),
            coordinator: coordinator.into(),
        }
    }

    /// Identity of the coordinator holding release authority.
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// The underlying shared barrier.
    pub fn marshal(&self) -> &FloodMarshal {
        &self.marshal
    }

    /// Block until the coordinator releases the barrier.
    pub fn halt(&self) {
        self.marshal.halt()
    }

    /// Release the barrier. Idempotent.
    pub fn flood(&self) {
        log::debug!("coordinator '{}' releasing shared marshal", self.coordinator);
        self.marshal.flood()
    }
}

/// N-worker join point with a bounded wait.
///
/// Each worker calls `count_down()` exactly once when it finishes; the
/// driving thread blocks in `wait_timeout()` until the count reaches zero or
/// the deadline elapses.
pub struct CompletionLatch {
    remaining: Mutex<usize>,
    completed_cv: Condvar,
}

impl CompletionLatch {
    /// Latch expecting `count` completions.
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            completed_cv: Condvar::new(),
        }
    }

    /// Record one completion. Saturates at zero.
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.completed_cv.notify_all();
        }
    }

    /// Completions still outstanding.
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Block until the count reaches zero or `timeout` elapses.
    ///
    /// Returns true if all completions arrived in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self
                .completed_cv
                .wait_for(&mut remaining, deadline - now);
            if result.timed_out() && *remaining > 0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_release_is_idempotent() {
        let marshal = FloodMarshal::new();
        assert!(!marshal.is_released());
        marshal.flood();
        marshal.flood();
        assert!(marshal.is_released());
    }

    #[test]
    fn test_halt_after_release_returns_immediately() {
        let marshal = FloodMarshal::new();
        marshal.flood();
        marshal.halt(); // must not block
    }

    #[test]
    fn test_release_unblocks_all_parked_threads() {
        let marshal = FloodMarshal::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let marshal = marshal.clone();
                thread::spawn(move || marshal.halt())
            })
            .collect();

        assert!(marshal.wait_for_parked(4, Duration::from_secs(5)));
        assert_eq!(marshal.awaiting(), 4);

        marshal.flood();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(marshal.awaiting(), 0);
    }

    #[test]
    fn test_wait_for_parked_times_out() {
        let marshal = FloodMarshal::new();
        assert!(!marshal.wait_for_parked(1, Duration::from_millis(20)));
    }

    #[test]
    fn test_external_marshal_identity() {
        let marshal = ExternalFloodMarshal::new("Torrent[stress]");
        assert_eq!(marshal.coordinator(), "Torrent[stress]");
        marshal.flood();
        marshal.halt();
    }

    #[test]
    fn test_latch_counts_down_to_zero() {
        let latch = CompletionLatch::new(3);
        assert_eq!(latch.remaining(), 3);
        latch.count_down();
        latch.count_down();
        latch.count_down();
        assert!(latch.wait_timeout(Duration::from_millis(10)));
        // Saturates, never underflows
        latch.count_down();
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_latch_bounded_wait_expires() {
        let latch = CompletionLatch::new(1);
        assert!(!latch.wait_timeout(Duration::from_millis(20)));
        assert_eq!(latch.remaining(), 1);
    }

    #[test]
    fn test_latch_across_threads() {
        let latch = Arc::new(CompletionLatch::new(2));
        for _ in 0..2 {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                latch.count_down();
            });
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
    }
}
