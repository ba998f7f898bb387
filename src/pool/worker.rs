// File: src/pool/worker.rs
//
// Flood Workers and Priorities
//
// A FloodWorker is the cancellable, result-bearing handle onto one submitted
// unit of work. Workers are ordered solely by their assigned priority; the
// relative order of equal-priority workers is unspecified.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Scheduling priority of a flood worker. Five discrete levels; a lower
/// level is scheduled first under the priority-batch submission policy.
///
/// Priorities are assigned round-robin across all tasks ever submitted to a
/// given pool instance, which counteracts pool-submission-order bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloodPriority {
    /// Level 0, scheduled first
    Highest,
    /// Level 1
    High,
    /// Level 2
    Normal,
    /// Level 3
    Low,
    /// Level 4, scheduled last
    Lowest,
}

impl FloodPriority {
    /// All levels, in scheduling order.
    pub const CYCLE: [FloodPriority; 5] = [
        FloodPriority::Highest,
        FloodPriority::High,
        FloodPriority::Normal,
        FloodPriority::Low,
        FloodPriority::Lowest,
    ];

    /// Map a monotonically increasing submission counter onto the cycle.
    pub fn from_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }

    /// Numeric level (0 = scheduled first).
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

/// Terminal (or pending) outcome of a submitted worker.
#[derive(Debug)]
enum OutcomeState<R> {
    /// Queued, not yet picked up by a pool thread
    Pending,
    /// Picked up by a pool thread; can no longer be cancelled
    Running,
    /// Finished normally with a value
    Finished(R),
    /// The task panicked inside the pool; carries the panic message
    Failed(String),
    /// Cancelled before it started
    Cancelled,
    /// Finished, and the value was already taken by the caller
    Taken,
}

impl<R> OutcomeState<R> {
    /// Terminal states: the pool will write nothing further into the slot.
    fn is_settled(&self) -> bool {
        !matches!(self, OutcomeState::Pending | OutcomeState::Running)
    }
}

/// Shared slot between a worker handle and the pool thread executing it.
#[derive(Debug)]
pub(crate) struct TaskSlot<R> {
    state: Mutex<OutcomeState<R>>,
    /// Signalled whenever the state goes terminal.
    settled_cv: Condvar,
}

impl<R> TaskSlot<R> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(OutcomeState::Pending),
            settled_cv: Condvar::new(),
        }
    }

    /// Transition Pending -> Running. Returns false if the task was already
    /// cancelled, in which case the pool thread must skip it.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            OutcomeState::Pending => {
                *state = OutcomeState::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn finish(&self, value: R) {
        *self.state.lock() = OutcomeState::Finished(value);
        self.settled_cv.notify_all();
    }

    pub(crate) fn fail(&self, message: String) {
        *self.state.lock() = OutcomeState::Failed(message);
        self.settled_cv.notify_all();
    }

    /// Transition Pending -> Cancelled. Running and terminal tasks are left
    /// alone: cancellation never interrupts work that already started.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            OutcomeState::Pending => {
                *state = OutcomeState::Cancelled;
                self.settled_cv.notify_all();
                true
            }
            _ => false,
        }
    }
}

/// Cancellable, result-bearing handle onto one submitted unit of work.
///
/// Handles are cheap clones over shared state; the pool keeps one copy per
/// outstanding task (for close-time cancellation) and the submitter keeps
/// another (for result collection).
#[derive(Debug)]
pub struct FloodWorker<R> {
    priority: FloodPriority,
    slot: Arc<TaskSlot<R>>,
}

impl<R> Clone for FloodWorker<R> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R> FloodWorker<R> {
    pub(crate) fn new(priority: FloodPriority, slot: Arc<TaskSlot<R>>) -> Self {
        Self { priority, slot }
    }

    /// Priority assigned at submission time.
    pub fn priority(&self) -> FloodPriority {
        self.priority
    }

    /// Cancel the task if it has not started yet. Returns true if this call
    /// cancelled it; running or finished tasks are never interrupted.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// True if the task finished normally and its value is still available.
    pub fn is_finished(&self) -> bool {
        matches!(*self.slot.state.lock(), OutcomeState::Finished(_))
    }

    /// True if the task was cancelled before starting.
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot.state.lock(), OutcomeState::Cancelled)
    }

    /// True while the task is queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(
            *self.slot.state.lock(),
            OutcomeState::Pending | OutcomeState::Running
        )
    }

    /// Panic message, if the task failed inside the pool.
    pub fn failure(&self) -> Option<String> {
        match &*self.slot.state.lock() {
            OutcomeState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Block until the pool has published this worker's terminal outcome
    /// (finished, failed, or cancelled), up to `timeout`.
    ///
    /// The pool writes a worker's value into the slot a moment after the
    /// submitted closure returns; a collector that learned of completion
    /// through a side channel calls this to close that gap. Returns true if
    /// the outcome settled in time.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        while !state.is_settled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self
                .slot
                .settled_cv
                .wait_for(&mut state, deadline - now);
            if result.timed_out() && !state.is_settled() {
                return false;
            }
        }
        true
    }

    /// Take the finished value, if any. Subsequent calls return `None`.
    pub fn take_result(&self) -> Option<R> {
        let mut state = self.slot.state.lock();
        if matches!(*state, OutcomeState::Finished(_)) {
            match std::mem::replace(&mut *state, OutcomeState::Taken) {
                OutcomeState::Finished(value) => Some(value),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }
}

/// A queued unit of work inside the pool: the job, its priority, and the
/// slot shared with the caller's handle.
pub(crate) struct QueuedTask<R> {
    pub(crate) job: Box<dyn FnOnce() -> R + Send>,
    pub(crate) priority: FloodPriority,
    pub(crate) slot: Arc<TaskSlot<R>>,
}

impl<R> QueuedTask<R> {
    /// Ordering key for the priority-batch submission policy: solely the
    /// priority level, equal levels in unspecified relative order.
    pub(crate) fn compare_priority(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority)
    }
}
