// File: src/pool/mod.rs
//
// Flood Executor Service
//
// A fixed-size pool of named OS threads specialized for flood work: every
// submission becomes a FloodWorker carrying a round-robin priority, the pool
// tracks its outstanding tasks for close-time cancellation, and shutdown
// comes in two modes (graceful with a fixed grace period, or immediate).
//
// The round-robin priority counter and the worker-naming sequence are fields
// of each pool instance; there is no process-wide mutable state.

/// Worker handles, priorities, and queued-task internals
pub mod worker;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{HarnessError, Result};
use worker::{FloodPriority, FloodWorker, QueuedTask, TaskSlot};

/// Grace period a graceful `close()` waits for outstanding work to drain
/// before escalating to cancellation.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How submitted tasks reach the pool's work queue.
///
/// This replaces the original's pool subclass with an explicit field: the
/// behavior difference is data, not a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPolicy {
    /// Enqueue each task immediately, preserving submission (FIFO) order.
    Direct,
    /// Buffer submissions until exactly core-size tasks have arrived, then
    /// sort the batch by priority and enqueue it as one unit.
    ///
    /// Without this, workers belonging to earlier-submitted flood sessions
    /// would start microseconds before later-submitted ones; sorting a full
    /// batch by round-robin priority approximates fair interleaving across
    /// sessions.
    PriorityBatch,
}

struct QueueState<R> {
    queue: VecDeque<QueuedTask<R>>,
    /// No new work accepted once set
    intake_closed: bool,
    /// Workers exit as soon as they observe this
    shutdown: bool,
    /// Tasks currently executing on a pool thread
    active: usize,
}

struct PoolShared<R> {
    state: Mutex<QueueState<R>>,
    /// Wakes pool threads when work arrives or shutdown begins
    work_cv: Condvar,
    /// Wakes a graceful close() when the pool may have drained
    idle_cv: Condvar,
}

/// Fixed-size worker pool specialized to construct `FloodWorker` tasks.
///
/// All methods take `&self`, so a pool can be shared via `Arc` between a
/// `Torrent` and its child `Floodgate`s.
///
/// # Example
///
/// ```rust
/// use flood_harness::pool::{FloodExecutorService, SubmissionPolicy};
///
/// let pool = FloodExecutorService::new("demo", 2, SubmissionPolicy::Direct).unwrap();
/// let worker = pool.submit(|| 21 * 2);
/// pool.close(false);
/// assert_eq!(worker.take_result(), Some(42));
/// ```
pub struct FloodExecutorService<R> {
    shared: Arc<PoolShared<R>>,
    name: String,
    core_size: usize,
    /// Round-robin priority counter, scoped to this pool instance
    next_priority: AtomicUsize,
    policy: SubmissionPolicy,
    /// Buffered submissions under `SubmissionPolicy::PriorityBatch`
    batch: Mutex<Vec<QueuedTask<R>>>,
    /// Every handle ever submitted, for close-time cancellation
    outstanding: Mutex<Vec<FloodWorker<R>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<R: Send + 'static> FloodExecutorService<R> {
    /// Create a pool with `core_size` named threads.
    ///
    /// Threads are named `flood-<name>-<index>` for diagnosability.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `core_size` is zero; `ThreadSpawn` if the OS
    /// refuses a pool thread.
    pub fn new(name: &str, core_size: usize, policy: SubmissionPolicy) -> Result<Self> {
        if core_size == 0 {
            return Err(HarnessError::InvalidArgument(
                "pool core size must be >= 1".to_string(),
            ));
        }

        let shared = Arc::new(PoolShared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                intake_closed: false,
                shutdown: false,
                active: 0,
            }),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
        });

        let mut threads = Vec::with_capacity(core_size);
        for index in 0..core_size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("flood-{}-{}", name, index))
                .spawn(move || Self::run_worker(shared))
                .map_err(HarnessError::ThreadSpawn)?;
            threads.push(handle);
        }

        log::info!(
            "flood pool '{}' created: {} thread(s), policy {:?}",
            name,
            core_size,
            policy
        );

        Ok(Self {
            shared,
            name: name.to_string(),
            core_size,
            next_priority: AtomicUsize::new(0),
            policy,
            batch: Mutex::new(Vec::new()),
            outstanding: Mutex::new(Vec::new()),
            threads: Mutex::new(threads),
            closed: AtomicBool::new(false),
        })
    }

    /// Pool thread main loop: pull tasks FIFO, skip cancelled ones, convert
    /// panics into Failed outcomes so a misbehaving resource never kills the
    /// pool thread.
    fn run_worker(shared: Arc<PoolShared<R>>) {
        loop {
            let task = {
                let mut state = shared.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(task) = state.queue.pop_front() {
                        state.active += 1;
                        break task;
                    }
                    if state.intake_closed {
                        // Drained: nothing queued and nothing more coming
                        shared.idle_cv.notify_all();
                        return;
                    }
                    shared.work_cv.wait(&mut state);
                }
            };

            if task.slot.begin() {
                let job = task.job;
                match panic::catch_unwind(AssertUnwindSafe(job)) {
                    Ok(value) => task.slot.finish(value),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("flood task panicked in pool: {}", message);
                        task.slot.fail(message);
                    }
                }
            }

            let mut state = shared.state.lock();
            state.active -= 1;
            if state.queue.is_empty() && state.active == 0 {
                shared.idle_cv.notify_all();
            }
        }
    }

    /// Submit a closure for execution.
    ///
    /// The closure is wrapped in a `FloodWorker` carrying the next
    /// round-robin priority, recorded in the outstanding list, and scheduled
    /// per the pool's submission policy. A submission after `close()` is
    /// cancelled immediately and logged.
    pub fn submit<F>(&self, job: F) -> FloodWorker<R>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let priority = FloodPriority::from_index(self.next_priority.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(TaskSlot::new());
        let handle = FloodWorker::new(priority, Arc::clone(&slot));
        self.outstanding.lock().push(handle.clone());

        let task = QueuedTask {
            job: Box::new(job),
            priority,
            slot,
        };

        if self.closed.load(Ordering::Acquire) {
            log::warn!("pool '{}' rejected submission after close", self.name);
            task.slot.cancel();
            return handle;
        }

        match self.policy {
            SubmissionPolicy::Direct => self.enqueue(vec![task]),
            SubmissionPolicy::PriorityBatch => {
                let mut batch = self.batch.lock();
                batch.push(task);
                if batch.len() >= self.core_size {
                    let mut full: Vec<_> = batch.drain(..).collect();
                    drop(batch);
                    full.sort_by(|a, b| a.compare_priority(b));
                    log::debug!(
                        "pool '{}' releasing priority-sorted batch of {}",
                        self.name,
                        full.len()
                    );
                    self.enqueue(full);
                }
            }
        }

        handle
    }

    fn enqueue(&self, tasks: Vec<QueuedTask<R>>) {
        let mut state = self.shared.state.lock();
        for task in tasks {
            state.queue.push_back(task);
        }
        self.shared.work_cv.notify_all();
    }

    /// Shut the pool down.
    ///
    /// Graceful (`force == false`): stop accepting work, wait up to
    /// [`SHUTDOWN_GRACE`] for outstanding work to finish, then cancel
    /// whatever remains. Forced (`force == true`): cancel immediately.
    ///
    /// Cancellation never interrupts an already-running task; threads still
    /// executing at escalation time are detached and left to finish, so a
    /// partially-applied side effect on the target is never corrupted.
    /// Idempotent.
    pub fn close(&self, force: bool) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Flush a partial priority batch so buffered tasks are not stranded.
        {
            let mut batch = self.batch.lock();
            if !batch.is_empty() {
                let mut rest: Vec<_> = batch.drain(..).collect();
                drop(batch);
                rest.sort_by(|a, b| a.compare_priority(b));
                log::debug!(
                    "pool '{}' flushing incomplete batch of {} at close",
                    self.name,
                    rest.len()
                );
                self.enqueue(rest);
            }
        }

        {
            let mut state = self.shared.state.lock();
            state.intake_closed = true;
            self.shared.work_cv.notify_all();
        }

        let drained = if force {
            log::info!("pool '{}' closing immediately (forced)", self.name);
            false
        } else {
            log::info!(
                "pool '{}' waiting up to {:?} for outstanding work",
                self.name,
                SHUTDOWN_GRACE
            );
            self.await_drain(SHUTDOWN_GRACE)
        };

        if drained {
            let threads = std::mem::take(&mut *self.threads.lock());
            for handle in threads {
                let _ = handle.join();
            }
            log::info!("pool '{}' shutdown complete", self.name);
            return;
        }

        // Escalation: cancel everything not yet started, release the pool
        // threads, and detach any thread still running a task.
        if !force {
            log::error!(
                "pool '{}' grace period elapsed, cancelling remaining work",
                self.name
            );
        }

        let cancelled = self
            .outstanding
            .lock()
            .iter()
            .filter(|worker| worker.cancel())
            .count();
        if cancelled > 0 {
            log::warn!("pool '{}' cancelled {} unstarted task(s)", self.name, cancelled);
        }

        {
            let mut state = self.shared.state.lock();
            state.queue.clear();
            state.shutdown = true;
            self.shared.work_cv.notify_all();
        }

        // Running tasks are not interruptible; their threads finish on
        // their own and exit at the shutdown flag.
        let threads = std::mem::take(&mut *self.threads.lock());
        drop(threads);
        log::info!("pool '{}' shutdown complete (escalated)", self.name);
    }

    /// Wait until the queue is empty and no task is active, bounded.
    fn await_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !(state.queue.is_empty() && state.active == 0) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.shared.idle_cv.wait_for(&mut state, deadline - now);
            if result.timed_out() && !(state.queue.is_empty() && state.active == 0) {
                return false;
            }
        }
        true
    }

    /// Pool name, used in thread names and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pool threads.
    pub fn core_size(&self) -> usize {
        self.core_size
    }

    /// Handles of every task ever submitted to this pool.
    pub fn outstanding(&self) -> Vec<FloodWorker<R>> {
        self.outstanding.lock().clone()
    }
}

impl<R> Drop for FloodExecutorService<R> {
    fn drop(&mut self) {
        // A pool dropped without close() must not leave threads parked on
        // the work condvar forever.
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.shared.state.lock();
            state.intake_closed = true;
            state.shutdown = true;
            self.shared.work_cv.notify_all();
        }
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
