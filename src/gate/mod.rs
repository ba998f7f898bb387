// File: src/gate/mod.rs
//
// Floodgate - one flood session against one target.
//
// open() primes one worker closure per thread and parks them all at the
// marshal; flood() releases the marshal (unless an external coordinator owns
// it), waits for the completion latch up to a deadline, tears the pool down,
// and collects per-worker results. All concurrency-level trouble (panicking
// resources, timeouts, cancellations) is reported through the Target's
// stability flag, partial result lists, and logs - never as an error.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::marshal::{CompletionLatch, ExternalFloodMarshal, FloodMarshal};
use crate::pool::worker::FloodWorker;
use crate::pool::{panic_message, FloodExecutorService, SubmissionPolicy};
use crate::report::FloodSummary;
use crate::session::{FloodSession, SessionLifecycle, SessionState};
use crate::target::Target;

/// Default deadline `flood()` waits for all workers to finish.
pub const DEFAULT_FLOOD_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a completed flood waits for the pool to publish the final
/// worker outcomes into their slots. Only the hand-off between a returned
/// closure and its slot write happens in this window, so it is generous.
const RESULT_PUBLICATION_GRACE: Duration = Duration::from_secs(5);

/// Who holds release authority over the gate's marshal.
///
/// An explicit field instead of a runtime type check: the gate self-releases
/// only when it owns the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarshalMode {
    /// The gate created the marshal and releases it in `flood()`.
    Owned,
    /// A coordinator (typically a `Torrent`) releases the shared marshal.
    External,
}

/// One flood session: N workers x M iterations against a single target.
///
/// # Example
///
/// ```rust
/// use flood_harness::{Floodgate, FloodSession};
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// struct Counter;
///
/// let counter = Arc::new(AtomicU64::new(0));
/// let resource = {
///     let counter = Arc::clone(&counter);
///     move || counter.fetch_add(1, Ordering::SeqCst) + 1
/// };
///
/// let mut gate = Floodgate::new::<Counter, _>(Some("atomic"), 4, 10, resource).unwrap();
/// gate.open().unwrap();
/// let results = gate.flood().unwrap();
///
/// assert_eq!(results.len(), 4);
/// assert!(gate.target().is_stable());
/// assert_eq!(counter.load(Ordering::SeqCst), 40);
/// ```
///
/// # Thread safety of the resource
///
/// The resource closure is called concurrently from every worker thread.
/// The harness claims no mutual exclusion over it - probing the closure's
/// own thread-safety (or lack of it) is the entire point.
pub struct Floodgate<T> {
    target: Arc<Target>,
    threads: usize,
    iterations: usize,
    resource: Arc<dyn Fn() -> T + Send + Sync>,

    marshal: FloodMarshal,
    marshal_mode: MarshalMode,
    /// Coordinator identity when release authority is external, diagnostics only
    coordinator: Option<String>,

    pool: Option<Arc<FloodExecutorService<Option<T>>>>,
    owns_pool: bool,

    latch: Option<Arc<CompletionLatch>>,
    workers: Vec<FloodWorker<Option<T>>>,
    /// Set by close(); parked workers observe it after release and bail out
    aborted: Arc<AtomicBool>,

    lifecycle: SessionLifecycle,
    force_close: bool,
    timed_out: bool,
    collected: usize,
}

impl<T: Send + 'static> Floodgate<T> {
    /// Self-contained gate: owns its pool and its marshal.
    ///
    /// `C` names the resource type under test; `tag` disambiguates several
    /// gates against the same type.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `threads >= 1` and `iterations >= 1`.
    pub fn new<C, F>(
        tag: Option<&str>,
        threads: usize,
        iterations: usize,
        resource: F,
    ) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let target = Target::of::<C>(tag);
        Self::build(target, threads, iterations, Arc::new(resource), None, None)
    }

    /// Coordinated gate: workers park on `marshal`, whose release belongs to
    /// the named coordinator, and run on the supplied shared pool.
    pub fn coordinated(
        target: Target,
        threads: usize,
        iterations: usize,
        resource: Arc<dyn Fn() -> T + Send + Sync>,
        marshal: &ExternalFloodMarshal,
        pool: Arc<FloodExecutorService<Option<T>>>,
    ) -> Result<Self> {
        Self::build(
            target,
            threads,
            iterations,
            resource,
            Some(marshal.clone()),
            Some(pool),
        )
    }

    fn build(
        target: Target,
        threads: usize,
        iterations: usize,
        resource: Arc<dyn Fn() -> T + Send + Sync>,
        external: Option<ExternalFloodMarshal>,
        pool: Option<Arc<FloodExecutorService<Option<T>>>>,
    ) -> Result<Self> {
        validate_counts(threads, iterations)?;

        let (marshal, marshal_mode, coordinator) = match &external {
            Some(external) => (
                external.marshal().clone(),
                MarshalMode::External,
                Some(external.coordinator().to_string()),
            ),
            None => (FloodMarshal::new(), MarshalMode::Owned, None),
        };

        let owns_pool = pool.is_none();
        Ok(Self {
            target: Arc::new(target),
            threads,
            iterations,
            resource,
            marshal,
            marshal_mode,
            coordinator,
            pool,
            owns_pool,
            latch: None,
            workers: Vec::new(),
            aborted: Arc::new(AtomicBool::new(false)),
            lifecycle: SessionLifecycle::new(),
            force_close: false,
            timed_out: false,
            collected: 0,
        })
    }

    /// Request a forced (no grace period) pool close at teardown.
    pub fn with_force_close(mut self) -> Self {
        self.force_close = true;
        self
    }

    /// The resource identity and observed stability.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Worker thread count, fixed at construction.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Resource calls per worker, fixed at construction.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// True if the last `flood()` abandoned its wait at the deadline.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Flood with an explicit deadline instead of the 5-minute default.
    pub fn flood_within(&mut self, timeout: Duration) -> Result<Vec<T>> {
        self.lifecycle.ensure(SessionState::Opened)?;

        match self.marshal_mode {
            MarshalMode::Owned => {
                log::info!("floodgate '{}' releasing its workers", self.target.name());
                self.marshal.flood();
            }
            MarshalMode::External => {
                log::info!(
                    "floodgate '{}' deferring release to coordinator '{}'",
                    self.target.name(),
                    self.coordinator.as_deref().unwrap_or("?")
                );
            }
        }

        let latch = self
            .latch
            .as_ref()
            .expect("latch exists in OPENED state")
            .clone();
        if !latch.wait_timeout(timeout) {
            log::warn!(
                "floodgate '{}' timed out after {:?} with {} worker(s) unfinished",
                self.target.name(),
                timeout,
                latch.remaining()
            );
            self.timed_out = true;
        }

        if self.owns_pool {
            if let Some(pool) = &self.pool {
                pool.close(self.force_close);
            }
        }

        // The latch trips when the last worker closure returns, a moment
        // before the pool publishes that closure's value into its slot. On a
        // shared pool no shutdown drain intervenes, so confirm every outcome
        // is visible before collecting.
        if !self.timed_out {
            for worker in &self.workers {
                if !worker.wait_settled(RESULT_PUBLICATION_GRACE) {
                    log::warn!(
                        "floodgate '{}' worker outcome not published within {:?}",
                        self.target.name(),
                        RESULT_PUBLICATION_GRACE
                    );
                }
            }
        }

        let results: Vec<T> = self
            .workers
            .iter()
            .filter_map(FloodWorker::take_result)
            .flatten()
            .collect();
        self.collected = results.len();

        log::info!(
            "floodgate '{}' flooded: {}/{} result(s), target {}",
            self.target.name(),
            self.collected,
            self.threads,
            if self.target.is_unstable() { "UNSTABLE" } else { "STABLE" }
        );

        self.lifecycle.advance(SessionState::Flooded)?;
        Ok(results)
    }

    /// Point a closed, coordinated gate at a fresh shared marshal and pool.
    ///
    /// A coordinator that closes without flooding replaces its (released)
    /// marshal and (shut) pool; its children must follow before reopening.
    pub(crate) fn rewire(
        &mut self,
        marshal: &ExternalFloodMarshal,
        pool: Arc<FloodExecutorService<Option<T>>>,
    ) -> Result<()> {
        self.lifecycle.ensure(SessionState::Closed)?;
        self.marshal = marshal.marshal().clone();
        self.coordinator = Some(marshal.coordinator().to_string());
        self.pool = Some(pool);
        Ok(())
    }

    /// Post-flood snapshot for artifact reporting.
    pub fn summary(&self) -> FloodSummary {
        FloodSummary::capture(
            self.target.name(),
            self.target.is_unstable(),
            self.lifecycle.state(),
            self.threads,
            self.iterations,
            self.collected,
            self.timed_out,
        )
    }

    /// Prime one worker closure: park at the marshal, then hammer the
    /// resource `iterations` times unless the gate was aborted or the target
    /// already went unstable. A panicking resource marks the target unstable
    /// and ends this worker's loop with no value.
    fn prime_worker(&self) -> impl FnOnce() -> Option<T> + Send + 'static {
        let target = Arc::clone(&self.target);
        let marshal = self.marshal.clone();
        let latch = Arc::clone(self.latch.as_ref().expect("latch set before priming"));
        let aborted = Arc::clone(&self.aborted);
        let resource = Arc::clone(&self.resource);
        let iterations = self.iterations;

        move || {
            marshal.halt();

            let mut last = None;
            if !aborted.load(Ordering::Acquire) {
                for _ in 0..iterations {
                    if target.is_unstable() {
                        break;
                    }
                    match panic::catch_unwind(AssertUnwindSafe(|| resource())) {
                        Ok(value) => {
                            last = Some(value);
                            // Encourage a context switch between iterations to
                            // widen the race window.
                            thread::yield_now();
                        }
                        Err(payload) => {
                            log::warn!(
                                "worker observed resource failure on '{}': {}",
                                target.name(),
                                panic_message(payload.as_ref())
                            );
                            target.mark_unstable();
                            last = None;
                            break;
                        }
                    }
                }
            }

            latch.count_down();
            last
        }
    }
}

impl<T: Send + 'static> FloodSession for Floodgate<T> {
    type Output = Vec<T>;

    fn open(&mut self) -> Result<()> {
        self.lifecycle.ensure(SessionState::Closed)?;

        if self.owns_pool {
            let pool = FloodExecutorService::new(
                self.target.name(),
                self.threads,
                SubmissionPolicy::Direct,
            )?;
            self.pool = Some(Arc::new(pool));
        }

        self.latch = Some(Arc::new(CompletionLatch::new(self.threads)));
        self.aborted.store(false, Ordering::Release);
        self.timed_out = false;
        self.collected = 0;

        let pool = self.pool.as_ref().expect("pool attached in open()");
        self.workers = (0..self.threads)
            .map(|_| {
                let job = self.prime_worker();
                pool.submit(job)
            })
            .collect();

        log::info!(
            "floodgate '{}' opened: {} worker(s) x {} iteration(s) parked",
            self.target.name(),
            self.threads,
            self.iterations
        );

        self.lifecycle.advance(SessionState::Opened)
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.ensure(SessionState::Opened)?;
        self.aborted.store(true, Ordering::Release);

        match self.marshal_mode {
            MarshalMode::Owned => {
                // Wake the parked workers so they can observe the abort,
                // then drain the pool.
                self.marshal.flood();
                if let Some(pool) = self.pool.take() {
                    pool.close(false);
                }
                // A fresh open() needs an unreleased barrier.
                self.marshal = FloodMarshal::new();
            }
            MarshalMode::External => {
                // The shared marshal belongs to the coordinator; releasing
                // it here would unleash sibling gates.
                log::debug!(
                    "floodgate '{}' closed under external marshal; workers exit at coordinator release",
                    self.target.name()
                );
            }
        }

        self.workers.clear();
        self.latch = None;
        self.aborted = Arc::new(AtomicBool::new(false));

        log::info!("floodgate '{}' closed without flooding", self.target.name());
        self.lifecycle.advance(SessionState::Closed)
    }

    fn flood(&mut self) -> Result<Vec<T>> {
        self.flood_within(DEFAULT_FLOOD_TIMEOUT)
    }

    fn state(&self) -> SessionState {
        self.lifecycle.state()
    }
}

impl<T> Floodgate<T> {
    /// Flag the abort for parked workers during coordinator teardown.
    pub(crate) fn abort_for_teardown(&self) {
        self.aborted.store(true, Ordering::Release);
    }
}

impl<T> Drop for Floodgate<T> {
    fn drop(&mut self) {
        // A gate dropped while OPENED would otherwise leave its workers
        // parked on a barrier nobody can release anymore. Flag the abort and
        // release an owned marshal; the pool's own Drop shuts its threads
        // down once the workers unpark. A shared marshal stays with its
        // coordinator.
        if self.lifecycle.state() != SessionState::Opened {
            return;
        }
        self.aborted.store(true, Ordering::Release);
        if self.marshal_mode == MarshalMode::Owned {
            log::warn!(
                "floodgate '{}' dropped while OPENED, aborting its workers",
                self.target.name()
            );
            self.marshal.flood();
        }
    }
}

impl<T> fmt::Display for Floodgate<T> {
    /// The string summary at the interface boundary: target name and state,
    /// thread count, iteration count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Floodgate[target={}, state={}, threads={}, iterations={}]",
            self.target,
            self.lifecycle.state(),
            self.threads,
            self.iterations
        )
    }
}

fn validate_counts(threads: usize, iterations: usize) -> Result<()> {
    if threads < 1 {
        return Err(crate::error::HarnessError::InvalidArgument(
            "thread count must be >= 1".to_string(),
        ));
    }
    if iterations < 1 {
        return Err(crate::error::HarnessError::InvalidArgument(
            "iteration count must be >= 1".to_string(),
        ));
    }
    Ok(())
}
