// File: src/torrent/mod.rs
//
// Torrent - many flood sessions released in unison.
//
// A Torrent wires K child Floodgates to one shared pool (sized to the sum of
// all child thread counts) and one shared external marshal. open() parks
// every child's workers on the shared barrier; flood() drives each child's
// blocking flood on its own thread, confirms all workers are parked, then
// releases the barrier exactly once so every worker across every child
// starts as close to simultaneously as the scheduler allows.

/// Fluent construction of torrents
pub mod builder;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::gate::Floodgate;
use crate::marshal::ExternalFloodMarshal;
use crate::pool::{FloodExecutorService, SubmissionPolicy};
use crate::report::TorrentSummary;
use crate::session::{FloodSession, SessionLifecycle, SessionState};

pub use builder::TorrentBuilder;

/// Coordinator flooding several independent resources through one barrier.
///
/// Build via [`TorrentBuilder`]; see the builder docs for an example. All
/// children share one result value type `T` - heterogeneous resources are
/// expressed with a sum type such as `Option<i64>`.
pub struct Torrent<T> {
    coordinator: String,
    gates: Vec<Floodgate<T>>,
    pool: Arc<FloodExecutorService<Option<T>>>,
    marshal: ExternalFloodMarshal,
    timeout: Duration,
    lifecycle: SessionLifecycle,
}

impl<T: Send + 'static> Torrent<T> {
    pub(crate) fn assemble(
        coordinator: String,
        gates: Vec<Floodgate<T>>,
        pool: Arc<FloodExecutorService<Option<T>>>,
        marshal: ExternalFloodMarshal,
        timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            gates,
            pool,
            marshal,
            timeout,
            lifecycle: SessionLifecycle::new(),
        }
    }

    /// Coordinator identity shared with the marshal, for diagnostics.
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Read-only view of the child gates.
    pub fn gates(&self) -> &[Floodgate<T>] {
        &self.gates
    }

    /// Total worker thread count, always derived by summing the children.
    pub fn total_threads(&self) -> usize {
        self.gates.iter().map(Floodgate::threads).sum()
    }

    /// Total per-worker iteration count, always derived from the children.
    pub fn total_iterations(&self) -> usize {
        self.gates.iter().map(Floodgate::iterations).sum()
    }

    /// Names of children whose target ended UNSTABLE.
    pub fn unstable_targets(&self) -> Vec<String> {
        self.gates
            .iter()
            .filter(|gate| gate.target().is_unstable())
            .map(|gate| gate.target().name().to_string())
            .collect()
    }

    /// Post-flood snapshot for artifact reporting.
    pub fn summary(&self) -> TorrentSummary {
        TorrentSummary::capture(
            &self.coordinator,
            self.lifecycle.state(),
            self.total_threads(),
            self.total_iterations(),
            self.unstable_targets(),
            self.gates.iter().map(Floodgate::summary).collect(),
        )
    }
}

impl<T: Send + 'static> FloodSession for Torrent<T> {
    type Output = HashMap<String, Vec<T>>;

    /// Open every child in order. Each child submits its workers, which
    /// immediately park on the shared marshal; no child floods before every
    /// child has opened.
    fn open(&mut self) -> Result<()> {
        self.lifecycle.ensure(SessionState::Closed)?;
        for gate in &mut self.gates {
            gate.open()?;
        }
        log::info!(
            "{} opened: {} gate(s), {} worker(s) heading for the barrier",
            self.coordinator,
            self.gates.len(),
            self.total_threads()
        );
        self.lifecycle.advance(SessionState::Opened)
    }

    /// Abort all children without flooding; the shared marshal is released
    /// (its authority is ours) so parked workers can observe the abort and
    /// drain, then the shared pool is shut and fresh plumbing is wired for
    /// a possible reopen.
    fn close(&mut self) -> Result<()> {
        self.lifecycle.ensure(SessionState::Opened)?;

        for gate in &mut self.gates {
            gate.close()?;
        }
        self.marshal.flood();
        self.pool.close(false);

        self.pool = Arc::new(FloodExecutorService::new(
            &self.coordinator,
            self.total_threads(),
            SubmissionPolicy::PriorityBatch,
        )?);
        self.marshal = ExternalFloodMarshal::new(self.coordinator.clone());
        for gate in &mut self.gates {
            gate.rewire(&self.marshal, Arc::clone(&self.pool))?;
        }

        log::info!("{} closed without flooding", self.coordinator);
        self.lifecycle.advance(SessionState::Closed)
    }

    /// Drive every child's blocking flood concurrently, release the shared
    /// marshal exactly once when all workers are confirmed parked, and
    /// assemble the name-to-results map.
    fn flood(&mut self) -> Result<HashMap<String, Vec<T>>> {
        self.lifecycle.ensure(SessionState::Opened)?;

        let total = self.total_threads();
        let timeout = self.timeout;

        // Each child's flood() blocks until that child's workers finish, so
        // each child gets its own driving thread.
        let drivers: Vec<_> = std::mem::take(&mut self.gates)
            .into_iter()
            .map(|mut gate| {
                thread::spawn(move || {
                    let results = gate.flood_within(timeout);
                    (gate, results)
                })
            })
            .collect();

        if !self.marshal.marshal().wait_for_parked(total, timeout) {
            log::warn!(
                "{} releasing with only {}/{} worker(s) confirmed parked",
                self.coordinator,
                self.marshal.marshal().awaiting(),
                total
            );
        }
        self.marshal.flood();

        // Join every driver before reacting to any child's trouble, so no
        // gate is ever abandoned on a detached thread.
        let mut map = HashMap::with_capacity(drivers.len());
        for driver in drivers {
            match driver.join() {
                Ok((gate, results)) => {
                    let name = gate.target().name().to_string();
                    match results {
                        Ok(values) => {
                            map.insert(name, values);
                        }
                        Err(err) => {
                            // Children are all OPENED here, so this would be
                            // a harness bug; report an empty list rather
                            // than failing the whole torrent.
                            log::error!(
                                "{} child '{}' failed to flood: {}",
                                self.coordinator,
                                name,
                                err
                            );
                            map.insert(name, Vec::new());
                        }
                    }
                    self.gates.push(gate);
                }
                Err(payload) => {
                    log::error!(
                        "{} lost a driving thread: {}",
                        self.coordinator,
                        crate::pool::panic_message(payload.as_ref())
                    );
                }
            }
        }

        // Children never close a pool they do not own.
        self.pool.close(false);

        let unstable = self.unstable_targets();
        if unstable.is_empty() {
            log::info!("{} flooded: all targets remained STABLE", self.coordinator);
        } else {
            log::warn!(
                "{} flooded: unstable target(s): {}",
                self.coordinator,
                unstable.join(", ")
            );
        }

        self.lifecycle.advance(SessionState::Flooded)?;
        Ok(map)
    }

    fn state(&self) -> SessionState {
        self.lifecycle.state()
    }
}

impl<T> Drop for Torrent<T> {
    fn drop(&mut self) {
        // A torrent dropped while OPENED holds every child's workers parked
        // on the shared marshal; flag the aborts, then release so they can
        // drain. The shared pool's own Drop shuts its threads down.
        if self.lifecycle.state() != SessionState::Opened {
            return;
        }
        log::warn!(
            "{} dropped while OPENED, aborting its children",
            self.coordinator
        );
        for gate in &self.gates {
            gate.abort_for_teardown();
        }
        self.marshal.flood();
    }
}

impl<T> fmt::Display for Torrent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[state={}, gates={}]",
            self.coordinator,
            self.lifecycle.state(),
            self.gates.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter;

    #[test]
    fn test_flood_returns_one_entry_per_gate() {
        let hits = Arc::new(AtomicU64::new(0));
        let mut torrent = TorrentBuilder::of::<Counter>()
            .with_default_threads(2)
            .with_default_iterations(3)
            .with_flood_gate("a", {
                let hits = Arc::clone(&hits);
                move || hits.fetch_add(1, Ordering::SeqCst)
            })
            .with_flood_gate("b", {
                let hits = Arc::clone(&hits);
                move || hits.fetch_add(1, Ordering::SeqCst)
            })
            .build()
            .unwrap();

        torrent.open().unwrap();
        let results = torrent.flood().unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["Counter[a]"].len(), 2);
        assert_eq!(results["Counter[b]"].len(), 2);
        // 2 gates x 2 threads x 3 iterations
        assert_eq!(hits.load(Ordering::SeqCst), 12);
        assert_eq!(torrent.state(), SessionState::Flooded);
        assert!(torrent.unstable_targets().is_empty());
    }

    #[test]
    fn test_every_successful_worker_result_collected() {
        // The last worker to finish must not lose its value to the hand-off
        // between its closure returning and the pool publishing the outcome;
        // shared-pool children have no shutdown drain to hide behind.
        // Repeated floods to give that window a chance to bite.
        for _ in 0..50 {
            let mut torrent = TorrentBuilder::of::<Counter>()
                .with_default_threads(4)
                .with_default_iterations(1)
                .with_flood_gate("steady", || 1u64)
                .build()
                .unwrap();

            torrent.open().unwrap();
            let results = torrent.flood().unwrap();
            assert_eq!(results["Counter[steady]"].len(), 4);
        }
    }

    #[test]
    fn test_lifecycle_violations() {
        let mut torrent = TorrentBuilder::of::<Counter>()
            .with_flood_gate("only", || 1u32)
            .build()
            .unwrap();

        assert!(matches!(
            torrent.flood(),
            Err(HarnessError::InvalidState { .. })
        ));

        torrent.open().unwrap();
        assert!(matches!(
            torrent.open(),
            Err(HarnessError::InvalidState { .. })
        ));

        torrent.flood().unwrap();
        assert!(matches!(
            torrent.flood(),
            Err(HarnessError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_close_then_reopen_and_flood() {
        let hits = Arc::new(AtomicU64::new(0));
        let mut torrent = TorrentBuilder::of::<Counter>()
            .with_default_threads(1)
            .with_default_iterations(2)
            .with_flood_gate("x", {
                let hits = Arc::clone(&hits);
                move || hits.fetch_add(1, Ordering::SeqCst)
            })
            .build()
            .unwrap();

        torrent.open().unwrap();
        torrent.close().unwrap();
        assert_eq!(torrent.state(), SessionState::Closed);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        torrent.open().unwrap();
        let results = torrent.flood().unwrap();
        assert_eq!(results["Counter[x]"].len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unstable_child_reported_not_fatal() {
        let mut torrent = TorrentBuilder::of::<Counter>()
            .with_default_threads(2)
            .with_default_iterations(2)
            .with_flood_gate("good", || 1u64)
            .with_flood_gate("bad", || -> u64 { panic!("unstable resource") })
            .build()
            .unwrap();

        torrent.open().unwrap();
        let results = torrent.flood().unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["Counter[good]"].len(), 2);
        assert!(results["Counter[bad]"].is_empty());
        assert_eq!(torrent.unstable_targets(), vec!["Counter[bad]".to_string()]);
        // Child trouble never costs the torrent its gates or its state.
        assert_eq!(torrent.gates().len(), 2);
        assert_eq!(torrent.state(), SessionState::Flooded);
    }

    #[test]
    fn test_drop_while_opened_aborts_children() {
        let hits = Arc::new(AtomicU64::new(0));
        {
            let mut torrent = TorrentBuilder::of::<Counter>()
                .with_default_threads(2)
                .with_default_iterations(3)
                .with_flood_gate("leaky", {
                    let hits = Arc::clone(&hits);
                    move || hits.fetch_add(1, Ordering::SeqCst)
                })
                .build()
                .unwrap();
            torrent.open().unwrap();
            // Dropped while OPENED, never flooded or closed.
        }

        // Once the workers unpark and their closures are consumed, the only
        // clone of the counter left is ours.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&hits) > 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(Arc::strong_count(&hits), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
