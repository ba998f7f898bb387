// File: src/torrent/builder.rs
//
// Torrent Builder
//
// Collects per-child parameters (tag, optional thread/iteration overrides,
// resource closure) against a target type and shared defaults, then wires
// every child Floodgate to one shared pool and one shared external marshal.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::gate::{Floodgate, DEFAULT_FLOOD_TIMEOUT};
use crate::marshal::ExternalFloodMarshal;
use crate::pool::{FloodExecutorService, SubmissionPolicy};
use crate::target::Target;
use crate::torrent::Torrent;

/// Parameters for one child gate, collected before `build()`.
pub(crate) struct GateSpec<T> {
    tag: String,
    threads: Option<usize>,
    iterations: Option<usize>,
    resource: Arc<dyn Fn() -> T + Send + Sync>,
}

/// Fluent builder for [`Torrent`].
///
/// # Example
///
/// ```rust
/// use flood_harness::{FloodSession, TorrentBuilder};
///
/// struct Counter;
///
/// let mut torrent = TorrentBuilder::of::<Counter>()
///     .with_default_threads(3)
///     .with_default_iterations(2)
///     .with_flood_gate("add10", || Some(10i64))
///     .with_flood_gate("print", || {
///         println!("hammering");
///         None
///     })
///     .build()
///     .unwrap();
///
/// torrent.open().unwrap();
/// let results = torrent.flood().unwrap();
/// assert_eq!(results.len(), 2);
/// ```
pub struct TorrentBuilder<T> {
    class_name: String,
    default_threads: usize,
    default_iterations: usize,
    timeout: Duration,
    specs: Vec<GateSpec<T>>,
}

impl<T: Send + 'static> TorrentBuilder<T> {
    /// Builder targeting the resource type `C`.
    ///
    /// Defaults: 5 threads and 5 iterations per gate, 5-minute flood
    /// timeout.
    pub fn of<C>() -> Self {
        let type_name = std::any::type_name::<C>();
        let class_name = type_name.rsplit("::").next().unwrap_or(type_name);
        Self {
            class_name: class_name.to_string(),
            default_threads: 5,
            default_iterations: 5,
            timeout: DEFAULT_FLOOD_TIMEOUT,
            specs: Vec::new(),
        }
    }

    /// Default worker thread count for gates without an override.
    pub fn with_default_threads(mut self, threads: usize) -> Self {
        self.default_threads = threads;
        self
    }

    /// Default per-worker iteration count for gates without an override.
    pub fn with_default_iterations(mut self, iterations: usize) -> Self {
        self.default_iterations = iterations;
        self
    }

    /// Deadline each child's flood waits for its workers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register one resource closure under `tag`, using the defaults.
    pub fn with_flood_gate<F>(self, tag: &str, resource: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.with_flood_gate_configured(tag, None, None, resource)
    }

    /// Register one resource closure with optional per-gate overrides.
    pub fn with_flood_gate_configured<F>(
        mut self,
        tag: &str,
        threads: Option<usize>,
        iterations: Option<usize>,
        resource: F,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.specs.push(GateSpec {
            tag: tag.to_string(),
            threads,
            iterations,
            resource: Arc::new(resource),
        });
        self
    }

    /// Construct the torrent: one shared pool sized to the total thread
    /// count, one shared external marshal, one child gate per closure.
    ///
    /// # Errors
    ///
    /// `NoFloodGates` if nothing was registered; `InvalidArgument` if any
    /// effective thread or iteration count is zero.
    pub fn build(self) -> Result<Torrent<T>> {
        if self.specs.is_empty() {
            return Err(HarnessError::NoFloodGates);
        }

        let coordinator = format!("Torrent[{}]", self.class_name);

        let mut total_threads = 0usize;
        for spec in &self.specs {
            let threads = spec.threads.unwrap_or(self.default_threads);
            if threads < 1 {
                return Err(HarnessError::InvalidArgument(format!(
                    "gate '{}': thread count must be >= 1",
                    spec.tag
                )));
            }
            if spec.iterations.unwrap_or(self.default_iterations) < 1 {
                return Err(HarnessError::InvalidArgument(format!(
                    "gate '{}': iteration count must be >= 1",
                    spec.tag
                )));
            }
            total_threads += threads;
        }

        let pool = Arc::new(FloodExecutorService::new(
            &coordinator,
            total_threads,
            SubmissionPolicy::PriorityBatch,
        )?);
        let marshal = ExternalFloodMarshal::new(coordinator.clone());

        let mut gates = Vec::with_capacity(self.specs.len());
        for spec in self.specs {
            let target = Target::named(&self.class_name, Some(&spec.tag));
            let gate = Floodgate::coordinated(
                target,
                spec.threads.unwrap_or(self.default_threads),
                spec.iterations.unwrap_or(self.default_iterations),
                spec.resource,
                &marshal,
                Arc::clone(&pool),
            )?;
            gates.push(gate);
        }

        log::info!(
            "{} built: {} gate(s), {} total thread(s)",
            coordinator,
            gates.len(),
            total_threads
        );

        Ok(Torrent::assemble(coordinator, gates, pool, marshal, self.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    #[test]
    fn test_build_requires_gates() {
        let result = TorrentBuilder::<u32>::of::<Counter>().build();
        assert!(matches!(result, Err(HarnessError::NoFloodGates)));
    }

    #[test]
    fn test_build_validates_overrides() {
        let result = TorrentBuilder::of::<Counter>()
            .with_flood_gate_configured("zero", Some(0), None, || 1u32)
            .build();
        assert!(matches!(result, Err(HarnessError::InvalidArgument(_))));

        let result = TorrentBuilder::of::<Counter>()
            .with_default_iterations(0)
            .with_flood_gate("defaulted", || 1u32)
            .build();
        assert!(matches!(result, Err(HarnessError::InvalidArgument(_))));
    }

    #[test]
    fn test_total_threads_sums_children() {
        let torrent = TorrentBuilder::of::<Counter>()
            .with_default_threads(2)
            .with_flood_gate("a", || 1u32)
            .with_flood_gate_configured("b", Some(3), None, || 2u32)
            .with_flood_gate("c", || 3u32)
            .build()
            .unwrap();

        assert_eq!(torrent.total_threads(), 7);
        assert_eq!(torrent.gates().len(), 3);
    }
}
