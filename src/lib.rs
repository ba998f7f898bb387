//! # Flood Harness
//!
//! A deliberate race-condition amplifier: this library drives many
//! concurrent workers against a shared resource (or several at once) to
//! maximize thread interleaving, so a test suite can observe whether the
//! resource behaves correctly under contention. It is instrumentation that
//! other tests link against, not a production service.
//!
//! ## Architecture Overview
//!
//! Leaf to root:
//! - [`Target`]: identity + monotonic stability flag of the resource under test
//! - [`pool::worker::FloodWorker`]: cancellable, priority-carrying unit of work
//! - [`pool::FloodExecutorService`]: fixed-size pool with graceful/forced shutdown
//! - [`FloodMarshal`] / [`ExternalFloodMarshal`]: one-shot release barrier
//! - [`Floodgate`]: one flood session (N workers x M iterations, one target)
//! - [`Torrent`]: many floodgates released in unison through one shared barrier
//!
//! ## Quick Start
//!
//! ```rust
//! use flood_harness::prelude::*;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! struct Counter;
//!
//! let counter = Arc::new(AtomicU64::new(0));
//! let resource = {
//!     let counter = Arc::clone(&counter);
//!     move || counter.fetch_add(1, Ordering::SeqCst) + 1
//! };
//!
//! let mut gate = Floodgate::new::<Counter, _>(None, 5, 5, resource).unwrap();
//! gate.open().unwrap();
//! let results = gate.flood().unwrap();
//!
//! assert_eq!(results.len(), 5);
//! assert!(gate.target().is_stable());
//! ```
//!
//! ## Design Principles
//!
//! 1. **Park, then release**: all workers block at one barrier before any
//!    proceeds, so a single release produces maximal interleaving
//! 2. **Instability is data, not an error**: a failing resource marks its
//!    [`Target`] UNSTABLE and shrinks the result list; it never panics the
//!    driving thread
//! 3. **Only usage errors throw**: wrong lifecycle state and invalid
//!    construction arguments are the sole `Err` values
//! 4. **Best effort, bounded**: every wait (release confirmation, completion,
//!    shutdown drain) has a deadline and a logged escalation path

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Usage-error taxonomy
pub mod error;
/// One flood session against one target
pub mod gate;
/// Release barrier and completion latch primitives
pub mod marshal;
/// Fixed-size flood worker pool
pub mod pool;
/// Serde summaries and JSON artifacts for failure triage
pub mod report;
/// Shared session lifecycle (state machine + FloodSession trait)
pub mod session;
/// The resource under test and its stability flag
pub mod target;
/// Coordinated multi-gate flooding
pub mod torrent;

// Convenient re-exports for common usage
pub mod prelude;

pub use error::{HarnessError, Result};
pub use gate::{Floodgate, DEFAULT_FLOOD_TIMEOUT};
pub use marshal::{CompletionLatch, ExternalFloodMarshal, FloodMarshal};
pub use session::{FloodSession, SessionState};
pub use target::Target;
pub use torrent::{Torrent, TorrentBuilder};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
