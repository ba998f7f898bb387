// File: src/prelude.rs
//
// Convenient re-exports for test authors.

//! Everything a flood-test author typically needs in one import.
//!
//! ```rust
//! use flood_harness::prelude::*;
//! ```

pub use crate::error::{HarnessError, Result};
pub use crate::gate::{Floodgate, DEFAULT_FLOOD_TIMEOUT};
pub use crate::marshal::{CompletionLatch, ExternalFloodMarshal, FloodMarshal};
pub use crate::pool::worker::{FloodPriority, FloodWorker};
pub use crate::pool::{FloodExecutorService, SubmissionPolicy, SHUTDOWN_GRACE};
pub use crate::report::{write_artifact, FloodSummary, TorrentSummary};
pub use crate::session::{FloodSession, SessionState};
pub use crate::target::Target;
pub use crate::torrent::{Torrent, TorrentBuilder};
