// File: src/error.rs
//
// Harness Error Types
//
// Only usage errors (lifecycle violations, invalid construction arguments)
// surface as `Err` values. Everything that happens *during* a flood -
// instability, timeouts, cancellations, shutdown escalation - is reported
// through `Target` state, partial result lists, and log records instead,
// because tolerating and reporting instability is the harness's entire job.

use thiserror::Error;

use crate::session::SessionState;

/// Errors returned by harness construction and lifecycle operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidState {
        /// State the operation requires
        expected: SessionState,
        /// State the session was actually in
        found: SessionState,
    },

    /// A constructor or builder argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `TorrentBuilder::build()` was called without registering any gate.
    #[error("torrent requires at least one flood gate")]
    NoFloodGates,

    /// The OS refused to spawn a pool thread.
    #[error("failed to spawn pool thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Convenience alias used across the harness.
pub type Result<T> = std::result::Result<T, HarnessError>;
