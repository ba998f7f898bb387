// File: src/session.rs
//
// Shared Session Lifecycle
//
// Both concrete harnesses (Floodgate, Torrent) compose the same small
// lifecycle value instead of inheriting from a common base class. State only
// moves forward (CLOSED -> OPENED -> FLOODED), with the single exception that
// an OPENED session may be closed again without flooding.

use std::fmt;

use crate::error::{HarnessError, Result};

/// Lifecycle state of a flood session.
///
/// ```text
/// CLOSED --open()--> OPENED --flood()--> FLOODED (terminal)
///    ^                  |
///    +----- close() ----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no workers submitted yet. `open()` is valid here.
    Closed,
    /// Workers are submitted and parked at the marshal. `flood()` and
    /// `close()` are valid here.
    Opened,
    /// The flood ran (successfully, partially, or timed out). Terminal.
    Flooded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Closed => write!(f, "CLOSED"),
            SessionState::Opened => write!(f, "OPENED"),
            SessionState::Flooded => write!(f, "FLOODED"),
        }
    }
}

/// Session lifecycle helper composed by `Floodgate` and `Torrent`.
///
/// Validates transitions so each harness only has to say what state an
/// operation requires, not re-implement the state machine.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl SessionLifecycle {
    /// New lifecycle, starting CLOSED.
    pub fn new() -> Self {
        Self {
            state: SessionState::Closed,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Fail with `InvalidState` unless the session is in `expected`.
    pub fn ensure(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(HarnessError::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Move to `next` after validating the transition is legal.
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        let legal = matches!(
            (self.state, next),
            (SessionState::Closed, SessionState::Opened)
                | (SessionState::Opened, SessionState::Flooded)
                | (SessionState::Opened, SessionState::Closed)
        );
        if !legal {
            return Err(HarnessError::InvalidState {
                expected: next,
                found: self.state,
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Common interface over both flood harnesses.
///
/// `Floodgate` produces a per-worker result list; `Torrent` produces a
/// name-keyed map of such lists, so the flood output is an associated type.
pub trait FloodSession {
    /// What `flood()` yields on completion.
    type Output;

    /// Submit workers and park them at the marshal. Valid only in CLOSED.
    fn open(&mut self) -> Result<()>;

    /// Abort an opened session without flooding. Valid only in OPENED.
    fn close(&mut self) -> Result<()>;

    /// Release workers (or defer to an external coordinator), wait for
    /// completion, tear down, and collect results. Valid only in OPENED.
    fn flood(&mut self) -> Result<Self::Output>;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut lc = SessionLifecycle::new();
        assert_eq!(lc.state(), SessionState::Closed);

        lc.advance(SessionState::Opened).unwrap();
        assert_eq!(lc.state(), SessionState::Opened);

        lc.advance(SessionState::Flooded).unwrap();
        assert_eq!(lc.state(), SessionState::Flooded);
    }

    #[test]
    fn test_reopen_after_close() {
        let mut lc = SessionLifecycle::new();
        lc.advance(SessionState::Opened).unwrap();
        lc.advance(SessionState::Closed).unwrap();
        lc.advance(SessionState::Opened).unwrap();
        assert_eq!(lc.state(), SessionState::Opened);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut lc = SessionLifecycle::new();
        // CLOSED -> FLOODED skips opening
        assert!(lc.advance(SessionState::Flooded).is_err());

        lc.advance(SessionState::Opened).unwrap();
        lc.advance(SessionState::Flooded).unwrap();
        // FLOODED is terminal
        assert!(lc.advance(SessionState::Opened).is_err());
        assert!(lc.advance(SessionState::Closed).is_err());
    }

    #[test]
    fn test_ensure() {
        let lc = SessionLifecycle::new();
        assert!(lc.ensure(SessionState::Closed).is_ok());
        assert!(lc.ensure(SessionState::Opened).is_err());
    }
}
