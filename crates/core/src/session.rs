//! Session record and its stage/status state machine.
//!
//! ```text
//! warmup ──> scraping ──> validation ──> completed
//!    │           │             │
//!    └───────────┴─────────────┴──> failed (absorbing)
//! ```
//!
//! The transition functions are pure so the PostgreSQL and in-memory
//! trackers apply exactly the same rules.

use serde::Serialize;

use crate::status::{SessionStatus, Stage};
use crate::types::{JobId, SessionId, Timestamp};

/// Durable progress record of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub job_id: JobId,
    pub stage: Stage,
    pub status: SessionStatus,
    /// Append-only, in insertion order.
    pub log: Vec<String>,
    pub updated_at: Timestamp,
}

impl Session {
    /// A fresh session in the initial state.
    pub fn new(id: SessionId, job_id: JobId) -> Self {
        let state = SessionState::INITIAL;
        Self {
            id,
            job_id,
            stage: state.stage,
            status: state.status,
            log: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            stage: self.stage,
            status: self.status,
        }
    }

    /// Overwrite stage and status with `state`, bumping `updated_at`.
    pub fn apply(&mut self, state: SessionState) {
        self.stage = state.stage;
        self.status = state.status;
        self.updated_at = chrono::Utc::now();
    }
}

/// Rejected session transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("session has failed; no further transitions are allowed")]
    Failed,

    #[error("session has completed its final stage")]
    Completed,

    #[error("stage cannot move backward from {from} to {to}")]
    Backward { from: Stage, to: Stage },
}

/// Outcome of an accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The requested state is already current.
    Unchanged,
    /// The session moves to the contained state.
    Changed(SessionState),
}

/// Stage + status pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub stage: Stage,
    pub status: SessionStatus,
}

impl SessionState {
    pub const INITIAL: SessionState = SessionState {
        stage: Stage::Warmup,
        status: SessionStatus::Pending,
    };

    /// Failed, or completed on the final stage.
    pub fn is_terminal(self) -> bool {
        self.status == SessionStatus::Failed
            || (self.stage == Stage::FINAL && self.status == SessionStatus::Completed)
    }

    /// Move to `stage`. Entering a later stage resets status to pending.
    pub fn advance_to(self, stage: Stage) -> Result<Transition, TransitionError> {
        if self.status == SessionStatus::Failed {
            return Err(TransitionError::Failed);
        }
        if stage == self.stage {
            return Ok(Transition::Unchanged);
        }
        if stage < self.stage {
            return Err(TransitionError::Backward {
                from: self.stage,
                to: stage,
            });
        }
        Ok(Transition::Changed(SessionState {
            stage,
            status: SessionStatus::Pending,
        }))
    }

    /// Set the status of the current stage.
    pub fn with_status(self, status: SessionStatus) -> Result<Transition, TransitionError> {
        if status == self.status {
            return Ok(Transition::Unchanged);
        }
        if self.status == SessionStatus::Failed {
            return Err(TransitionError::Failed);
        }
        if self.is_terminal() {
            return Err(TransitionError::Completed);
        }
        Ok(Transition::Changed(SessionState {
            stage: self.stage,
            status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn state(stage: Stage, status: SessionStatus) -> SessionState {
        SessionState { stage, status }
    }

    #[test]
    fn initial_state_is_pending_warmup() {
        assert_eq!(SessionState::INITIAL, state(Stage::Warmup, SessionStatus::Pending));
        assert!(!SessionState::INITIAL.is_terminal());
    }

    #[test]
    fn advancing_to_current_stage_is_noop() {
        let s = state(Stage::Scraping, SessionStatus::Pending);
        assert_eq!(s.advance_to(Stage::Scraping), Ok(Transition::Unchanged));
    }

    #[test]
    fn advancing_forward_resets_status() {
        let s = state(Stage::Warmup, SessionStatus::Completed);
        assert_eq!(
            s.advance_to(Stage::Validation),
            Ok(Transition::Changed(state(Stage::Validation, SessionStatus::Pending)))
        );
    }

    #[test]
    fn advancing_backward_is_rejected() {
        let s = state(Stage::Validation, SessionStatus::Pending);
        assert_matches!(
            s.advance_to(Stage::Warmup),
            Err(TransitionError::Backward {
                from: Stage::Validation,
                to: Stage::Warmup
            })
        );
    }

    #[test]
    fn failed_session_is_absorbing() {
        let s = state(Stage::Scraping, SessionStatus::Failed);
        assert!(s.is_terminal());
        assert_eq!(s.advance_to(Stage::Validation), Err(TransitionError::Failed));
        assert_eq!(s.with_status(SessionStatus::Completed), Err(TransitionError::Failed));
        assert_eq!(s.with_status(SessionStatus::Pending), Err(TransitionError::Failed));
        assert_eq!(s.with_status(SessionStatus::Failed), Ok(Transition::Unchanged));
    }

    #[test]
    fn completed_intermediate_stage_allows_advance() {
        let s = state(Stage::Scraping, SessionStatus::Completed);
        assert!(!s.is_terminal());
        assert_matches!(s.advance_to(Stage::Validation), Ok(Transition::Changed(_)));
    }

    #[test]
    fn completed_final_stage_is_terminal() {
        let s = state(Stage::Validation, SessionStatus::Completed);
        assert!(s.is_terminal());
        assert_eq!(s.with_status(SessionStatus::Failed), Err(TransitionError::Completed));
        assert_eq!(s.with_status(SessionStatus::Completed), Ok(Transition::Unchanged));
    }

    #[test]
    fn apply_updates_stage_and_status() {
        let mut session = Session::new(uuid::Uuid::nil(), uuid::Uuid::nil());
        session.apply(state(Stage::Scraping, SessionStatus::Completed));
        assert_eq!(session.state(), state(Stage::Scraping, SessionStatus::Completed));
    }
}
