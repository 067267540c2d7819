//! Session State Tracker.
//!
//! Every stage/status change is decided by the pure functions on
//! [`SessionState`] so the PostgreSQL tracker here and the in-memory one in
//! [`crate::memory`] enforce identical rules. Re-applying the current stage
//! or status is a no-op, which makes stage-tasks safe to retry.

use async_trait::async_trait;
use pinrelay_core::session::{Session, SessionState, Transition, TransitionError};
use pinrelay_core::status::{SessionStatus, Stage};
use pinrelay_core::types::{JobId, SessionId};
use pinrelay_db::repositories::SessionRepo;
use sqlx::PgPool;

use crate::error::TrackerError;

#[async_trait]
pub trait SessionTracker: Send + Sync {
    /// Create the session of a new job in the initial state.
    async fn create(&self, session_id: SessionId, job_id: JobId) -> Result<Session, TrackerError>;

    /// Move the job's session to `stage` (status resets to pending).
    async fn advance_stage(&self, job_id: JobId, stage: Stage) -> Result<Session, TrackerError>;

    /// Set the status of the session's current stage.
    async fn set_status(&self, job_id: JobId, status: SessionStatus) -> Result<Session, TrackerError>;

    /// Append one line to the session log.
    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), TrackerError>;

    async fn get(&self, job_id: JobId) -> Result<Session, TrackerError>;
}

/// Tracker backed by the `sessions` table.
#[derive(Clone)]
pub struct PgSessionTracker {
    pool: PgPool,
}

impl PgSessionTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the session row, decide the transition, and write it back in
    /// one transaction.
    async fn transition<F>(&self, job_id: JobId, decide: F) -> Result<Session, TrackerError>
    where
        F: FnOnce(SessionState) -> Result<Transition, TransitionError> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = SessionRepo::lock_by_job(&mut tx, job_id)
            .await?
            .ok_or(TrackerError::NotFound(job_id))?;
        let mut session = Session::try_from(row)?;

        let transition = decide(session.state())
            .map_err(|source| TrackerError::InvalidTransition { job_id, source })?;

        if let Transition::Changed(next) = transition {
            SessionRepo::update_state(&mut tx, job_id, next).await?;
            session.apply(next);
            tracing::debug!(
                %job_id,
                stage = %next.stage,
                status = %next.status,
                "Session transitioned",
            );
        }

        tx.commit().await?;
        Ok(session)
    }
}

#[async_trait]
impl SessionTracker for PgSessionTracker {
    async fn create(&self, session_id: SessionId, job_id: JobId) -> Result<Session, TrackerError> {
        let row = SessionRepo::create(&self.pool, session_id, job_id).await?;
        Ok(Session::try_from(row)?)
    }

    async fn advance_stage(&self, job_id: JobId, stage: Stage) -> Result<Session, TrackerError> {
        self.transition(job_id, |state| state.advance_to(stage)).await
    }

    async fn set_status(&self, job_id: JobId, status: SessionStatus) -> Result<Session, TrackerError> {
        self.transition(job_id, |state| state.with_status(status)).await
    }

    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), TrackerError> {
        if SessionRepo::append_log(&self.pool, job_id, line).await? {
            Ok(())
        } else {
            Err(TrackerError::NotFound(job_id))
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Session, TrackerError> {
        let row = SessionRepo::find_by_job(&self.pool, job_id)
            .await?
            .ok_or(TrackerError::NotFound(job_id))?;
        Ok(Session::try_from(row)?)
    }
}
