//! Stage-tasks and the helpers they share.
//!
//! A stage-task updates the session, calls the external collaborators, and
//! publishes one progress event per unit of work. Broadcast, log and
//! session-storage failures are absorbed here; only a [`StageError`]
//! returned from the stage body fails the job.

pub mod validation;
pub mod warmup_scraping;

use std::sync::Arc;

use pinrelay_core::collaborators::Scraper;
use pinrelay_core::messages::ProgressEvent;
use pinrelay_core::session::TransitionError;
use pinrelay_core::status::{JobStatus, SessionStatus, Stage};
use pinrelay_core::types::{JobId, SessionId};
use pinrelay_events::BroadcastPublisher;

use crate::config::PipelineConfig;
use crate::error::{StageError, TrackerError};
use crate::scoring::ScoringPool;
use crate::store::{ItemStore, JobStore};
use crate::tracker::SessionTracker;

/// Everything a stage-task needs. Built once at startup and shared by
/// every chain.
pub struct StageContext {
    pub tracker: Arc<dyn SessionTracker>,
    pub jobs: Arc<dyn JobStore>,
    pub items: Arc<dyn ItemStore>,
    pub publisher: BroadcastPublisher,
    pub scraper: Arc<dyn Scraper>,
    pub scoring: ScoringPool,
    pub config: PipelineConfig,
}

/// One stage-task execution for one job.
pub(crate) struct StageRun<'a> {
    pub ctx: &'a StageContext,
    pub job_id: JobId,
    pub session_id: SessionId,
}

impl<'a> StageRun<'a> {
    pub fn new(ctx: &'a StageContext, job_id: JobId, session_id: SessionId) -> Self {
        Self {
            ctx,
            job_id,
            session_id,
        }
    }

    /// Append to the session log. Storage failures are logged only.
    pub async fn log(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if let Err(e) = self.ctx.tracker.append_log(self.job_id, line).await {
            tracing::warn!(job_id = %self.job_id, error = %e, line, "Failed to append session log");
        }
    }

    /// Publish `event`. A failed broadcast is logged and recorded in the
    /// session log, never propagated.
    pub async fn broadcast(&self, event: &ProgressEvent) {
        if let Err(e) = self.ctx.publisher.publish(self.job_id, event).await {
            tracing::warn!(
                job_id = %self.job_id,
                event_type = event.type_name(),
                error = %e,
                "Broadcast error",
            );
            self.log(format!("Broadcast error: {e}")).await;
        }
    }

    /// Warmup progress: logged as `Warmup: <message>` and published.
    pub async fn announce(&self, message: &str) {
        tracing::info!(job_id = %self.job_id, "Warmup: {message}");
        self.log(format!("Warmup: {message}")).await;
        self.broadcast(&ProgressEvent::warmup(message)).await;
    }

    /// Move the session to `stage`.
    ///
    /// A retried stage may find the session already past `stage`; that is
    /// logged and ignored. A storage failure is logged and the stage goes
    /// on. A failed or missing session aborts the stage.
    pub async fn advance(&self, stage: Stage) -> Result<(), StageError> {
        match self.ctx.tracker.advance_stage(self.job_id, stage).await {
            Ok(_) => Ok(()),
            Err(e) => self.absorb_transition(e).await,
        }
    }

    pub async fn set_status(&self, status: SessionStatus) -> Result<(), StageError> {
        match self.ctx.tracker.set_status(self.job_id, status).await {
            Ok(_) => Ok(()),
            Err(e) => self.absorb_transition(e).await,
        }
    }

    async fn absorb_transition(&self, error: TrackerError) -> Result<(), StageError> {
        match error {
            TrackerError::Storage(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record session transition");
                self.log(format!("Failed to record session transition: {e}")).await;
                Ok(())
            }
            TrackerError::InvalidTransition {
                source: TransitionError::Failed,
                ..
            } => Err(StageError::Aborted(format!(
                "session for job {} has already failed",
                self.job_id
            ))),
            TrackerError::InvalidTransition { source, .. } => {
                tracing::warn!(job_id = %self.job_id, error = %source, "Ignoring stale session transition");
                Ok(())
            }
            other => Err(other.into()),
        }
    }

    pub async fn set_job_status(&self, status: JobStatus) {
        match self.ctx.jobs.set_job_status(self.job_id, status).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id = %self.job_id, "Job vanished before status update"),
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, %status, "Failed to update job status")
            }
        }
    }

    /// Failure handler: record the error, fail the session and the job,
    /// and hand the error back to the caller.
    pub async fn fail(&self, error: StageError) -> StageError {
        tracing::error!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            error = %error,
            "Stage failed",
        );
        self.log(format!("Stage failed: {error}")).await;
        if let Err(e) = self
            .ctx
            .tracker
            .set_status(self.job_id, SessionStatus::Failed)
            .await
        {
            tracing::error!(job_id = %self.job_id, error = %e, "Failed to mark session failed");
        }
        self.set_job_status(JobStatus::Error).await;
        error
    }
}
