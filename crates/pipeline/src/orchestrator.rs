//! Job Pipeline Orchestrator.
//!
//! A submitted job runs its stage-tasks in [`CHAIN`] order on one spawned
//! task. A stage that returns an error has already failed the session and
//! the job; the chain stops there.

use std::sync::Arc;
use std::time::Duration;

use pinrelay_core::status::JobStatus;
use pinrelay_core::types::{new_id, JobId, SessionId};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::error::StageError;
use crate::stages::{validation, warmup_scraping, StageContext};

/// One unit of the ordered pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTask {
    WarmupScraping,
    Validation,
}

/// Stage-tasks in execution order.
pub const CHAIN: [StageTask; 2] = [StageTask::WarmupScraping, StageTask::Validation];

impl StageTask {
    pub fn name(self) -> &'static str {
        match self {
            StageTask::WarmupScraping => "warmup_scraping",
            StageTask::Validation => "validation",
        }
    }

    pub async fn run(
        self,
        ctx: &StageContext,
        job_id: JobId,
        session_id: SessionId,
        prompt: &str,
    ) -> Result<(), StageError> {
        match self {
            StageTask::WarmupScraping => warmup_scraping::run(ctx, job_id, session_id, prompt).await,
            StageTask::Validation => validation::run(ctx, job_id, session_id, prompt).await,
        }
    }
}

/// Ids assigned to a newly created job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedJob {
    pub job_id: JobId,
    pub session_id: SessionId,
}

pub struct Orchestrator {
    ctx: Arc<StageContext>,
    tasks: TaskTracker,
}

impl Orchestrator {
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            tasks: TaskTracker::new(),
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Persist a new pending job and its initial session.
    ///
    /// If the session cannot be created the job is marked `error` so it
    /// never sits pending without a session.
    pub async fn create_job(&self, input_text: &str) -> Result<CreatedJob, StageError> {
        let job_id = new_id();
        let session_id = new_id();

        self.ctx.jobs.create_job(job_id, input_text).await?;
        if let Err(e) = self.ctx.tracker.create(session_id, job_id).await {
            tracing::error!(%job_id, error = %e, "Failed to create session");
            if let Err(status_err) = self.ctx.jobs.set_job_status(job_id, JobStatus::Error).await {
                tracing::error!(%job_id, error = %status_err, "Failed to mark job error");
            }
            return Err(e.into());
        }

        tracing::info!(%job_id, %session_id, "Job created");
        Ok(CreatedJob { job_id, session_id })
    }

    /// Start the stage chain for a job in the background.
    pub fn submit(
        &self,
        job_id: JobId,
        session_id: SessionId,
        input_text: String,
    ) -> JoinHandle<Result<(), StageError>> {
        let ctx = Arc::clone(&self.ctx);
        let span = tracing::info_span!("pipeline", %job_id);
        self.tasks.spawn(
            async move {
                tracing::info!("Pipeline started");
                let result = run_chain(&ctx, job_id, session_id, &input_text).await;
                match &result {
                    Ok(()) => tracing::info!("Pipeline completed"),
                    Err(e) => tracing::error!(error = %e, "Pipeline failed"),
                }
                result
            }
            .instrument(span),
        )
    }

    /// Number of chains still running.
    pub fn active_chains(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting chains and wait up to `timeout` for running ones.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Pipeline chains still running at shutdown",
            );
        }
    }
}

async fn run_chain(
    ctx: &StageContext,
    job_id: JobId,
    session_id: SessionId,
    prompt: &str,
) -> Result<(), StageError> {
    for task in CHAIN {
        tracing::debug!(stage_task = task.name(), "Stage-task starting");
        task.run(ctx, job_id, session_id, prompt).await?;
    }
    Ok(())
}
