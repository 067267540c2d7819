//! Job (externally "prompt") rows.

use pinrelay_core::status::{JobStatus, StatusId};
use pinrelay_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: JobId,
    pub input_text: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Decoded status. Unknown ids (schema drift) read as `Error`.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_id(self.status_id).unwrap_or(JobStatus::Error)
    }
}

/// API representation of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub text: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            status: job.status(),
            id: job.id,
            text: job.input_text,
            created_at: job.created_at,
        }
    }
}
