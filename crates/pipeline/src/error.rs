use pinrelay_core::collaborators::CollaboratorError;
use pinrelay_core::session::TransitionError;
use pinrelay_core::types::JobId;

/// Failure of the durable store behind the tracker or the item/job stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid session transition for job {job_id}: {source}")]
    InvalidTransition {
        job_id: JobId,
        #[source]
        source: TransitionError,
    },

    #[error("no session for job {0}")]
    NotFound(JobId),
}

impl From<sqlx::Error> for TrackerError {
    fn from(e: sqlx::Error) -> Self {
        TrackerError::Storage(StorageError::Database(e))
    }
}

/// A whole-stage failure. Aborts the stage and fails the job.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("stage aborted: {0}")]
    Aborted(String),
}
