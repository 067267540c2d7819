//! Repository for the `jobs` table.

use pinrelay_core::status::JobStatus;
use pinrelay_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::Job;

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, input_text, status_id, created_at, updated_at";

/// Provides persistence for submitted jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a pending job.
    pub async fn create(pool: &PgPool, id: JobId, input_text: &str) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, input_text, status_id) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(input_text)
            .bind(JobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set the job's status. Returns `false` if the job does not exist.
    pub async fn update_status(
        pool: &PgPool,
        id: JobId,
        status: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET status_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
