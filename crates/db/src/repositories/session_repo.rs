//! Repository for the `sessions` table.
//!
//! Stage/status changes go through [`SessionRepo::lock_by_job`] +
//! [`SessionRepo::update_state`] inside one transaction; log lines are
//! appended atomically with `array_append` so concurrent writers never
//! lose a line.

use pinrelay_core::session::SessionState;
use pinrelay_core::types::{JobId, SessionId};
use sqlx::{PgConnection, PgExecutor};

use crate::models::session::SessionRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, job_id, stage_id, status_id, log, created_at, updated_at";

/// Provides persistence for job sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session in the initial state.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        id: SessionId,
        job_id: JobId,
    ) -> Result<SessionRow, sqlx::Error> {
        let initial = SessionState::INITIAL;
        let query = format!(
            "INSERT INTO sessions (id, job_id, stage_id, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .bind(job_id)
            .bind(initial.stage.id())
            .bind(initial.status.id())
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_job<'e>(
        executor: impl PgExecutor<'e>,
        job_id: JobId,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE job_id = $1");
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(job_id)
            .fetch_optional(executor)
            .await
    }

    /// Read the session row with `FOR UPDATE`, holding the row lock until
    /// the surrounding transaction ends.
    pub async fn lock_by_job(
        conn: &mut PgConnection,
        job_id: JobId,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE job_id = $1 FOR UPDATE");
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(job_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn update_state(
        conn: &mut PgConnection,
        job_id: JobId,
        state: SessionState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions SET stage_id = $2, status_id = $3, updated_at = NOW() \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(state.stage.id())
        .bind(state.status.id())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Append one line to the session log. Returns `false` if the session
    /// does not exist.
    pub async fn append_log<'e>(
        executor: impl PgExecutor<'e>,
        job_id: JobId,
        line: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET log = array_append(log, $2), updated_at = NOW() \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(line)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
