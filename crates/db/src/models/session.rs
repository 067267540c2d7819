//! Session rows and their conversion into the domain [`Session`].

use pinrelay_core::session::Session;
use pinrelay_core::status::{SessionStatus, Stage, StatusId};
use pinrelay_core::types::{JobId, SessionId, Timestamp};
use sqlx::FromRow;

/// A row from the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: SessionId,
    pub job_id: JobId,
    pub stage_id: StatusId,
    pub status_id: StatusId,
    pub log: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<SessionRow> for Session {
    type Error = sqlx::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let stage = Stage::from_id(row.stage_id)
            .ok_or_else(|| decode_error("stage_id", row.stage_id))?;
        let status = SessionStatus::from_id(row.status_id)
            .ok_or_else(|| decode_error("status_id", row.status_id))?;
        Ok(Session {
            id: row.id,
            job_id: row.job_id,
            stage,
            status,
            log: row.log,
            updated_at: row.updated_at,
        })
    }
}

fn decode_error(column: &str, id: StatusId) -> sqlx::Error {
    sqlx::Error::Decode(format!("unknown {column} {id} in sessions").into())
}
