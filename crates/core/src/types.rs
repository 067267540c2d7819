/// Identifier of a submitted job (externally a "prompt").
pub type JobId = uuid::Uuid;

/// Identifier of the session record tracking a job.
pub type SessionId = uuid::Uuid;

/// Identifier of a scraped item.
pub type ItemId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new time-ordered identifier.
pub fn new_id() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
