//! Job and item stores used by the stage-tasks.

use async_trait::async_trait;
use pinrelay_core::status::{ItemStatus, JobStatus};
use pinrelay_core::types::{new_id, ItemId, JobId};
use pinrelay_db::models::item::{Item, NewItem};
use pinrelay_db::models::job::Job;
use pinrelay_db::repositories::{ItemRepo, JobRepo};
use sqlx::PgPool;

use crate::error::StorageError;

/// Validation verdict for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: ItemStatus,
    pub score: f64,
    pub explanation: String,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job_id: JobId, input_text: &str) -> Result<Job, StorageError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StorageError>;

    /// Returns `false` if the job does not exist.
    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Store a scraped item. Saving the same image twice for a job returns
    /// the existing item.
    async fn save_item(&self, job_id: JobId, item: &NewItem) -> Result<Item, StorageError>;

    /// Items of the job in collection order.
    async fn items_for_job(&self, job_id: JobId) -> Result<Vec<Item>, StorageError>;

    /// Returns `false` if the item does not exist.
    async fn record_verdict(&self, item_id: ItemId, verdict: &Verdict) -> Result<bool, StorageError>;
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job_id: JobId, input_text: &str) -> Result<Job, StorageError> {
        Ok(JobRepo::create(&self.pool, job_id, input_text).await?)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StorageError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<bool, StorageError> {
        Ok(JobRepo::update_status(&self.pool, job_id, status).await?)
    }
}

#[derive(Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn save_item(&self, job_id: JobId, item: &NewItem) -> Result<Item, StorageError> {
        Ok(ItemRepo::upsert(&self.pool, new_id(), job_id, item).await?)
    }

    async fn items_for_job(&self, job_id: JobId) -> Result<Vec<Item>, StorageError> {
        Ok(ItemRepo::list_by_job(&self.pool, job_id).await?)
    }

    async fn record_verdict(&self, item_id: ItemId, verdict: &Verdict) -> Result<bool, StorageError> {
        Ok(ItemRepo::record_verdict(
            &self.pool,
            item_id,
            verdict.status,
            verdict.score,
            &verdict.explanation,
        )
        .await?)
    }
}
