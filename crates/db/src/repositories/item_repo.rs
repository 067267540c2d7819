//! Repository for the `items` table.

use pinrelay_core::status::ItemStatus;
use pinrelay_core::types::{ItemId, JobId};
use sqlx::PgPool;

use crate::models::item::{Item, NewItem};

const COLUMNS: &str = "id, job_id, external_id, title, image_url, item_url, description, \
                       match_score, status_id, explanation, collected_at, updated_at";

/// Provides persistence for scraped items and their verdicts.
pub struct ItemRepo;

impl ItemRepo {
    /// Insert an item, or refresh the existing row for the same
    /// `(job_id, image_url)`. Re-running a scraping stage therefore returns
    /// the original item id instead of creating a duplicate.
    pub async fn upsert(
        pool: &PgPool,
        id: ItemId,
        job_id: JobId,
        input: &NewItem,
    ) -> Result<Item, sqlx::Error> {
        let query = format!(
            "INSERT INTO items (id, job_id, external_id, title, image_url, item_url, description, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT ON CONSTRAINT uq_items_job_image DO UPDATE \
             SET title = EXCLUDED.title, item_url = EXCLUDED.item_url, \
                 description = EXCLUDED.description, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Item>(&query)
            .bind(id)
            .bind(job_id)
            .bind(&input.external_id)
            .bind(&input.title)
            .bind(&input.image_url)
            .bind(&input.item_url)
            .bind(&input.description)
            .bind(ItemStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// All items of a job in collection order.
    pub async fn list_by_job(pool: &PgPool, job_id: JobId) -> Result<Vec<Item>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM items WHERE job_id = $1 ORDER BY collected_at, id"
        );
        sqlx::query_as::<_, Item>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Store the validation verdict for an item.
    pub async fn record_verdict(
        pool: &PgPool,
        id: ItemId,
        status: ItemStatus,
        score: f64,
        explanation: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE items SET status_id = $2, match_score = $3, explanation = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(score)
        .bind(explanation)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
