//! Scraped item rows and DTOs.

use pinrelay_core::status::{ItemStatus, StatusId};
use pinrelay_core::types::{ItemId, JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `items` table.
#[derive(Debug, Clone, FromRow)]
pub struct Item {
    pub id: ItemId,
    pub job_id: JobId,
    pub external_id: Option<String>,
    pub title: String,
    pub image_url: String,
    pub item_url: String,
    pub description: String,
    pub match_score: Option<f64>,
    pub status_id: StatusId,
    pub explanation: String,
    pub collected_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Item {
    pub fn status(&self) -> ItemStatus {
        ItemStatus::from_id(self.status_id).unwrap_or(ItemStatus::Pending)
    }
}

/// DTO for inserting a scraped item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub external_id: Option<String>,
    pub title: String,
    pub image_url: String,
    pub item_url: String,
    pub description: String,
}

/// API representation of an item and its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub title: String,
    pub image_url: String,
    pub item_url: String,
    pub match_score: Option<f64>,
    pub status: ItemStatus,
    pub explanation: String,
    pub collected_at: Timestamp,
}

impl From<Item> for ItemView {
    fn from(item: Item) -> Self {
        Self {
            status: item.status(),
            id: item.id,
            title: item.title,
            image_url: item.image_url,
            item_url: item.item_url,
            match_score: item.match_score,
            explanation: item.explanation,
            collected_at: item.collected_at,
        }
    }
}
