//! Progress events pushed from stage-tasks to subscribed clients.
//!
//! On the wire each event is a JSON object with a `type` discriminator:
//!
//! ```json
//! {"type":"warmup","message":"Warmup started for boho bedroom!"}
//! {"type":"scraped_item","item_id":"...","title":"...","image_url":"...","item_url":"..."}
//! {"type":"validation","item_id":"...","score":0.82,"label":"...","valid":true}
//! ```
//!
//! Server-side decoding is strict ([`ProgressEvent::from_json`] rejects
//! unknown tags). Clients use [`ProgressEvent::decode_lenient`], which skips
//! event types added after they were built.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::ItemId;

/// Wire names of every known event type.
pub const KNOWN_EVENT_TYPES: [&str; 3] = ["warmup", "scraped_item", "validation"];

/// Label used when a scorer gives no explanation.
const EMPTY_LABEL: &str = "no explanation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Free-text progress during account warmup.
    Warmup { message: String },

    /// An item was collected and stored.
    ScrapedItem {
        item_id: ItemId,
        title: String,
        image_url: String,
        item_url: String,
    },

    /// An item was scored against the prompt.
    Validation {
        item_id: ItemId,
        score: f64,
        label: String,
        valid: bool,
    },
}

impl ProgressEvent {
    pub fn warmup(message: impl Into<String>) -> Self {
        Self::Warmup {
            message: message.into(),
        }
    }

    /// Build a validation event. `score` is clamped to `[0, 1]` (non-finite
    /// values become 0) and `valid` is derived from `min_score`.
    pub fn validation(item_id: ItemId, score: f64, label: &str, min_score: f64) -> Self {
        let score = clamp_score(score);
        let label = if label.trim().is_empty() {
            EMPTY_LABEL.to_string()
        } else {
            label.to_string()
        };
        Self::Validation {
            item_id,
            score,
            label,
            valid: score >= min_score,
        }
    }

    /// Wire name of this event's `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Warmup { .. } => "warmup",
            Self::ScrapedItem { .. } => "scraped_item",
            Self::Validation { .. } => "validation",
        }
    }

    /// Check the field constraints of the variant.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Warmup { message } if message.trim().is_empty() => Err(CoreError::Validation(
                "warmup message must not be empty".into(),
            )),
            Self::ScrapedItem { image_url, .. } if image_url.is_empty() => Err(
                CoreError::Validation("scraped_item image_url must not be empty".into()),
            ),
            Self::Validation { score, .. } if !(0.0..=1.0).contains(score) => Err(
                CoreError::Validation(format!("validation score {score} is outside [0, 1]")),
            ),
            Self::Validation { label, .. } if label.is_empty() => Err(CoreError::Validation(
                "validation label must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Strict decode: unknown `type` values are errors.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Client-side decode: returns `Ok(None)` for event types this build
    /// does not know about instead of failing.
    pub fn decode_lenient(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let known = value
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| KNOWN_EVENT_TYPES.contains(&t));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }
}

/// Clamp a raw model score into `[0, 1]`.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
