//! Seams to the external collaborators used by the stage-tasks.
//!
//! The browser-automation service (account warmup and item collection) and
//! the vision scoring service are only known through these traits.
//! Production implementations live in `pinrelay-automation`; tests supply
//! in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messages::clamp_score;

/// Errors reported by an external collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// The service could not be reached or the call timed out.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The service answered with an error.
    #[error("{service} rejected the request ({status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The service answered with something we could not interpret.
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

/// Ordered warmup steps driven against the automation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupStep {
    LaunchBrowser,
    SignIn,
    CreateBoard,
    SeedBoard,
    OpenRecommendations,
}

impl WarmupStep {
    /// Every step, in execution order.
    pub const ALL: [WarmupStep; 5] = [
        WarmupStep::LaunchBrowser,
        WarmupStep::SignIn,
        WarmupStep::CreateBoard,
        WarmupStep::SeedBoard,
        WarmupStep::OpenRecommendations,
    ];

    /// Path segment used by the automation service.
    pub fn as_str(self) -> &'static str {
        match self {
            WarmupStep::LaunchBrowser => "launch_browser",
            WarmupStep::SignIn => "sign_in",
            WarmupStep::CreateBoard => "create_board",
            WarmupStep::SeedBoard => "seed_board",
            WarmupStep::OpenRecommendations => "open_recommendations",
        }
    }

    /// Human-readable progress line.
    pub fn describe(self) -> &'static str {
        match self {
            WarmupStep::LaunchBrowser => "Starting browser",
            WarmupStep::SignIn => "Signing in",
            WarmupStep::CreateBoard => "Creating board",
            WarmupStep::SeedBoard => "Saving pins to board",
            WarmupStep::OpenRecommendations => "Opening recommendations",
        }
    }
}

/// An item as collected from the recommendations page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    /// Identifier assigned by the source site, if any.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub image_url: String,
    /// Raw link as found on the page; may be relative.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Result of scoring an image against the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
}

impl Score {
    /// Copy of this score with the value clamped into `[0, 1]`.
    pub fn clamped(&self) -> Score {
        Score {
            score: clamp_score(self.score),
            explanation: self.explanation.clone(),
        }
    }
}

/// Opens browser-automation sessions.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Open a fresh automation session for `prompt`.
    async fn open(&self, prompt: &str) -> Result<Box<dyn ScrapeSession>, CollaboratorError>;
}

/// A live automation session. Must be closed by the caller on every path.
#[async_trait]
pub trait ScrapeSession: Send + Sync {
    async fn warm_up(&self, step: WarmupStep) -> Result<(), CollaboratorError>;

    /// Collect items from the recommendations page.
    async fn collect(&self) -> Result<Vec<ScrapedItem>, CollaboratorError>;

    /// URL of the page the session is currently on.
    fn current_url(&self) -> Option<String>;

    async fn close(&self) -> Result<(), CollaboratorError>;
}

impl std::fmt::Debug for dyn ScrapeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeSession").finish_non_exhaustive()
    }
}

/// Scores an image against the prompt text.
#[async_trait]
pub trait ImageScorer: Send + Sync {
    async fn score(&self, image_url: &str, prompt: &str) -> Result<Score, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_steps_are_in_execution_order() {
        assert_eq!(WarmupStep::ALL.first(), Some(&WarmupStep::LaunchBrowser));
        assert_eq!(WarmupStep::ALL.last(), Some(&WarmupStep::OpenRecommendations));
        assert_eq!(WarmupStep::SeedBoard.as_str(), "seed_board");
    }

    #[test]
    fn scraped_item_tolerates_missing_optional_fields() {
        let item: ScrapedItem =
            serde_json::from_str(r#"{"image_url":"https://i.example/a.jpg"}"#).unwrap();
        assert_eq!(item.title, "");
        assert_eq!(item.link, None);
    }

    #[test]
    fn score_clamps() {
        let s = Score {
            score: -0.2,
            explanation: "off".into(),
        };
        assert_eq!(s.clamped().score, 0.0);
    }
}
