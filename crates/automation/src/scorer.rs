//! Client for the vision scoring service (`POST /score`).

use async_trait::async_trait;
use pinrelay_core::collaborators::{CollaboratorError, ImageScorer, Score};
use serde::Serialize;

use crate::api::{parse_response, ApiError};

const SERVICE: &str = "scoring";

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    image_url: &'a str,
    prompt: &'a str,
}

/// Scores images against prompt text over HTTP.
#[derive(Clone)]
pub struct HttpImageScorer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpImageScorer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ImageScorer for HttpImageScorer {
    async fn score(&self, image_url: &str, prompt: &str) -> Result<Score, CollaboratorError> {
        let score: Score = async {
            let mut request = self
                .client
                .post(format!("{}/score", self.base_url))
                .json(&ScoreRequest { image_url, prompt });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            parse_response(request.send().await?).await
        }
        .await
        .map_err(|e: ApiError| e.into_collaborator(SERVICE))?;

        if !score.score.is_finite() {
            tracing::warn!(image_url, raw = score.score, "Scorer returned a non-finite score");
        }
        Ok(score.clamped())
    }
}
