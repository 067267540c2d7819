//! Client for the browser-automation service.
//!
//! The service owns the headless browser. Each [`RemoteScrapeSession`]
//! maps to one server-side session:
//!
//! - `POST /sessions` opens it for a prompt.
//! - `POST /sessions/{id}/steps/{step}` runs one warmup step.
//! - `GET /sessions/{id}/items` collects recommended items.
//! - `DELETE /sessions/{id}` releases the browser.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use pinrelay_core::collaborators::{
    CollaboratorError, ScrapeSession, ScrapedItem, Scraper, WarmupStep,
};
use serde::Deserialize;

use crate::api::{check_status, parse_response, ApiError};

const SERVICE: &str = "automation";

/// Opens sessions on the automation service.
#[derive(Clone)]
pub struct RemoteScraper {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    session_id: String,
    #[serde(default)]
    current_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    #[serde(default)]
    current_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    items: Vec<ScrapedItem>,
    #[serde(default)]
    current_url: Option<String>,
}

impl RemoteScraper {
    /// * `base_url` - e.g. `http://automation:4000`, without trailing slash.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Scraper for RemoteScraper {
    async fn open(&self, prompt: &str) -> Result<Box<dyn ScrapeSession>, CollaboratorError> {
        let opened: OpenResponse = async {
            let response = self
                .client
                .post(format!("{}/sessions", self.base_url))
                .json(&serde_json::json!({ "prompt": prompt }))
                .send()
                .await?;
            parse_response(response).await
        }
        .await
        .map_err(|e: ApiError| e.into_collaborator(SERVICE))?;

        tracing::debug!(session_id = %opened.session_id, "Automation session opened");

        Ok(Box::new(RemoteScrapeSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id: opened.session_id,
            current_url: Mutex::new(opened.current_url),
        }))
    }
}

/// One open session on the automation service.
pub struct RemoteScrapeSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    current_url: Mutex<Option<String>>,
}

impl RemoteScrapeSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_url(&self) -> String {
        format!("{}/sessions/{}", self.base_url, self.session_id)
    }

    fn remember_url(&self, url: Option<String>) {
        if url.is_some() {
            *self.current_url.lock().unwrap_or_else(PoisonError::into_inner) = url;
        }
    }
}

#[async_trait]
impl ScrapeSession for RemoteScrapeSession {
    async fn warm_up(&self, step: WarmupStep) -> Result<(), CollaboratorError> {
        let step_response: StepResponse = async {
            let response = self
                .client
                .post(format!("{}/steps/{}", self.session_url(), step.as_str()))
                .send()
                .await?;
            parse_response(response).await
        }
        .await
        .map_err(|e: ApiError| e.into_collaborator(SERVICE))?;

        self.remember_url(step_response.current_url);
        Ok(())
    }

    async fn collect(&self) -> Result<Vec<ScrapedItem>, CollaboratorError> {
        let items: ItemsResponse = async {
            let response = self
                .client
                .get(format!("{}/items", self.session_url()))
                .send()
                .await?;
            parse_response(response).await
        }
        .await
        .map_err(|e: ApiError| e.into_collaborator(SERVICE))?;

        self.remember_url(items.current_url);
        Ok(items.items)
    }

    fn current_url(&self) -> Option<String> {
        self.current_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn close(&self) -> Result<(), CollaboratorError> {
        let result = async {
            let response = self.client.delete(self.session_url()).send().await?;
            check_status(response).await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            // Already gone on the service side.
            Err(ApiError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e.into_collaborator(SERVICE)),
        }
    }
}
