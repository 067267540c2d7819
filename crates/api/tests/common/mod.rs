#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pinrelay_api::config::ServerConfig;
use pinrelay_api::router::build_app_router;
use pinrelay_api::state::AppState;
use pinrelay_api::ws::FanoutManager;
use pinrelay_core::collaborators::{
    CollaboratorError, ImageScorer, Score, ScrapeSession, ScrapedItem, Scraper, WarmupStep,
};
use pinrelay_core::retry::RetryPolicy;
use pinrelay_core::status::SessionStatus;
use pinrelay_core::types::JobId;
use pinrelay_events::{BroadcastPublisher, ChannelBroker, InMemoryBroker};
use pinrelay_pipeline::scoring::ScoringPool;
use pinrelay_pipeline::store::{PgItemStore, PgJobStore};
use pinrelay_pipeline::{Orchestrator, PgSessionTracker, PipelineConfig, SessionTracker, StageContext};
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Image URL of the item [`PanelScorer`] approves.
pub const GOOD_IMAGE: &str = "https://i.example/rattan-chair.jpg";
/// Image URL of the item [`PanelScorer`] disqualifies.
pub const POOR_IMAGE: &str = "https://i.example/office-desk.jpg";

/// Serves two fixed items. `open` waits for a gate permit so tests can
/// subscribe before the pipeline starts producing items.
pub struct GatedScraper {
    gate: Arc<Semaphore>,
}

struct FixedSession;

#[async_trait]
impl Scraper for GatedScraper {
    async fn open(&self, _prompt: &str) -> Result<Box<dyn ScrapeSession>, CollaboratorError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| CollaboratorError::Unavailable {
                service: "automation",
                message: "gate closed".into(),
            })?;
        permit.forget();
        Ok(Box::new(FixedSession))
    }
}

#[async_trait]
impl ScrapeSession for FixedSession {
    async fn warm_up(&self, _step: WarmupStep) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn collect(&self) -> Result<Vec<ScrapedItem>, CollaboratorError> {
        Ok(vec![
            ScrapedItem {
                external_id: Some("101".into()),
                title: "Rattan lounge chair".into(),
                image_url: GOOD_IMAGE.into(),
                link: Some("/pin/101/".into()),
                description: String::new(),
            },
            ScrapedItem {
                external_id: Some("102".into()),
                title: "Steel office desk".into(),
                image_url: POOR_IMAGE.into(),
                link: Some("/pin/102/".into()),
                description: String::new(),
            },
        ])
    }

    fn current_url(&self) -> Option<String> {
        None
    }

    async fn close(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Approves [`GOOD_IMAGE`], scores everything else low.
pub struct PanelScorer;

#[async_trait]
impl ImageScorer for PanelScorer {
    async fn score(&self, image_url: &str, _prompt: &str) -> Result<Score, CollaboratorError> {
        let (score, explanation) = if image_url == GOOD_IMAGE {
            (0.9, "matches the boho style")
        } else {
            (0.1, "unrelated furniture")
        };
        Ok(Score {
            score,
            explanation: explanation.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        heartbeat_interval_secs: 30,
    }
}

pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        score_timeout: Duration::from_secs(5),
        scoring_concurrency: 2,
        scorer_retry: RetryPolicy::no_retry(),
        automation_retry: RetryPolicy::no_retry(),
        ..PipelineConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub broker: InMemoryBroker,
    gate: Arc<Semaphore>,
}

impl TestApp {
    /// Let `count` pending pipelines start scraping.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn fanout(&self) -> &FanoutManager {
        &self.state.fanout
    }
}

/// Full application over `pool` with in-process collaborators. Pipelines
/// run straight through.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_app(pool, Semaphore::MAX_PERMITS)
}

/// Like [`build_test_app`], but every pipeline waits in the scraping step
/// until [`TestApp::release`] is called.
pub fn build_gated_test_app(pool: PgPool) -> TestApp {
    build_app(pool, 0)
}

fn build_app(pool: PgPool, permits: usize) -> TestApp {
    let config = test_config();
    let pipeline_config = test_pipeline_config();
    let gate = Arc::new(Semaphore::new(permits));

    let broker = InMemoryBroker::default();
    let shared: Arc<dyn ChannelBroker> = Arc::new(broker.clone());

    let ctx = StageContext {
        tracker: Arc::new(PgSessionTracker::new(pool.clone())),
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        items: Arc::new(PgItemStore::new(pool.clone())),
        publisher: BroadcastPublisher::new(Arc::clone(&shared), pipeline_config.publish_timeout),
        scraper: Arc::new(GatedScraper {
            gate: Arc::clone(&gate),
        }),
        scoring: ScoringPool::new(
            Arc::new(PanelScorer),
            pipeline_config.scoring_concurrency,
            pipeline_config.score_timeout,
            pipeline_config.scorer_retry,
        ),
        config: pipeline_config,
    };

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        fanout: Arc::new(FanoutManager::new(shared)),
        orchestrator: Arc::new(Orchestrator::new(ctx)),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        broker,
        gate,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

/// Poll the session until it reaches a terminal status.
pub async fn wait_for_terminal(app: &TestApp, job_id: JobId) -> pinrelay_core::session::Session {
    let tracker = &app.state.orchestrator.context().tracker;
    for _ in 0..200 {
        let session = tracker.get(job_id).await.unwrap();
        if matches!(session.status, SessionStatus::Completed | SessionStatus::Failed)
            && app.state.orchestrator.active_chains() == 0
        {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("pipeline for {job_id} did not finish");
}
