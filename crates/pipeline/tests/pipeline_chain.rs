//! End-to-end runs of the stage chain against in-process collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pinrelay_core::channels::job_channel;
use pinrelay_core::collaborators::{
    CollaboratorError, ImageScorer, Score, ScrapeSession, ScrapedItem, Scraper, WarmupStep,
};
use pinrelay_core::messages::ProgressEvent;
use pinrelay_core::retry::RetryPolicy;
use pinrelay_core::status::{ItemStatus, JobStatus, SessionStatus, Stage};
use pinrelay_events::{BroadcastPublisher, BrokerError, ChannelBroker, InMemoryBroker, Subscription};
use pinrelay_pipeline::memory::MemoryStore;
use pinrelay_pipeline::scoring::ScoringPool;
use pinrelay_pipeline::stages::warmup_scraping;
use pinrelay_pipeline::store::{ItemStore, JobStore};
use pinrelay_pipeline::{
    CreatedJob, Orchestrator, PipelineConfig, SessionTracker, StageContext, StageError,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeScraper {
    items: Vec<ScrapedItem>,
    fail_step: Option<WarmupStep>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

struct FakeSession {
    items: Vec<ScrapedItem>,
    fail_step: Option<WarmupStep>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn open(&self, _prompt: &str) -> Result<Box<dyn ScrapeSession>, CollaboratorError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            items: self.items.clone(),
            fail_step: self.fail_step,
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl ScrapeSession for FakeSession {
    async fn warm_up(&self, step: WarmupStep) -> Result<(), CollaboratorError> {
        if Some(step) == self.fail_step {
            return Err(CollaboratorError::Rejected {
                service: "automation",
                status: 500,
                message: format!("{} failed", step.as_str()),
            });
        }
        Ok(())
    }

    async fn collect(&self) -> Result<Vec<ScrapedItem>, CollaboratorError> {
        Ok(self.items.clone())
    }

    fn current_url(&self) -> Option<String> {
        Some("https://www.pinterest.com/today/".into())
    }

    async fn close(&self) -> Result<(), CollaboratorError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scores by image URL; URLs not in the table hang forever.
struct TableScorer {
    scores: HashMap<String, f64>,
}

#[async_trait]
impl ImageScorer for TableScorer {
    async fn score(&self, image_url: &str, _prompt: &str) -> Result<Score, CollaboratorError> {
        match self.scores.get(image_url) {
            Some(&score) => Ok(Score {
                score,
                explanation: format!("scored {image_url}"),
            }),
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Score {
                    score: 1.0,
                    explanation: "too late".into(),
                })
            }
        }
    }
}

struct BrokenBroker;

#[async_trait]
impl ChannelBroker for BrokenBroker {
    async fn publish(&self, _: &str, _: String) -> Result<usize, BrokerError> {
        Err(BrokerError::Transport("connection reset".into()))
    }
    async fn subscribe(&self, _: &str) -> Result<Subscription, BrokerError> {
        Err(BrokerError::Transport("connection reset".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn scraped(n: u32) -> ScrapedItem {
    ScrapedItem {
        external_id: Some(n.to_string()),
        title: format!("Item {n}"),
        image_url: format!("https://i.example/{n}.jpg"),
        link: Some(format!("/pin/{n}/")),
        description: String::new(),
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        score_timeout: Duration::from_secs(2),
        scoring_concurrency: 2,
        scorer_retry: RetryPolicy::no_retry(),
        automation_retry: RetryPolicy::no_retry(),
        ..PipelineConfig::default()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    broker: Arc<InMemoryBroker>,
    scraper: Arc<FakeScraper>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(scraper: FakeScraper, scores: &[(u32, f64)]) -> Self {
        Self::with_broker(scraper, scores, None)
    }

    fn with_broker(
        scraper: FakeScraper,
        scores: &[(u32, f64)],
        broker_override: Option<Arc<dyn ChannelBroker>>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(InMemoryBroker::default());
        let scraper = Arc::new(scraper);
        let config = test_config();
        let scorer = Arc::new(TableScorer {
            scores: scores
                .iter()
                .map(|(n, s)| (format!("https://i.example/{n}.jpg"), *s))
                .collect(),
        });

        let publish_via: Arc<dyn ChannelBroker> =
            broker_override.unwrap_or_else(|| broker.clone() as Arc<dyn ChannelBroker>);
        let ctx = StageContext {
            tracker: store.clone(),
            jobs: store.clone(),
            items: store.clone(),
            publisher: BroadcastPublisher::new(publish_via, config.publish_timeout),
            scraper: scraper.clone(),
            scoring: ScoringPool::new(
                scorer,
                config.scoring_concurrency,
                config.score_timeout,
                config.scorer_retry,
            ),
            config,
        };

        Self {
            store,
            broker,
            scraper,
            orchestrator: Orchestrator::new(ctx),
        }
    }

    async fn create(&self, text: &str) -> CreatedJob {
        self.orchestrator.create_job(text).await.unwrap()
    }

    async fn run(&self, job: CreatedJob, text: &str) -> Result<(), StageError> {
        self.orchestrator
            .submit(job.job_id, job.session_id, text.to_string())
            .await
            .unwrap()
    }
}

async fn drain(sub: &mut Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(Ok(raw)) = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await {
        events.push(ProgressEvent::from_json(&raw).unwrap());
    }
    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chain_runs_both_stages_and_publishes_in_order() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1), scraped(2)],
            ..Default::default()
        },
        &[(1, 0.9), (2, 0.2)],
    );
    let job = h.create("boho bedroom").await;
    let mut sub = h.broker.subscribe(&job_channel(job.job_id)).await.unwrap();

    h.run(job, "boho bedroom").await.unwrap();

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.stage, Stage::Validation);
    assert_eq!(session.status, SessionStatus::Completed);
    let stored_job = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored_job.status(), JobStatus::Completed);

    let items = h.store.items_for_job(job.job_id).await.unwrap();
    assert_eq!(items[0].status(), ItemStatus::Approved);
    assert_eq!(items[0].item_url, "https://www.pinterest.com/pin/1/");
    assert_eq!(items[1].status(), ItemStatus::Disqualified);
    assert_eq!(items[1].match_score, Some(0.2));

    let events = drain(&mut sub).await;
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::warmup("Warmup started for boho bedroom!"))
    );
    let types: Vec<&str> = events.iter().map(|e| e.type_name()).collect();
    let warmups = types.iter().filter(|t| **t == "warmup").count();
    // Start, one per warmup step, and the final "warmed up" line.
    assert_eq!(warmups, WarmupStep::ALL.len() + 2);
    assert_eq!(
        &types[warmups..],
        ["scraped_item", "scraped_item", "validation", "validation"]
    );
    assert_matches!(
        &events[events.len() - 2],
        ProgressEvent::Validation { item_id, valid: true, .. } if *item_id == items[0].id
    );

    assert!(session.log.contains(&format!("Saved item: {}", items[0].id)));
    assert!(session
        .log
        .iter()
        .any(|l| l.starts_with(&format!("Item {} disqualified: 0.20", items[1].id))));
    assert_eq!(h.scraper.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_warmup_step_fails_job_and_skips_validation() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1)],
            fail_step: Some(WarmupStep::SignIn),
            ..Default::default()
        },
        &[(1, 0.9)],
    );
    let job = h.create("x").await;
    let mut sub = h.broker.subscribe(&job_channel(job.job_id)).await.unwrap();

    let result = h.run(job, "x").await;
    assert_matches!(result, Err(StageError::Collaborator(_)));

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.stage, Stage::Warmup);
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.log.iter().any(|l| l.starts_with("Stage failed:")));
    let stored_job = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored_job.status(), JobStatus::Error);

    assert!(h.store.items_for_job(job.job_id).await.unwrap().is_empty());
    assert!(drain(&mut sub)
        .await
        .iter()
        .all(|e| e.type_name() == "warmup"));
    // The browser session is released even though the stage failed.
    assert_eq!(h.scraper.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_item_is_disqualified_and_the_rest_still_scored() {
    // Item 2 has no score in the table, so its scorer call hangs.
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1), scraped(2), scraped(3)],
            ..Default::default()
        },
        &[(1, 0.8), (3, 0.7)],
    );
    let job = h.create("x").await;

    h.run(job, "x").await.unwrap();

    let items = h.store.items_for_job(job.job_id).await.unwrap();
    assert_eq!(items[0].status(), ItemStatus::Approved);
    assert_eq!(items[1].status(), ItemStatus::Disqualified);
    assert_eq!(items[1].match_score, Some(0.0));
    assert_eq!(items[1].explanation, "evaluation timed out");
    assert_eq!(items[2].status(), ItemStatus::Approved);

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session
        .log
        .contains(&format!("Item {} evaluation timed out", items[1].id)));
    let stored_job = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored_job.status(), JobStatus::Completed);
}

#[tokio::test]
async fn job_without_items_completes() {
    let h = Harness::new(FakeScraper::default(), &[]);
    let job = h.create("x").await;

    h.run(job, "x").await.unwrap();

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.stage, Stage::Validation);
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.log.contains(&"No items to validate".to_string()));
}

#[tokio::test]
async fn broadcast_failure_never_fails_the_job() {
    let h = Harness::with_broker(
        FakeScraper {
            items: vec![scraped(1)],
            ..Default::default()
        },
        &[(1, 0.9)],
        Some(Arc::new(BrokenBroker)),
    );
    let job = h.create("x").await;

    h.run(job, "x").await.unwrap();

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.log.iter().any(|l| l.starts_with("Broadcast error:")));
}

#[tokio::test]
async fn unavailable_session_log_does_not_stop_the_chain() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1)],
            ..Default::default()
        },
        &[(1, 0.9)],
    );
    let job = h.create("x").await;
    h.store.set_log_unavailable(true);

    h.run(job, "x").await.unwrap();

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.log.is_empty());
}

#[tokio::test]
async fn storage_error_on_stage_transition_does_not_fail_the_job() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1)],
            ..Default::default()
        },
        &[(1, 0.9)],
    );
    let job = h.create("x").await;
    h.store.fail_next_advance(Stage::Scraping);

    h.run(job, "x").await.unwrap();

    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.stage, Stage::Validation);
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session
        .log
        .iter()
        .any(|l| l.starts_with("Failed to record session transition:")));
    assert!(!session.log.iter().any(|l| l.starts_with("Stage failed:")));

    let stored_job = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored_job.status(), JobStatus::Completed);
    let items = h.store.items_for_job(job.job_id).await.unwrap();
    assert_eq!(items[0].status(), ItemStatus::Approved);
}

#[tokio::test]
async fn failed_session_is_not_restarted() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1)],
            ..Default::default()
        },
        &[(1, 0.9)],
    );
    let job = h.create("x").await;
    h.store
        .set_status(job.job_id, SessionStatus::Failed)
        .await
        .unwrap();

    let result = h.run(job, "x").await;
    assert_matches!(result, Err(StageError::Aborted(_)));
    assert_eq!(h.scraper.opened.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.store.get(job.job_id).await.unwrap().status,
        SessionStatus::Failed
    );
}

#[tokio::test]
async fn retried_scraping_stage_does_not_duplicate_items() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1), scraped(2)],
            ..Default::default()
        },
        &[],
    );
    let job = h.create("x").await;
    let ctx = h.orchestrator.context();

    warmup_scraping::run(ctx, job.job_id, job.session_id, "x")
        .await
        .unwrap();
    warmup_scraping::run(ctx, job.job_id, job.session_id, "x")
        .await
        .unwrap();

    assert_eq!(h.store.items_for_job(job.job_id).await.unwrap().len(), 2);
    let session = h.store.get(job.job_id).await.unwrap();
    assert_eq!(session.stage, Stage::Scraping);
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn events_before_subscription_are_not_replayed() {
    let h = Harness::new(
        FakeScraper {
            items: vec![scraped(1)],
            ..Default::default()
        },
        &[(1, 0.9)],
    );
    let job = h.create("x").await;
    h.run(job, "x").await.unwrap();

    let mut late = h.broker.subscribe(&job_channel(job.job_id)).await.unwrap();
    assert!(drain(&mut late).await.is_empty());
}

#[tokio::test]
async fn shutdown_waits_for_running_chains() {
    let h = Harness::new(FakeScraper::default(), &[]);
    let job = h.create("x").await;
    let handle = h
        .orchestrator
        .submit(job.job_id, job.session_id, "x".to_string());

    h.orchestrator.shutdown(Duration::from_secs(5)).await;
    assert_eq!(h.orchestrator.active_chains(), 0);
    assert!(handle.await.unwrap().is_ok());
}

