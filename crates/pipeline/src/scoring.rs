//! Bounded scoring pool.
//!
//! Scoring calls run as spawned tasks gated by a semaphore, so at most
//! `concurrency` requests are in flight across every stage run sharing the
//! pool. Each call, retries included, is bounded by a timeout; a timed-out
//! call is aborted and its permit released.

use std::sync::Arc;
use std::time::Duration;

use pinrelay_core::collaborators::{CollaboratorError, ImageScorer, Score};
use pinrelay_core::retry::RetryPolicy;
use tokio::sync::Semaphore;

/// Result of scoring one item.
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    Scored(Score),
    TimedOut,
    Failed(CollaboratorError),
}

#[derive(Clone)]
pub struct ScoringPool {
    scorer: Arc<dyn ImageScorer>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ScoringPool {
    pub fn new(
        scorer: Arc<dyn ImageScorer>,
        concurrency: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            scorer,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            timeout,
            retry,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Score `image_url` against `prompt`, waiting for a free slot first.
    pub async fn score(&self, image_url: String, prompt: Arc<str>) -> ScoreOutcome {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return ScoreOutcome::Failed(CollaboratorError::Unavailable {
                    service: "scoring",
                    message: "scoring pool is closed".into(),
                })
            }
        };

        let scorer = Arc::clone(&self.scorer);
        let retry = self.retry;
        let mut task = tokio::spawn(async move {
            let _permit = permit;
            retry
                .run("score_image", || scorer.score(&image_url, &prompt))
                .await
        });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(score))) => ScoreOutcome::Scored(score),
            Ok(Ok(Err(e))) => ScoreOutcome::Failed(e),
            Ok(Err(join_error)) => ScoreOutcome::Failed(CollaboratorError::Unavailable {
                service: "scoring",
                message: format!("scoring task failed: {join_error}"),
            }),
            Err(_) => {
                task.abort();
                // Wait for the abort so the permit is back before returning.
                let _ = task.await;
                ScoreOutcome::TimedOut
            }
        }
    }
}
