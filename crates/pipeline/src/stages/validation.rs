//! Stage 2: score every collected item against the prompt.
//!
//! Items are scored concurrently through the shared [`ScoringPool`] but
//! their verdicts are recorded and published in collection order. A
//! single item that times out or fails is disqualified with the reason and
//! the stage moves on.
//!
//! [`ScoringPool`]: crate::scoring::ScoringPool

use std::sync::Arc;

use futures::StreamExt;
use pinrelay_core::messages::ProgressEvent;
use pinrelay_core::status::{ItemStatus, JobStatus, SessionStatus, Stage};
use pinrelay_core::types::{JobId, SessionId};
use pinrelay_db::models::item::Item;

use super::{StageContext, StageRun};
use crate::error::StageError;
use crate::scoring::ScoreOutcome;
use crate::store::Verdict;

/// Explanation recorded for an item whose scoring call timed out.
pub const TIMEOUT_EXPLANATION: &str = "evaluation timed out";

pub async fn run(
    ctx: &StageContext,
    job_id: JobId,
    session_id: SessionId,
    prompt: &str,
) -> Result<(), StageError> {
    let run = StageRun::new(ctx, job_id, session_id);
    match execute(&run, prompt).await {
        Ok(()) => Ok(()),
        Err(e) => Err(run.fail(e).await),
    }
}

async fn execute(run: &StageRun<'_>, prompt: &str) -> Result<(), StageError> {
    let ctx = run.ctx;
    run.advance(Stage::Validation).await?;

    let items = ctx.items.items_for_job(run.job_id).await?;
    if items.is_empty() {
        tracing::info!(job_id = %run.job_id, "No items to validate");
        run.log("No items to validate").await;
    } else {
        score_items(run, items, prompt).await;
    }

    run.set_status(SessionStatus::Completed).await?;
    run.set_job_status(JobStatus::Completed).await;
    tracing::info!(job_id = %run.job_id, "Validation completed");
    Ok(())
}

async fn score_items(run: &StageRun<'_>, items: Vec<Item>, prompt: &str) {
    let pool = &run.ctx.scoring;
    let prompt: Arc<str> = Arc::from(prompt);

    let mut outcomes = futures::stream::iter(items)
        .map(|item| {
            let prompt = Arc::clone(&prompt);
            async move {
                let outcome = pool.score(item.image_url.clone(), prompt).await;
                (item, outcome)
            }
        })
        .buffered(pool.concurrency());

    while let Some((item, outcome)) = outcomes.next().await {
        record(run, &item, outcome).await;
    }
}

async fn record(run: &StageRun<'_>, item: &Item, outcome: ScoreOutcome) {
    let ctx = run.ctx;
    let (raw_score, explanation) = match outcome {
        ScoreOutcome::Scored(score) => (score.score, score.explanation),
        ScoreOutcome::TimedOut => {
            tracing::warn!(job_id = %run.job_id, item_id = %item.id, "Item evaluation timed out");
            run.log(format!("Item {} evaluation timed out", item.id)).await;
            (0.0, TIMEOUT_EXPLANATION.to_string())
        }
        ScoreOutcome::Failed(e) => {
            tracing::warn!(job_id = %run.job_id, item_id = %item.id, error = %e, "Item evaluation failed");
            (0.0, format!("evaluation failed: {e}"))
        }
    };

    let event = ProgressEvent::validation(item.id, raw_score, &explanation, ctx.config.min_score);
    let ProgressEvent::Validation {
        score,
        ref label,
        valid,
        ..
    } = event
    else {
        return;
    };

    let verdict = Verdict {
        status: if valid {
            ItemStatus::Approved
        } else {
            ItemStatus::Disqualified
        },
        score,
        explanation: label.clone(),
    };

    match ctx.items.record_verdict(item.id, &verdict).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(item_id = %item.id, "Item vanished before verdict"),
        Err(e) => {
            tracing::warn!(item_id = %item.id, error = %e, "Failed to record verdict");
            run.log(format!("Failed to record verdict for item {}: {e}", item.id)).await;
        }
    }

    tracing::info!(
        job_id = %run.job_id,
        item_id = %item.id,
        status = %verdict.status,
        score,
        "Item validated",
    );
    run.log(format!(
        "Item {} {}: {score:.2}, {label}",
        item.id, verdict.status
    ))
    .await;
    run.broadcast(&event).await;
}
