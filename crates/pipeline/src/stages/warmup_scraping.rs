//! Stage 1: warm up the automation account, then collect items.

use pinrelay_core::collaborators::{ScrapeSession, WarmupStep};
use pinrelay_core::messages::ProgressEvent;
use pinrelay_core::status::{SessionStatus, Stage};
use pinrelay_core::types::{JobId, SessionId};
use pinrelay_db::models::item::NewItem;

use super::{StageContext, StageRun};
use crate::error::StageError;
use crate::links::resolve_item_url;

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
    run.advance(Stage::Warmup).await?;
    run.announce(&format!("Warmup started for {prompt}!")).await;

    let session = ctx
        .config
        .automation_retry
        .run("open_session", || ctx.scraper.open(prompt))
        .await?;

    let result = drive(run, session.as_ref()).await;

    // The browser session is released on every path.
    if let Err(e) = session.close().await {
        tracing::warn!(job_id = %run.job_id, error = %e, "Failed to close automation session");
        run.log(format!("Failed to close automation session: {e}")).await;
    }
    result
}

async fn drive(run: &StageRun<'_>, session: &dyn ScrapeSession) -> Result<(), StageError> {
    let ctx = run.ctx;
    let retry = ctx.config.automation_retry;

    for step in WarmupStep::ALL {
        run.announce(step.describe()).await;
        retry.run(step.as_str(), || session.warm_up(step)).await?;
    }
    run.announce("Account warmed up").await;

    run.advance(Stage::Scraping).await?;
    let scraped = retry.run("collect_items", || session.collect()).await?;
    let current_url = session.current_url();
    tracing::info!(job_id = %run.job_id, count = scraped.len(), "Items collected");

    for item in scraped {
        if item.image_url.trim().is_empty() {
            run.log(format!("Skipped item without image: {}", item.title)).await;
            continue;
        }
        let new_item = NewItem {
            item_url: resolve_item_url(
                item.link.as_deref(),
                &ctx.config.item_base_url,
                current_url.as_deref(),
            ),
            external_id: item.external_id,
            title: item.title,
            image_url: item.image_url,
            description: item.description,
        };

        let stored = match ctx.items.save_item(run.job_id, &new_item).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    job_id = %run.job_id,
                    image_url = %new_item.image_url,
                    error = %e,
                    "Failed to save item",
                );
                run.log(format!("Failed to save item {}: {e}", new_item.image_url)).await;
                continue;
            }
        };

        tracing::debug!(job_id = %run.job_id, item_id = %stored.id, "Saved item");
        run.log(format!("Saved item: {}", stored.id)).await;
        run.broadcast(&ProgressEvent::ScrapedItem {
            item_id: stored.id,
            title: stored.title,
            image_url: stored.image_url,
            item_url: stored.item_url,
        })
        .await;
    }

    run.set_status(SessionStatus::Completed).await
}
