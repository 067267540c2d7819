use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::FanoutManager;

/// Spawn a background task that pings every subscribed connection each
/// `interval`.
///
/// The task runs until aborted; `main` aborts it during shutdown.
pub fn start_heartbeat(fanout: Arc<FanoutManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let count = fanout.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            fanout.ping_all().await;
        }
    })
}
