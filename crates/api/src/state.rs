use std::sync::Arc;

use pinrelay_pipeline::Orchestrator;

use crate::config::ServerConfig;
use crate::ws::FanoutManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything shared sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: pinrelay_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Per-job WebSocket subscribers and their relays.
    pub fanout: Arc<FanoutManager>,
    /// Creates jobs and runs their stage chains.
    pub orchestrator: Arc<Orchestrator>,
}
