use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pinrelay_api::config::ServerConfig;
use pinrelay_api::router::build_app_router;
use pinrelay_api::state::AppState;
use pinrelay_api::ws;
use pinrelay_automation::{AutomationConfig, HttpImageScorer, RemoteScraper};
use pinrelay_events::{BroadcastPublisher, BrokerConfig, ChannelBroker, InMemoryBroker};
use pinrelay_pipeline::scoring::ScoringPool;
use pinrelay_pipeline::store::{PgItemStore, PgJobStore};
use pinrelay_pipeline::{Orchestrator, PgSessionTracker, PipelineConfig, StageContext};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pinrelay_api=debug,pinrelay_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let pipeline_config = PipelineConfig::from_env();
    let automation_config = AutomationConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = pinrelay_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    pinrelay_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    pinrelay_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Event bus ---
    let broker = InMemoryBroker::new(&BrokerConfig::from_env());
    let shared_broker: Arc<dyn ChannelBroker> = Arc::new(broker.clone());

    // --- Pipeline ---
    let http = automation_config
        .http_client()
        .expect("Failed to build HTTP client");
    let scraper = RemoteScraper::new(http.clone(), automation_config.automation_url.clone());
    let scorer = HttpImageScorer::new(
        http,
        automation_config.scoring_url.clone(),
        automation_config.scoring_api_key.clone(),
    );

    let ctx = StageContext {
        tracker: Arc::new(PgSessionTracker::new(pool.clone())),
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        items: Arc::new(PgItemStore::new(pool.clone())),
        publisher: BroadcastPublisher::new(
            Arc::clone(&shared_broker),
            pipeline_config.publish_timeout,
        ),
        scraper: Arc::new(scraper),
        scoring: ScoringPool::new(
            Arc::new(scorer),
            pipeline_config.scoring_concurrency,
            pipeline_config.score_timeout,
            pipeline_config.scorer_retry,
        ),
        config: pipeline_config,
    };
    let orchestrator = Arc::new(Orchestrator::new(ctx));
    tracing::info!(
        automation_url = %automation_config.automation_url,
        scoring_url = %automation_config.scoring_url,
        "Pipeline ready",
    );

    // --- WebSocket fan-out ---
    let fanout = Arc::new(ws::FanoutManager::new(shared_broker));
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&fanout), config.heartbeat_interval());

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        fanout: Arc::clone(&fanout),
        orchestrator: Arc::clone(&orchestrator),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    heartbeat_handle.abort();

    let ws_count = fanout.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    fanout.shutdown_all().await;

    orchestrator.shutdown(config.shutdown_timeout()).await;
    broker.shutdown();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
