use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod core_worker;
mod dispatcher;
mod error;
mod models;
mod queue;
mod result_processor;
mod risk;
mod scan_service;
mod scanner;
mod store;
mod validation;

use config::Config;
use core_worker::CoreWorker;
use dispatcher::Dispatcher;
use models::ScannerType;
use queue::JobQueue;
use result_processor::ResultProcessor;
use scan_service::ScanService;
use scanner::port_deep::PortDeepBackend;
use scanner::port_fast::PortFastBackend;
use scanner::vuln::VulnBackend;
use scanner::worker::ScannerWorker;
use store::PostgresStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "easm_orchestrator=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config from environment, using defaults");
        Config::default()
    });

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations completed");

    let store = Arc::new(PostgresStore::new(pool));
    let scan_service = Arc::new(ScanService::new(store, config.risk_score_ttl_days));
    let job_queue = JobQueue::new();

    spawn_workers(&job_queue, &scan_service, &config);

    let app_state = api::AppState::new(scan_service, job_queue);

    let frontend_url = std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let origins: Vec<header::HeaderValue> = frontend_url
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .route("/health", get(api::health::health_check))
        .nest("/api/v1", api::routes::v1_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Spawn the core worker (Dispatcher + Result Processor) and one worker per
/// scanner type, per §5's "independent worker pools" model.
fn spawn_workers(job_queue: &JobQueue, scan_service: &Arc<ScanService>, config: &Config) {
    let dispatcher = Dispatcher::new(job_queue.clone());
    let result_processor = ResultProcessor::new(scan_service.clone());
    let core_worker = Arc::new(CoreWorker::new(job_queue.clone(), dispatcher, result_processor));
    tokio::spawn(core_worker.run());

    let backends: [(ScannerType, Arc<dyn scanner::ScannerBackend>, Duration); 3] = [
        (
            ScannerType::PortFast,
            Arc::new(PortFastBackend),
            Duration::from_secs(config.scan_timeout_port_fast_secs),
        ),
        (
            ScannerType::PortDeep,
            Arc::new(PortDeepBackend),
            Duration::from_secs(config.scan_timeout_port_deep_secs),
        ),
        (ScannerType::Vuln, Arc::new(VulnBackend), Duration::from_secs(config.scan_timeout_vuln_secs)),
    ];
    debug_assert_eq!(backends.len(), ScannerType::ALL.len());

    for (scanner_type, backend, default_timeout) in backends {
        let worker = Arc::new(ScannerWorker::new(
            scanner_type,
            backend,
            job_queue.clone(),
            scan_service.clone(),
            default_timeout,
        ));
        tokio::spawn(worker.run());
    }

    tracing::info!(
        port_fast_timeout = config.scan_timeout_port_fast_secs,
        port_deep_timeout = config.scan_timeout_port_deep_secs,
        vuln_timeout = config.scan_timeout_vuln_secs,
        "scanner workers started"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }
}
