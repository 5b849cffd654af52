//! Stacks Builder API server binary.
//!
//! Configuration comes from the environment (optionally a `.env` file) with
//! command-line overrides. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stacks_api::config::ApiConfig;
use stacks_core::codegen::ProviderRegistry;
use stacks_core::codegen::config::CodegenSettings;
use stacks_core::retrieval::{RetrievalService, SubprocessRetriever};
use stacks_core::telemetry::{self, QueryLogPipeline, SqliteQueryLogSink};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "stacks_server", about = "Stacks Builder API server")]
struct Args {
    /// Address to listen on; overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// SQLite connection URL; overrides `DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Seconds to wait for queued query logs to be written after shutdown.
    #[arg(long, default_value_t = 30)]
    shutdown_grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stacks_api=debug,stacks_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    info!(
        database_url = %config.database_url,
        max_connections = args.max_connections,
        "starting stacks_server"
    );
    let pool = stacks_core::db::connect(&config.database_url, args.max_connections).await?;

    info!("running database migrations");
    stacks_api::migrate(&pool).await?;

    let retriever = SubprocessRetriever::new(
        config.python_executable.clone(),
        config.python_script_path.clone(),
    )
    .with_timeout(config.rag_timeout);
    let retrieval = RetrievalService::new(Arc::new(retriever));

    let settings = CodegenSettings::from_env();
    info!(provider = %settings.provider, "codegen provider selected");
    let providers = Arc::new(ProviderRegistry::from_settings(settings));

    let (pipeline, worker) = QueryLogPipeline::start(
        Arc::new(SqliteQueryLogSink::new(pool.clone())),
        config.query_log_capacity,
    );

    let shutdown = CancellationToken::new();
    let retention = config.query_log_retention().map(|window| {
        info!(days = window.num_days(), "query log retention enabled");
        telemetry::spawn_retention_task(
            pool.clone(),
            window,
            telemetry::RETENTION_INTERVAL,
            shutdown.clone(),
        )
    });

    let state = stacks_api::AppState::new(
        pool.clone(),
        config.clone(),
        retrieval,
        providers,
        pipeline,
        shutdown.clone(),
    );
    let app = stacks_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            signal.cancel();
        })
        .await?;

    // The router (and with it every pipeline handle) is gone; let the worker drain.
    let grace = Duration::from_secs(args.shutdown_grace_secs);
    if tokio::time::timeout(grace, worker).await.is_err() {
        warn!("query log worker did not drain before the grace period ended");
    }
    if let Some(handle) = retention {
        let _ = handle.await;
    }
    pool.close().await;
    info!("stacks_server stopped");

    Ok(())
}
