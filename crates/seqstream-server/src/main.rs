//! SeqStream Server
//!
//! Accepts sequence uploads and streams clustering and verification results
//! to the client over a WebSocket while the analysis runs.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use seqstream_pipeline::{ClassificationMode, LocalEngine};
use seqstream_server::{create_router, sweep_stale_uploads, AppState, Cli, ServerConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting SeqStream server");

    let config = ServerConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Upload directory: {}", config.server.upload_dir.display());
    info!("Classification mode: {:?}", config.pipeline.classification.mode);
    info!("Verification provider: {:?}", config.pipeline.verification.provider);

    let metrics_handle = init_metrics()?;

    // The engine lives for the whole process and is shared by every session.
    let engine = match config.pipeline.classification.mode {
        ClassificationMode::Local => Some(Arc::new(LocalEngine::initialize(
            &config.pipeline.classification.local,
        ))),
        ClassificationMode::Remote => None,
    };

    let state = AppState::new(&config, engine.clone(), metrics_handle)?;
    let sweeper = config.server.upload_ttl().map(|ttl| {
        info!("Unclaimed uploads expire after {:?}", ttl);
        tokio::spawn(sweep_stale_uploads(Arc::clone(state.registry()), ttl))
    });
    let app = create_router(state, config.server.max_upload_bytes());

    let addr = config.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Some(engine) = engine {
        engine.shutdown();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("seqstream_core=debug,seqstream_pipeline=debug,seqstream_server=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("seqstream_pipeline=info,seqstream_server=info,tower_http=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "seqstream_sessions_total",
        "Total number of analysis sessions by outcome"
    );
    metrics::describe_counter!(
        "seqstream_provider_retries_total",
        "Retries of transient classification failures by provider"
    );
    metrics::describe_histogram!(
        "seqstream_stage_latency_us",
        metrics::Unit::Microseconds,
        "Time spent in each pipeline stage in microseconds"
    );
    metrics::describe_counter!(
        "seqstream_verifications_total",
        "Verification results by status"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
