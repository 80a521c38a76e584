//! Application state shared by all connections

use crate::config::ServerConfig;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use seqstream_pipeline::{
    BlastVerifier, ClassificationMode, ClassificationProvider, DisabledVerifier, LocalClassifier,
    LocalEngine, Orchestrator, RemoteClassifier, SessionRegistry, VerificationProvider,
    VerificationStreamer, VerifierKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    /// Runs one session per streaming connection
    pub orchestrator: Arc<Orchestrator>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,

    /// Wait after the terminal event before closing a channel
    pub close_grace: Duration,
}

impl AppState {
    /// Build providers and the orchestrator from configuration
    ///
    /// `engine` must be present when classification runs locally.
    pub fn new(
        config: &ServerConfig,
        engine: Option<Arc<LocalEngine>>,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self> {
        let pipeline = &config.pipeline;
        let registry = Arc::new(SessionRegistry::new(&config.server.upload_dir));

        let classifier: Arc<dyn ClassificationProvider> = match pipeline.classification.mode {
            ClassificationMode::Local => {
                let engine = engine.ok_or_else(|| {
                    anyhow::anyhow!("local classification requires an initialized engine")
                })?;
                Arc::new(LocalClassifier::new(engine))
            }
            ClassificationMode::Remote => Arc::new(
                RemoteClassifier::new(
                    &pipeline.classification.remote_url,
                    pipeline.classification.timeout(),
                )
                .map_err(|e| anyhow::anyhow!("Failed to build remote classifier: {}", e))?,
            ),
        };
        info!(
            mode = ?pipeline.classification.mode,
            provider = classifier.name(),
            "Classification provider ready"
        );

        let verifier: Arc<dyn VerificationProvider> = match pipeline.verification.provider {
            VerifierKind::Blast => Arc::new(
                BlastVerifier::new(&pipeline.verification)
                    .map_err(|e| anyhow::anyhow!("Failed to build BLAST verifier: {}", e))?,
            ),
            VerifierKind::Disabled => Arc::new(DisabledVerifier),
        };
        info!(provider = verifier.name(), top_n = pipeline.verification.top_n, "Verification provider ready");

        let orchestrator = Orchestrator::new(
            registry,
            classifier,
            VerificationStreamer::new(verifier).with_timeout(pipeline.verification.timeout()),
        )
        .with_retry(pipeline.retry.policy())
        .with_classify_timeout(pipeline.classification.timeout())
        .with_top_n(pipeline.verification.top_n);

        Ok(Self::from_parts(
            orchestrator,
            metrics_handle,
            config.server.close_grace(),
        ))
    }

    pub fn from_parts(
        orchestrator: Orchestrator,
        metrics_handle: PrometheusHandle,
        close_grace: Duration,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            metrics_handle,
            close_grace,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.orchestrator.registry()
    }
}

/// Periodically drop uploads whose channel was never opened
pub async fn sweep_stale_uploads(registry: Arc<SessionRegistry>, max_age: Duration) {
    let period = (max_age / 4).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let evicted = registry.evict_stale(max_age);
        if evicted > 0 {
            info!(evicted, pending = registry.len(), "removed stale uploads");
        } else {
            debug!(pending = registry.len(), "no stale uploads");
        }
    }
}
