//! Server configuration

use crate::cli::Cli;
use seqstream_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration: HTTP surface plus the analysis pipeline
///
/// ```yaml
/// server:
///   port: 8000
///   upload_dir: ./temp_uploads
/// classification:
///   mode: remote
///   remote_url: http://predictor:8080
/// verification:
///   top_n: 5
///   provider: blast
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(cli);
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(dir) = &cli.upload_dir {
            self.server.upload_dir = dir.clone();
        }
        if let Some(mode) = cli.mode {
            self.pipeline.classification.mode = mode;
        }
        if let Some(url) = &cli.remote_url {
            self.pipeline.classification.remote_url = url.clone();
        }
        if let Some(verifier) = cli.verifier {
            self.pipeline.verification.provider = verifier;
        }
        if let Some(top_n) = cli.top_n {
            self.pipeline.verification.top_n = top_n;
        }
    }
}

/// HTTP listener and upload handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Largest accepted upload body
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Wait after the terminal event before the channel is closed
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,

    /// Uploads not claimed within this many seconds are deleted; 0 keeps them
    #[serde(default = "default_upload_ttl_secs")]
    pub upload_ttl_secs: u64,
}

impl HttpConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.listen, self.port).parse()?)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn upload_ttl(&self) -> Option<Duration> {
        (self.upload_ttl_secs > 0).then(|| Duration::from_secs(self.upload_ttl_secs))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            max_upload_mb: default_max_upload_mb(),
            close_grace_ms: default_close_grace_ms(),
            upload_ttl_secs: default_upload_ttl_secs(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("temp_uploads")
}

fn default_max_upload_mb() -> usize {
    512
}

fn default_close_grace_ms() -> u64 {
    1000
}

fn default_upload_ttl_secs() -> u64 {
    3600
}
