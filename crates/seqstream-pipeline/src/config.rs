//! Configuration for providers, retries and verification

use crate::retry::RetryPolicy;
use crate::verifier::DEFAULT_TOP_N;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the analysis pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Backoff applied to classification calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Embedding + clustering provider
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// Reference database lookups
    #[serde(default)]
    pub verification: VerificationConfig,
}

/// Backoff settings for classification calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_factor,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// Where classification runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    /// In-process engine
    #[default]
    Local,
    /// Remote prediction service
    Remote,
}

impl std::str::FromStr for ClassificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(format!("Invalid classification mode: {}. Use 'local' or 'remote'", s)),
        }
    }
}

/// Classification provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default)]
    pub mode: ClassificationMode,

    /// Base URL of the remote prediction service
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Timeout of a single classification call
    #[serde(default = "default_classification_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub local: LocalEngineConfig,
}

impl ClassificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            mode: ClassificationMode::default(),
            remote_url: default_remote_url(),
            timeout_secs: default_classification_timeout_secs(),
            local: LocalEngineConfig::default(),
        }
    }
}

/// Parameters of the in-process engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngineConfig {
    /// k-mer length used for embeddings
    #[serde(default = "default_kmer_size")]
    pub kmer_size: usize,

    /// Cosine similarity needed to join an existing cluster
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Smaller clusters are reported as noise
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            kmer_size: default_kmer_size(),
            similarity_threshold: default_similarity_threshold(),
            min_cluster_size: default_min_cluster_size(),
        }
    }
}

/// Which verification backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// NCBI BLAST URL API
    #[default]
    Blast,
    /// Every lookup reports a provider fault
    Disabled,
}

impl std::str::FromStr for VerifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blast" => Ok(Self::Blast),
            "disabled" | "none" => Ok(Self::Disabled),
            _ => Err(format!("Invalid verifier: {}. Use 'blast' or 'disabled'", s)),
        }
    }
}

/// Reference lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Number of most abundant groups to verify
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub provider: VerifierKind,

    #[serde(default = "default_blast_url")]
    pub blast_url: String,

    #[serde(default = "default_blast_program")]
    pub program: String,

    #[serde(default = "default_blast_database")]
    pub database: String,

    /// Wait between search status checks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout of one whole lookup
    #[serde(default = "default_verification_timeout_secs")]
    pub timeout_secs: u64,
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            provider: VerifierKind::default(),
            blast_url: default_blast_url(),
            program: default_blast_program(),
            database: default_blast_database(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_verification_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_remote_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_classification_timeout_secs() -> u64 {
    300
}

fn default_kmer_size() -> usize {
    4
}

fn default_similarity_threshold() -> f32 {
    0.9
}

fn default_min_cluster_size() -> usize {
    30
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_blast_url() -> String {
    "https://blast.ncbi.nlm.nih.gov/Blast.cgi".to_string()
}

fn default_blast_program() -> String {
    "blastn".to_string()
}

fn default_blast_database() -> String {
    "nt".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_verification_timeout_secs() -> u64 {
    600
}
