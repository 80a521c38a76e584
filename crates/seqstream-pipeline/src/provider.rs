//! Capability traits for the external collaborators of the pipeline

use async_trait::async_trait;
use seqstream_core::{ClusterAssignment, ProviderError, SequenceSet, SessionId};
use std::any::Any;

/// Embedding + clustering (or any combined classification) of a sequence set
///
/// Implementations may fail transiently (network, timeout, server-side
/// unavailability) or with a non-transient rejection; callers wrap them in a
/// [`RetryPolicy`](crate::retry::RetryPolicy).
#[async_trait]
pub trait ClassificationProvider: Send + Sync {
    /// Assign exactly one label to every sequence, `-1` for noise
    async fn classify(&self, sequences: &SequenceSet) -> Result<ClusterAssignment, ProviderError>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Release anything held on behalf of a finished session
    async fn release(&self, _session: SessionId) {}
}

/// Best match of a sequence in a reference database
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationHit {
    /// Percent identity of the best alignment
    pub identity: f64,
    /// Description of the matched reference
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Match(VerificationHit),
    NoMatch,
}

/// Single best-effort lookup of a representative sequence
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    async fn verify(&self, sequence: &str) -> Result<VerificationOutcome, ProviderError>;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Readable text of a panic raised inside a provider call
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}
