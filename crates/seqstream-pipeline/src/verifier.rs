//! Incremental verification of the most abundant groups
//!
//! Groups are verified one at a time in the same order as `top_groups`. The
//! stream is lazy: the provider call for group `i + 1` is not started until the
//! consumer has taken result `i`.

use crate::provider::{panic_message, VerificationOutcome, VerificationProvider};
use crate::stats::rank_groups;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use seqstream_core::{
    ClusterAssignment, ProviderError, SequenceSet, VerificationResult, VerificationStatus,
};
use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default number of groups verified per session
pub const DEFAULT_TOP_N: usize = 5;

/// Identity at or above which a match is considered the same organism
pub const KNOWN_IDENTITY: f64 = 99.0;

/// Identity at or above which a match is considered a close relative
pub const RELATED_IDENTITY: f64 = 97.0;

const UNCULTURED_MARKER: &str = "uncultured";

/// A group selected for verification and its representative sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTarget {
    pub group_id: i64,
    /// Index of the representative in the sequence set
    pub index: usize,
    pub sequence: String,
}

/// Pick up to `top_n` groups, most abundant first, each with its longest member
///
/// Among equally long members the one with the lowest index wins.
pub fn select_targets(
    sequences: &SequenceSet,
    assignment: &ClusterAssignment,
    top_n: usize,
) -> Vec<VerificationTarget> {
    rank_groups(assignment)
        .into_iter()
        .take(top_n)
        .filter_map(|(group_id, _)| {
            let index = assignment
                .members(group_id)
                .filter(|i| *i < sequences.len())
                .min_by_key(|i| (Reverse(sequences.get(*i).map_or(0, str::len)), *i))?;
            Some(VerificationTarget {
                group_id,
                index,
                sequence: sequences.get(index)?.to_string(),
            })
        })
        .collect()
}

/// Map a provider answer to a status, match percentage and description
pub fn classify_outcome(outcome: &VerificationOutcome) -> (VerificationStatus, f64, String) {
    match outcome {
        VerificationOutcome::NoMatch => (
            VerificationStatus::Alien,
            0.0,
            "No match found".to_string(),
        ),
        VerificationOutcome::Match(hit) => {
            let status = if hit.identity >= KNOWN_IDENTITY {
                VerificationStatus::Known
            } else if hit.identity >= RELATED_IDENTITY {
                VerificationStatus::Related
            } else if hit.description.to_lowercase().contains(UNCULTURED_MARKER) {
                VerificationStatus::Ghost
            } else {
                VerificationStatus::Novel
            };
            let identity = (hit.identity * 10.0).round() / 10.0;
            (status, identity, hit.description.clone())
        }
    }
}

/// Produces one [`VerificationResult`] per selected group
#[derive(Clone)]
pub struct VerificationStreamer {
    provider: Arc<dyn VerificationProvider>,
    timeout: Option<Duration>,
}

impl VerificationStreamer {
    pub fn new(provider: Arc<dyn VerificationProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Bound each provider call; an expired call yields an `ERROR` result
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Forward-only stream of `min(top_n, total_clusters)` results
    pub fn stream(
        &self,
        sequences: &SequenceSet,
        assignment: &ClusterAssignment,
        top_n: usize,
    ) -> BoxStream<'static, VerificationResult> {
        let targets = select_targets(sequences, assignment, top_n);
        let total = targets.len();
        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;

        stream::unfold(targets.into_iter().enumerate(), move |mut pending| {
            let provider = Arc::clone(&provider);
            async move {
                let (i, target) = pending.next()?;
                let result = verify_target(provider.as_ref(), timeout, &target, i + 1, total).await;
                Some((result, pending))
            }
        })
        .boxed()
    }
}

async fn verify_target(
    provider: &dyn VerificationProvider,
    timeout: Option<Duration>,
    target: &VerificationTarget,
    position: usize,
    total: usize,
) -> VerificationResult {
    debug!(
        group_id = target.group_id,
        representative = target.index,
        length = target.sequence.len(),
        provider = provider.name(),
        "verifying group"
    );

    // A panicking provider only costs this group its result
    let call = AssertUnwindSafe(provider.verify(&target.sequence)).catch_unwind();
    let answer = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Ok(Err(ProviderError::Timeout(limit)))),
        None => call.await,
    };

    let resolved = match answer {
        Ok(Ok(outcome)) => Ok(classify_outcome(&outcome)),
        Ok(Err(e)) => {
            warn!(group_id = target.group_id, error = %e, "verification failed");
            Err(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(group_id = target.group_id, panic = %message, "verification provider panicked");
            Err(message)
        }
    };
    let (status, match_percentage, description) = resolved.unwrap_or_else(|cause| {
        (
            VerificationStatus::Error,
            0.0,
            format!("Verification failed: {}", cause),
        )
    });

    metrics::counter!("seqstream_verifications_total", "status" => status.as_str()).increment(1);

    VerificationResult {
        step: format!("Verification {}/{}", position, total),
        group_id: target.group_id,
        status,
        match_percentage,
        description,
    }
}
