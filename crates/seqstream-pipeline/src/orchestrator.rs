//! End-to-end driver of one analysis session
//!
//! Stages run strictly in sequence:
//!
//! ```text
//! Validating -> Reading -> Classifying -> Aggregating -> Verifying -> Completed
//!      \____________\____________\_____________\_____________\-----> Failed
//! ```
//!
//! Every failure produces exactly one `error` event. A client that goes away
//! cancels the session silently. Whatever happens, the stored input is
//! deleted, the classifier is told the session is over and the sink is closed.

use crate::provider::{panic_message, ClassificationProvider};
use crate::reader::{BioSequenceReader, SequenceReader};
use crate::retry::{RetryError, RetryNotice, RetryObserver, RetryPolicy};
use crate::session::{InputLease, PipelineState, Session, SessionRegistry};
use crate::stats::aggregate;
use crate::transport::{Disconnected, EventSink};
use crate::verifier::{VerificationStreamer, DEFAULT_TOP_N};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use seqstream_core::{
    ClusterAssignment, Error, InputFormat, PipelineEvent, ProviderError, SequenceSet, SessionId,
};
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Terminal message of a successful session
pub const COMPLETE_MESSAGE: &str = "Analysis Finished.";

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    /// Carries the message sent in the `error` event
    Failed(String),
    /// The client disconnected; nothing was reported
    Cancelled,
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Why the stage sequence stopped early
#[derive(Debug)]
enum StageError {
    Cancelled,
    Failed(Error),
}

impl From<Error> for StageError {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

impl From<Disconnected> for StageError {
    fn from(_: Disconnected) -> Self {
        Self::Cancelled
    }
}

type StageResult<T> = std::result::Result<T, StageError>;

/// Runs sessions against a fixed set of collaborators
///
/// One orchestrator is shared by all sessions; each call to [`run`](Self::run)
/// owns its session exclusively.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    reader: Arc<dyn SequenceReader>,
    classifier: Arc<dyn ClassificationProvider>,
    verifier: VerificationStreamer,
    retry: RetryPolicy,
    classify_timeout: Option<Duration>,
    top_n: usize,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        classifier: Arc<dyn ClassificationProvider>,
        verifier: VerificationStreamer,
    ) -> Self {
        Self {
            registry,
            reader: Arc::new(BioSequenceReader),
            classifier,
            verifier,
            retry: RetryPolicy::default(),
            classify_timeout: None,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn SequenceReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound every classification attempt; expiry counts as a transient failure
    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = Some(timeout);
        self
    }

    /// Number of groups verified per session
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Drive session `id` to a terminal state, streaming events into `sink`
    pub async fn run<S>(&self, id: SessionId, sink: &mut S) -> PipelineOutcome
    where
        S: EventSink + ?Sized,
    {
        info!(session = %id, classifier = self.classifier.name(), "session started");
        let mut session = Session::new(id);
        let mut lease: Option<InputLease> = None;

        let result = AssertUnwindSafe(self.run_stages(&mut session, &mut lease, sink))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(())) => {
                enter(&mut session, PipelineState::Completed);
                PipelineOutcome::Completed
            }
            Ok(Err(StageError::Cancelled)) => {
                info!(session = %id, stage = %session.state, "client disconnected, cancelling");
                enter(&mut session, PipelineState::Failed);
                PipelineOutcome::Cancelled
            }
            Ok(Err(StageError::Failed(err))) => {
                warn!(session = %id, stage = %session.state, error = %err, "session failed");
                self.fail(&mut session, err.to_string(), sink).await
            }
            Err(payload) => {
                let message = format!("Unexpected error: {}", panic_message(payload.as_ref()));
                error!(session = %id, stage = %session.state, %message, "orchestrator fault");
                self.fail(&mut session, message, sink).await
            }
        };

        self.cleanup(id, lease, sink).await;
        metrics::counter!("seqstream_sessions_total", "outcome" => outcome.as_str()).increment(1);
        info!(session = %id, outcome = outcome.as_str(), "session finished");
        outcome
    }

    async fn fail<S>(&self, session: &mut Session, message: String, sink: &mut S) -> PipelineOutcome
    where
        S: EventSink + ?Sized,
    {
        enter(session, PipelineState::Failed);
        if sink.send(PipelineEvent::error(message.clone())).await.is_err() {
            debug!(session = %session.id, "error event not delivered");
        }
        PipelineOutcome::Failed(message)
    }

    async fn cleanup<S>(&self, id: SessionId, lease: Option<InputLease>, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        if let Some(lease) = lease {
            if let Err(e) = lease.release() {
                warn!(session = %id, error = %e, "failed to remove stored input");
            }
        }
        self.classifier.release(id).await;
        sink.close().await;
        debug!(session = %id, "session resources released");
    }

    async fn run_stages<S>(
        &self,
        session: &mut Session,
        lease_slot: &mut Option<InputLease>,
        sink: &mut S,
    ) -> StageResult<()>
    where
        S: EventSink + ?Sized,
    {
        let lease = lease_slot.insert(self.registry.claim(session.id)?);
        let format = lease.format();
        let path = lease.path().to_path_buf();
        session.input_format = Some(format);

        advance(session, PipelineState::Reading, &*sink)?;
        emit(sink, PipelineEvent::log(format!("Reading sequences from {} file...", format))).await?;
        let sequences = self.read_sequences(&path, format).await?;
        emit(sink, PipelineEvent::log(format!("Found {} sequences", sequences.len()))).await?;

        advance(session, PipelineState::Classifying, &*sink)?;
        emit(sink, PipelineEvent::log("Generating embeddings and clustering...")).await?;
        let assignment = self.classify(&sequences, sink).await?;
        emit(sink, PipelineEvent::progress("classification", "complete")).await?;
        emit(sink, PipelineEvent::log("Clustering complete")).await?;

        advance(session, PipelineState::Aggregating, &*sink)?;
        let stats = aggregate(&assignment);
        let to_verify = self.top_n.min(stats.total_clusters);
        emit(sink, PipelineEvent::ClusteringResult { data: stats }).await?;

        advance(session, PipelineState::Verifying, &*sink)?;
        emit(
            sink,
            PipelineEvent::log(format!("Starting verification of top {} groups...", to_verify)),
        )
        .await?;
        info!(
            session = %session.id,
            provider = self.verifier.provider_name(),
            groups = to_verify,
            "verifying most abundant groups"
        );
        let mut results = self.verifier.stream(&sequences, &assignment, self.top_n);
        while let Some(result) = results.next().await {
            debug!(session = %session.id, group_id = result.group_id, status = %result.status, "verified group");
            emit(sink, PipelineEvent::VerificationUpdate { data: result }).await?;
            check_connected(&*sink)?;
        }

        emit(sink, PipelineEvent::complete(COMPLETE_MESSAGE)).await?;
        Ok(())
    }

    async fn read_sequences(&self, path: &Path, format: InputFormat) -> StageResult<SequenceSet> {
        let bytes = tokio::fs::read(path).await.map_err(Error::from)?;
        let reader = Arc::clone(&self.reader);

        let parsed = tokio::task::spawn_blocking(move || reader.read(&bytes, format)).await;
        let sequences = match parsed {
            Ok(sequences) => sequences?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(Error::internal(format!("reader task aborted: {}", e)).into()),
        };

        if sequences.is_empty() {
            return Err(Error::NoSequences.into());
        }
        Ok(sequences)
    }

    async fn classify<S>(&self, sequences: &SequenceSet, sink: &mut S) -> StageResult<ClusterAssignment>
    where
        S: EventSink + ?Sized,
    {
        let classifier = self.classifier.as_ref();
        let provider = classifier.name().to_string();
        let timeout = self.classify_timeout;
        let mut observer = SinkObserver {
            sink,
            provider: &provider,
        };

        let result = self
            .retry
            .execute(
                move || async move {
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, classifier.classify(sequences))
                            .await
                            .unwrap_or(Err(ProviderError::Timeout(limit))),
                        None => classifier.classify(sequences).await,
                    }
                },
                &mut observer,
            )
            .await;

        let assignment = match result {
            Ok(assignment) => assignment,
            Err(RetryError::Cancelled) => return Err(StageError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                return Err(Error::RetriesExhausted {
                    provider,
                    attempts,
                    last,
                }
                .into())
            }
            Err(RetryError::Rejected { error, .. }) => {
                return Err(Error::Rejected {
                    provider,
                    source: error,
                }
                .into())
            }
        };

        if assignment.len() != sequences.len() {
            return Err(Error::Rejected {
                provider,
                source: ProviderError::Malformed(format!(
                    "{} labels for {} sequences",
                    assignment.len(),
                    sequences.len()
                )),
            }
            .into());
        }
        Ok(assignment)
    }
}

/// Surfaces retry notices to the client
struct SinkObserver<'a, S: ?Sized> {
    sink: &'a mut S,
    provider: &'a str,
}

#[async_trait]
impl<'a, S> RetryObserver for SinkObserver<'a, S>
where
    S: EventSink + ?Sized,
{
    async fn on_retry(&mut self, notice: &RetryNotice) -> ControlFlow<()> {
        metrics::counter!("seqstream_provider_retries_total", "provider" => self.provider.to_string())
            .increment(1);

        let message = format!(
            "Classification failed ({}), retrying in {:?} (attempt {}/{})...",
            notice.cause, notice.delay, notice.attempt, notice.max_attempts
        );
        match self.sink.send(PipelineEvent::log(message)).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(Disconnected) => ControlFlow::Break(()),
        }
    }
}

async fn emit<S>(sink: &mut S, event: PipelineEvent) -> StageResult<()>
where
    S: EventSink + ?Sized,
{
    sink.send(event).await.map_err(StageError::from)
}

fn check_connected<S: EventSink + ?Sized>(sink: &S) -> StageResult<()> {
    if sink.is_closed() {
        Err(StageError::Cancelled)
    } else {
        Ok(())
    }
}

/// Enter the next non-terminal stage, unless the client is gone
fn advance<S: EventSink + ?Sized>(
    session: &mut Session,
    next: PipelineState,
    sink: &S,
) -> StageResult<()> {
    check_connected(sink)?;
    enter(session, next);
    Ok(())
}

fn enter(session: &mut Session, next: PipelineState) {
    let left = session.state;
    if let Some(spent) = session.transition(next) {
        metrics::histogram!("seqstream_stage_latency_us", "stage" => left.as_str())
            .record(spent.as_micros() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PipelineOutcome::Completed.as_str(), "completed");
        assert_eq!(PipelineOutcome::Failed("x".into()).as_str(), "failed");
        assert_eq!(PipelineOutcome::Cancelled.as_str(), "cancelled");
    }
}
