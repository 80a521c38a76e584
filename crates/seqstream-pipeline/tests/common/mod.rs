//! Mock collaborators for pipeline tests
//!
//! Configurable, call-counting implementations of the provider traits and an
//! event sink that records everything it is sent.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use seqstream_core::{ClusterAssignment, PipelineEvent, ProviderError, SequenceSet, SessionId};
use seqstream_pipeline::{
    ClassificationProvider, Disconnected, EventSink, VerificationHit, VerificationOutcome,
    VerificationProvider,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// A classifier returning a fixed partition, optionally after scripted failures
pub struct MockClassifier {
    labels: Vec<i64>,
    failures: Mutex<VecDeque<ProviderError>>,
    latency: Option<Duration>,
    panic_message: Option<String>,
    call_count: AtomicU32,
    released: Mutex<Vec<SessionId>>,
}

impl MockClassifier {
    pub fn new(labels: Vec<i64>) -> Self {
        Self {
            labels,
            failures: Mutex::new(VecDeque::new()),
            latency: None,
            panic_message: None,
            call_count: AtomicU32::new(0),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Fail with `error` on the next `times` calls
    pub fn failing(self, error: ProviderError, times: usize) -> Self {
        self.failures.lock().extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Panic inside `classify`
    pub fn panicking(mut self, message: &str) -> Self {
        self.panic_message = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> Vec<SessionId> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl ClassificationProvider for MockClassifier {
    async fn classify(&self, _sequences: &SequenceSet) -> Result<ClusterAssignment, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(ClusterAssignment::new(self.labels.clone()))
    }

    fn name(&self) -> &str {
        "mock-classifier"
    }

    async fn release(&self, session: SessionId) {
        self.released.lock().push(session);
    }
}

/// A verifier answering from a table keyed by sequence
pub struct MockVerifier {
    answers: HashMap<String, Result<VerificationOutcome, ProviderError>>,
    panics: HashMap<String, String>,
    call_count: AtomicU32,
    queried: Mutex<Vec<String>>,
}

impl MockVerifier {
    /// Answers `NoMatch` to everything not configured
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            panics: HashMap::new(),
            call_count: AtomicU32::new(0),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hit(mut self, sequence: &str, identity: f64, description: &str) -> Self {
        self.answers.insert(
            sequence.to_string(),
            Ok(VerificationOutcome::Match(VerificationHit {
                identity,
                description: description.to_string(),
            })),
        );
        self
    }

    pub fn with_fault(mut self, sequence: &str, error: ProviderError) -> Self {
        self.answers.insert(sequence.to_string(), Err(error));
        self
    }

    /// Panic with `message` when this sequence is looked up
    pub fn with_panic(mut self, sequence: &str, message: &str) -> Self {
        self.panics.insert(sequence.to_string(), message.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sequences looked up so far, in call order
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().clone()
    }
}

#[async_trait]
impl VerificationProvider for MockVerifier {
    async fn verify(&self, sequence: &str) -> Result<VerificationOutcome, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.queried.lock().push(sequence.to_string());
        if let Some(message) = self.panics.get(sequence) {
            panic!("{}", message);
        }
        self.answers
            .get(sequence)
            .cloned()
            .unwrap_or(Ok(VerificationOutcome::NoMatch))
    }

    fn name(&self) -> &str {
        "mock-verifier"
    }
}

/// Sink that records events and can simulate a client going away
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<PipelineEvent>,
    disconnect_after: Option<&'static str>,
    disconnected: bool,
    pub close_count: u32,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnect right after the first event of this kind is delivered
    pub fn disconnect_after(kind: &'static str) -> Self {
        Self {
            disconnect_after: Some(kind),
            ..Self::default()
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(PipelineEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Log { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<&PipelineEvent> {
        self.events.last()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&mut self, event: PipelineEvent) -> Result<(), Disconnected> {
        if self.disconnected {
            return Err(Disconnected);
        }
        let kind = event.kind();
        self.events.push(event);
        if self.disconnect_after == Some(kind) {
            self.disconnected = true;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.disconnected
    }

    async fn close(&mut self) {
        self.close_count += 1;
    }
}

/// FASTA text with one record per sequence
pub fn fasta(sequences: &[String]) -> Vec<u8> {
    sequences
        .iter()
        .enumerate()
        .map(|(i, s)| format!(">read{}\n{}\n", i, s))
        .collect::<String>()
        .into_bytes()
}

/// 100 reads: 80 in group 0, 15 in group 1, 5 noise
///
/// The longest member of group 0 is read 7 and of group 1 is read 83.
pub fn abundance_fixture() -> (Vec<String>, Vec<i64>) {
    let mut sequences = Vec::with_capacity(100);
    let mut labels = Vec::with_capacity(100);
    for i in 0..100 {
        let (label, seq) = match i {
            7 => (0, "ACGT".repeat(30)),
            0..=79 => (0, "ACGT".repeat(20)),
            83 => (1, "GGCA".repeat(25)),
            80..=94 => (1, "GGCA".repeat(10)),
            _ => (-1, "TTTT".repeat(5)),
        };
        sequences.push(seq);
        labels.push(label);
    }
    (sequences, labels)
}
