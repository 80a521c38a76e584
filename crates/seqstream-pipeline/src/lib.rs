//! SeqStream Pipeline
//!
//! Staged analysis of uploaded sequence files with results streamed to the
//! client as they are produced.
//!
//! A session moves through validation, reading, classification, aggregation
//! and verification:
//! - Classification goes through a [`ClassificationProvider`] wrapped in a
//!   [`RetryPolicy`]; the provider is either the in-process [`LocalEngine`] or
//!   a [`RemoteClassifier`]
//! - Aggregation is the pure [`aggregate`] function
//! - Verification is a lazy stream of per-group lookups against a
//!   [`VerificationProvider`]
//!
//! Events leave through an [`EventSink`], which the server implements on top of
//! a WebSocket.

pub mod blast;
pub mod config;
pub mod local;
pub mod orchestrator;
pub mod provider;
pub mod reader;
pub mod remote;
pub mod retry;
pub mod session;
pub mod stats;
pub mod transport;
pub mod verifier;

pub use blast::{BlastVerifier, DisabledVerifier};
pub use config::{
    ClassificationConfig, ClassificationMode, LocalEngineConfig, PipelineConfig, RetryConfig,
    VerificationConfig, VerifierKind,
};
pub use local::{Clusterer, Embedder, KmerEmbedder, LeaderClusterer, LocalClassifier, LocalEngine};
pub use orchestrator::{Orchestrator, PipelineOutcome, COMPLETE_MESSAGE};
pub use provider::{
    ClassificationProvider, VerificationHit, VerificationOutcome, VerificationProvider,
};
pub use reader::{BioSequenceReader, SequenceReader};
pub use remote::RemoteClassifier;
pub use retry::{RetryError, RetryNotice, RetryObserver, RetryPolicy, Retryable};
pub use session::{InputLease, PipelineState, Session, SessionRegistry, StoredInput};
pub use stats::{aggregate, rank_groups, MAX_TOP_GROUPS};
pub use transport::{Disconnected, EventSink};
pub use verifier::{select_targets, VerificationStreamer, VerificationTarget, DEFAULT_TOP_N};

