//! SeqStream Core
//!
//! Core types and error handling shared across SeqStream components.
//!
//! This crate provides:
//! - Domain types for sequence sets, cluster assignments and their statistics
//! - Verification results and the tagged event protocol streamed to clients
//! - Error types and result handling, including the provider error taxonomy

pub mod error;
pub mod event;
pub mod types;

pub use error::{Error, ProviderError, Result};
pub use event::PipelineEvent;
pub use types::{
    ClusterAssignment, ClusterStats, GroupSummary, InputFormat, SequenceSet, SessionId,
    VerificationResult, VerificationStatus, NOISE_LABEL,
};

