//! Error types for SeqStream

/// Result type alias using SeqStream's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SeqStream operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unsupported input, or an input with nothing to analyse
    #[error("{0}")]
    Validation(String),

    /// Sequence file could not be parsed
    #[error("format error: {0}")]
    Format(String),

    /// Parsing succeeded but yielded nothing to analyse
    #[error("No sequences found in file. Please check the file format.")]
    NoSequences,

    /// A transient provider failure outlived the retry budget
    #[error("{provider} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        last: ProviderError,
    },

    /// A provider refused the request; never retried
    #[error("{provider} rejected the request: {source}")]
    Rejected {
        provider: String,
        source: ProviderError,
    },

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected faults caught at the orchestrator boundary
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Failure reported by an external capability provider
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Connection could not be established or was dropped
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call exceeded its own timeout
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Service reported a server-side or availability problem
    #[error("service unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    /// Explicit, non-transient refusal of the request
    #[error("{0}")]
    Rejected(String),

    /// The response could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the failure belongs to the retryable class
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Unavailable { .. }
        )
    }
}
