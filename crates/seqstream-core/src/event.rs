//! Messages streamed to a client while its session is analysed

use crate::types::{ClusterStats, VerificationResult};
use serde::{Deserialize, Serialize};

/// A single message on a session's streaming channel
///
/// Serialized as a flat object tagged by `type`, e.g.
/// `{"type":"log","message":"Found 100 sequences"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Log { message: String },
    Progress { step: String, status: String },
    ClusteringResult { data: ClusterStats },
    VerificationUpdate { data: VerificationResult },
    Error { message: String },
    Complete { message: String },
}

impl PipelineEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn progress(step: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Progress {
            step: step.into(),
            status: status.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::Complete {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }

    /// Wire tag of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Progress { .. } => "progress",
            Self::ClusteringResult { .. } => "clustering_result",
            Self::VerificationUpdate { .. } => "verification_update",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupSummary, VerificationStatus};

    #[test]
    fn test_log_wire_shape() {
        let json = serde_json::to_value(PipelineEvent::log("Reading")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "log", "message": "Reading"}));
    }

    #[test]
    fn test_clustering_result_wire_shape() {
        let event = PipelineEvent::ClusteringResult {
            data: ClusterStats {
                total_reads: 10,
                total_clusters: 1,
                noise_count: 0,
                noise_percentage: 0.0,
                top_groups: vec![GroupSummary {
                    group_id: 0,
                    count: 10,
                    percentage: 100.0,
                    label: None,
                }],
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "clustering_result");
        assert_eq!(json["data"]["top_groups"][0]["group_id"], 0);
        assert!(json["data"]["top_groups"][0].get("label").is_none());
    }

    #[test]
    fn test_verification_update_wire_shape() {
        let event = PipelineEvent::VerificationUpdate {
            data: VerificationResult {
                step: "Verification 1/1".into(),
                group_id: 3,
                status: VerificationStatus::Known,
                match_percentage: 99.5,
                description: "Escherichia coli".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "verification_update");
        assert_eq!(json["data"]["status"], "KNOWN");
    }

    #[test]
    fn test_terminal_events() {
        assert!(PipelineEvent::error("boom").is_terminal());
        assert!(PipelineEvent::complete("done").is_terminal());
        assert!(!PipelineEvent::progress("classification", "complete").is_terminal());
    }
}
