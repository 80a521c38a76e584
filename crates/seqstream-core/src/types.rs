//! Core types for SeqStream

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reserved cluster label for sequences that belong to no group
pub const NOISE_LABEL: i64 = -1;

/// Supported sequence file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputFormat {
    Fastq,
    Fasta,
}

impl InputFormat {
    /// File extension used when the input is stored
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Fastq => "fastq",
            Self::Fasta => "fasta",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fastq => f.write_str("FASTQ"),
            Self::Fasta => f.write_str("FASTA"),
        }
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "fastq" | "fq" => Ok(Self::Fastq),
            "fasta" | "fa" | "fna" => Ok(Self::Fasta),
            other => Err(format!("unsupported format: {other}")),
        }
    }
}

/// Opaque token identifying one upload and its analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Ordered, immutable set of raw sequences read from one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSet {
    sequences: Vec<String>,
}

impl SequenceSet {
    pub fn new(sequences: Vec<String>) -> Self {
        Self { sequences }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Sequence at a 0-based index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.sequences.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.sequences
    }
}

impl From<Vec<String>> for SequenceSet {
    fn from(sequences: Vec<String>) -> Self {
        Self::new(sequences)
    }
}

/// One label per sequence index, `-1` meaning noise
///
/// Providers that classify into named taxa instead of numeric clusters attach the
/// name of each label so it can be surfaced alongside the statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterAssignment {
    labels: Vec<i64>,
    names: BTreeMap<i64, String>,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<i64>) -> Self {
        Self {
            labels,
            names: BTreeMap::new(),
        }
    }

    /// Attach display names to labels
    pub fn with_names(mut self, names: BTreeMap<i64, String>) -> Self {
        self.names = names;
        self
    }

    /// Number of labelled sequences
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of the sequence at `index`
    pub fn label(&self, index: usize) -> Option<i64> {
        self.labels.get(index).copied()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Display name of a label, if the provider supplied one
    pub fn name(&self, label: i64) -> Option<&str> {
        self.names.get(&label).map(String::as_str)
    }

    /// Indices of the sequences carrying `label`, ascending
    pub fn members(&self, label: i64) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, l)| **l == label)
            .map(|(i, _)| i)
    }
}

/// Abundance of a single (non-noise) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: i64,
    pub count: usize,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Summary statistics of one clustering run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_reads: usize,
    pub total_clusters: usize,
    pub noise_count: usize,
    pub noise_percentage: f64,
    pub top_groups: Vec<GroupSummary>,
}

/// Verdict of verifying a group's representative against a reference database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Known,
    Related,
    Novel,
    Ghost,
    Alien,
    Error,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Known => "KNOWN",
            Self::Related => "RELATED",
            Self::Novel => "NOVEL",
            Self::Ghost => "GHOST",
            Self::Alien => "ALIEN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification outcome for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Progress label, e.g. `Verification 2/5`
    pub step: String,
    pub group_id: i64,
    pub status: VerificationStatus,
    pub match_percentage: f64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_format_parsing() {
        assert_eq!(".fastq".parse::<InputFormat>(), Ok(InputFormat::Fastq));
        assert_eq!("FQ".parse::<InputFormat>(), Ok(InputFormat::Fastq));
        assert_eq!("fa".parse::<InputFormat>(), Ok(InputFormat::Fasta));
        assert!("bam".parse::<InputFormat>().is_err());
    }

    #[test]
    fn test_members_in_index_order() {
        let assignment = ClusterAssignment::new(vec![0, 1, 0, -1, 0]);
        assert_eq!(assignment.members(0).collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(assignment.members(NOISE_LABEL).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&VerificationStatus::Ghost).unwrap();
        assert_eq!(json, "\"GHOST\"");
    }

    #[test]
    fn test_session_id_roundtrips_through_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("../etc/passwd".parse::<SessionId>().is_err());
    }
}
