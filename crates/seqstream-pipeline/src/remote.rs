//! Classification through a remote prediction service
//!
//! The service assigns a taxon to every sequence instead of a numeric cluster.
//! Each distinct genus becomes one label, numbered in order of first
//! appearance, and its name travels with the assignment.

use crate::provider::ClassificationProvider;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use seqstream_core::{ClusterAssignment, ProviderError, SequenceSet};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, trace};

const PREDICT_PATH: &str = "/predict/fasta";

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    results: Vec<PredictItem>,
}

#[derive(Debug, Deserialize)]
struct PredictItem {
    #[serde(default)]
    prediction: Prediction,
}

#[derive(Debug, Default, Deserialize)]
struct Prediction {
    #[serde(default)]
    genus: Option<String>,
    #[serde(default)]
    genus_prob: Option<f64>,
    #[serde(default, rename = "class")]
    class_name: Option<String>,
}

/// [`ClassificationProvider`] calling `POST <endpoint>/predict/fasta`
#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClassificationProvider for RemoteClassifier {
    async fn classify(&self, sequences: &SequenceSet) -> Result<ClusterAssignment, ProviderError> {
        let url = format!("{}{}", self.endpoint, PREDICT_PATH);
        let part = Part::bytes(to_fasta(sequences).into_bytes())
            .file_name("sequences.fasta")
            .mime_str("application/octet-stream")
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        debug!(%url, sequences = sequences.len(), "sending prediction request");
        let response = self
            .client
            .post(&url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, body));
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        let assignment = parse_predictions(&body, sequences.len())?;
        info!(
            sequences = sequences.len(),
            taxa = distinct_labels(&assignment),
            "remote classification finished"
        );
        Ok(assignment)
    }

    fn name(&self) -> &str {
        "remote-classifier"
    }
}

/// Serialise a sequence set as FASTA with index-based record ids
fn to_fasta(sequences: &SequenceSet) -> String {
    let mut out = String::with_capacity(sequences.iter().map(|s| s.len() + 16).sum());
    for (i, seq) in sequences.iter().enumerate() {
        out.push_str(&format!(">seq{}\n{}\n", i, seq));
    }
    out
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        // reqwest does not report the configured limit
        ProviderError::Timeout(Duration::ZERO)
    } else if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Connection(err.to_string())
    }
}

fn map_status(status: StatusCode, body: String) -> ProviderError {
    let transient = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;
    if transient {
        ProviderError::Unavailable {
            status: status.as_u16(),
            body,
        }
    } else {
        ProviderError::Rejected(format!("prediction service returned {}: {}", status, body))
    }
}

fn parse_predictions(body: &[u8], expected: usize) -> Result<ClusterAssignment, ProviderError> {
    let response: PredictResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let reported = response.count.unwrap_or(response.results.len());
    if response.results.len() != expected || reported != expected {
        return Err(ProviderError::Malformed(format!(
            "expected {} predictions, got {} (count {})",
            expected,
            response.results.len(),
            reported
        )));
    }

    let mut ids: HashMap<String, i64> = HashMap::new();
    let mut names = BTreeMap::new();
    let mut labels = Vec::with_capacity(expected);

    for item in &response.results {
        let prediction = &item.prediction;
        let genus = prediction.genus.as_deref().unwrap_or("unknown");
        let next = ids.len() as i64;
        let label = *ids.entry(genus.to_string()).or_insert_with(|| {
            let class_name = prediction.class_name.as_deref().unwrap_or("unknown");
            names.insert(next, format!("{} ({})", genus, class_name));
            next
        });
        if let Some(prob) = prediction.genus_prob {
            trace!(genus, prob, "prediction");
        }
        labels.push(label);
    }

    Ok(ClusterAssignment::new(labels).with_names(names))
}

fn distinct_labels(assignment: &ClusterAssignment) -> usize {
    let mut labels = assignment.labels().to_vec();
    labels.sort_unstable();
    labels.dedup();
    labels.len()
}
