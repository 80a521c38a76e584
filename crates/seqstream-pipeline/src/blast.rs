//! Verification against NCBI BLAST through its URL API
//!
//! A search is submitted with `CMD=Put`, polled with `FORMAT_OBJECT=SearchInfo`
//! until it is ready, and the single best hit is fetched as `JSON2_S`.

use crate::config::VerificationConfig;
use crate::provider::{VerificationHit, VerificationOutcome, VerificationProvider};
use async_trait::async_trait;
use serde_json::Value;
use seqstream_core::ProviderError;
use std::time::Duration;
use tracing::{debug, info};

/// Longest description kept from a hit title
const MAX_DESCRIPTION_LEN: usize = 60;

/// State of a submitted search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchStatus {
    Waiting,
    Ready { has_hits: bool },
    Failed,
    Unknown,
}

/// [`VerificationProvider`] backed by the NCBI BLAST URL API
#[derive(Debug, Clone)]
pub struct BlastVerifier {
    client: reqwest::Client,
    url: String,
    program: String,
    database: String,
    poll_interval: Duration,
}

impl BlastVerifier {
    pub fn new(config: &VerificationConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            url: config.blast_url.clone(),
            program: config.program.clone(),
            database: config.database.clone(),
            poll_interval: config.poll_interval(),
        })
    }

    async fn submit(&self, sequence: &str) -> Result<String, ProviderError> {
        let body = self
            .request(self.client.post(&self.url).form(&[
                ("CMD", "Put"),
                ("PROGRAM", self.program.as_str()),
                ("DATABASE", self.database.as_str()),
                ("QUERY", sequence),
                ("HITLIST_SIZE", "1"),
            ]))
            .await?;

        extract_field(&body, "RID")
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("search submission returned no RID".to_string()))
    }

    async fn status(&self, rid: &str) -> Result<SearchStatus, ProviderError> {
        let body = self
            .request(self.client.get(&self.url).query(&[
                ("CMD", "Get"),
                ("FORMAT_OBJECT", "SearchInfo"),
                ("RID", rid),
            ]))
            .await?;
        Ok(parse_status(&body))
    }

    async fn fetch(&self, rid: &str) -> Result<VerificationOutcome, ProviderError> {
        let body = self
            .request(self.client.get(&self.url).query(&[
                ("CMD", "Get"),
                ("FORMAT_TYPE", "JSON2_S"),
                ("RID", rid),
            ]))
            .await?;
        let report: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_best_hit(&report)
    }

    async fn request(&self, builder: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(Duration::ZERO)
            } else {
                ProviderError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(ProviderError::Unavailable {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(ProviderError::Rejected(format!("BLAST returned {}", status)))
        }
    }
}

#[async_trait]
impl VerificationProvider for BlastVerifier {
    async fn verify(&self, sequence: &str) -> Result<VerificationOutcome, ProviderError> {
        let rid = self.submit(sequence).await?;
        info!(%rid, program = %self.program, database = %self.database, "BLAST search submitted");

        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.status(&rid).await? {
                SearchStatus::Waiting => debug!(%rid, "BLAST search still running"),
                SearchStatus::Ready { has_hits: false } => return Ok(VerificationOutcome::NoMatch),
                SearchStatus::Ready { has_hits: true } => break,
                SearchStatus::Failed => {
                    return Err(ProviderError::Rejected(format!("BLAST search {} failed", rid)))
                }
                SearchStatus::Unknown => {
                    return Err(ProviderError::Rejected(format!("BLAST search {} expired", rid)))
                }
            }
        }

        self.fetch(&rid).await
    }

    fn name(&self) -> &str {
        "ncbi-blast"
    }
}

/// Verifier used when no reference database is reachable
///
/// Every lookup fails, so each group is reported with an `ERROR` status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVerifier;

#[async_trait]
impl VerificationProvider for DisabledVerifier {
    async fn verify(&self, _sequence: &str) -> Result<VerificationOutcome, ProviderError> {
        Err(ProviderError::Rejected("verification is disabled".to_string()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Value of a `KEY = value` line in a QBlastInfo block
fn extract_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k.trim() == key).then(|| v.trim()).filter(|v| !v.is_empty())
    })
}

fn parse_status(body: &str) -> SearchStatus {
    match extract_field(body, "Status") {
        Some("WAITING") => SearchStatus::Waiting,
        Some("READY") => SearchStatus::Ready {
            has_hits: extract_field(body, "ThereAreHits") == Some("yes"),
        },
        Some("FAILED") => SearchStatus::Failed,
        _ => SearchStatus::Unknown,
    }
}

fn parse_best_hit(report: &Value) -> Result<VerificationOutcome, ProviderError> {
    let search = report
        .pointer("/BlastOutput2/0/report/results/search")
        .ok_or_else(|| ProviderError::Malformed("missing search results".to_string()))?;

    let Some(hit) = search.pointer("/hits/0") else {
        return Ok(VerificationOutcome::NoMatch);
    };

    let hsp = hit
        .pointer("/hsps/0")
        .ok_or_else(|| ProviderError::Malformed("hit without alignments".to_string()))?;
    let identities = hsp.get("identity").and_then(Value::as_f64);
    let align_len = hsp.get("align_len").and_then(Value::as_f64);
    let (Some(identities), Some(align_len)) = (identities, align_len) else {
        return Err(ProviderError::Malformed("alignment without identity".to_string()));
    };
    if align_len <= 0.0 {
        return Err(ProviderError::Malformed("empty alignment".to_string()));
    }

    let title = hit
        .pointer("/description/0/title")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(VerificationOutcome::Match(VerificationHit {
        identity: identities / align_len * 100.0,
        description: describe(title),
    }))
}

/// Last `|` segment of a hit title, bounded in length
fn describe(title: &str) -> String {
    let tail = title.rsplit('|').next().unwrap_or(title);
    tail.chars().take(MAX_DESCRIPTION_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_rid() {
        let body = "<!--QBlastInfoBegin\n    RID = 9XK2ABCD016\n    RTOE = 27\nQBlastInfoEnd\n-->";
        assert_eq!(extract_field(body, "RID"), Some("9XK2ABCD016"));
        assert_eq!(extract_field(body, "RTOE"), Some("27"));
        assert_eq!(extract_field(body, "Status"), None);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Status=WAITING"), SearchStatus::Waiting);
        assert_eq!(
            parse_status("Status=READY\nThereAreHits=yes"),
            SearchStatus::Ready { has_hits: true }
        );
        assert_eq!(parse_status("Status=READY"), SearchStatus::Ready { has_hits: false });
        assert_eq!(parse_status("Status=FAILED"), SearchStatus::Failed);
        assert_eq!(parse_status("<html></html>"), SearchStatus::Unknown);
    }

    #[test]
    fn test_best_hit_identity_and_description() {
        let report = json!({"BlastOutput2": [{"report": {"results": {"search": {"hits": [{
            "description": [{"title": "gi|123|gb|MN000001.1| Escherichia coli strain K-12 16S ribosomal RNA gene, partial sequence"}],
            "hsps": [{"identity": 495, "align_len": 500}]
        }]}}}}]});

        let VerificationOutcome::Match(hit) = parse_best_hit(&report).unwrap() else {
            panic!("expected a match");
        };
        assert!((hit.identity - 99.0).abs() < 1e-9);
        assert_eq!(hit.description.chars().count(), MAX_DESCRIPTION_LEN);
        assert!(hit.description.starts_with(" Escherichia coli"));
    }

    #[test]
    fn test_no_hits_is_no_match() {
        let report = json!({"BlastOutput2": [{"report": {"results": {"search": {"hits": []}}}}]});
        assert_eq!(parse_best_hit(&report).unwrap(), VerificationOutcome::NoMatch);
    }

    #[test]
    fn test_missing_report_is_malformed() {
        let err = parse_best_hit(&json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_disabled_verifier_faults() {
        let err = DisabledVerifier.verify("ACGT").await.unwrap_err();
        assert_eq!(err.to_string(), "verification is disabled");
    }
}
