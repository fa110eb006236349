//! HTTP implementations of the scoring services.
//!
//! Both clients speak a small JSON protocol: one POST per batch, one score
//! vector back. Timeouts are enforced by the underlying client; transport
//! failures map to [`ServiceError::Unavailable`] and contract violations to
//! [`ServiceError::Malformed`]. The one-retry policy is applied by the
//! callers through [`super::with_one_retry`].

use super::{RelevanceRanker, ServiceError, ServiceResult, SimilarityQuery, SimilarityScorer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    pairs: &'a [SimilarityQuery],
}

#[derive(Debug, Deserialize)]
struct ScoresResponse {
    scores: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct RankRequest<'a> {
    instruction: &'a str,
    candidates: &'a [String],
}

fn build_client(timeout_ms: u64) -> Result<reqwest::blocking::Client, ServiceError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| ServiceError::Unavailable {
            reason: format!("client construction failed: {e}"),
        })
}

fn map_transport_error(timeout_ms: u64, error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout { timeout_ms }
    } else {
        ServiceError::Unavailable {
            reason: error.to_string(),
        }
    }
}

fn post_scores<B: Serialize>(
    client: &reqwest::blocking::Client,
    endpoint: &str,
    timeout_ms: u64,
    body: &B,
    expected_len: usize,
) -> ServiceResult<Vec<f32>> {
    let response = client
        .post(endpoint)
        .json(body)
        .send()
        .map_err(|e| map_transport_error(timeout_ms, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Unavailable {
            reason: format!("{endpoint} returned {status}"),
        });
    }

    let parsed: ScoresResponse = response.json().map_err(|e| ServiceError::Malformed {
        detail: format!("invalid score payload: {e}"),
    })?;

    if parsed.scores.len() != expected_len {
        return Err(ServiceError::Malformed {
            detail: format!(
                "expected {expected_len} scores, got {}",
                parsed.scores.len()
            ),
        });
    }
    Ok(parsed.scores)
}

/// Blocking HTTP client for the semantic-similarity service.
#[derive(Debug)]
pub struct HttpSimilarityScorer {
    client: reqwest::blocking::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpSimilarityScorer {
    /// Creates a client for `endpoint` with the given request timeout.
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> ServiceResult<Self> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            endpoint: endpoint.into(),
            timeout_ms,
        })
    }
}

impl SimilarityScorer for HttpSimilarityScorer {
    fn score_batch(&self, queries: &[SimilarityQuery]) -> ServiceResult<Vec<f32>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        post_scores(
            &self.client,
            &self.endpoint,
            self.timeout_ms,
            &SimilarityRequest { pairs: queries },
            queries.len(),
        )
    }
}

/// Blocking HTTP client for the relevance/ranking service.
#[derive(Debug)]
pub struct HttpRelevanceRanker {
    client: reqwest::blocking::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpRelevanceRanker {
    /// Creates a client for `endpoint` with the given request timeout.
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> ServiceResult<Self> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            endpoint: endpoint.into(),
            timeout_ms,
        })
    }
}

impl RelevanceRanker for HttpRelevanceRanker {
    fn rank(&self, instruction: &str, candidates: &[String]) -> ServiceResult<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        post_scores(
            &self.client,
            &self.endpoint,
            self.timeout_ms,
            &RankRequest {
                instruction,
                candidates,
            },
            candidates.len(),
        )
    }
}
