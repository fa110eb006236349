//! External scoring collaborators.
//!
//! The engine treats the semantic-similarity service and the
//! relevance/ranking service as opaque, injectable dependencies with a
//! narrow contract: one batch request in, one score vector out, with a
//! bounded timeout and an explicit unavailable variant. Scores from
//! different relevance calls are comparable only within the call that
//! produced them and are never mixed across pages or fields.

pub mod http;
pub mod stub;

use std::fmt::Debug;
use thiserror::Error;

pub use http::{HttpRelevanceRanker, HttpSimilarityScorer};
pub use stub::{CountingRanker, FixedSimilarity, LexicalStubRanker, UnavailableRanker, UnavailableSimilarity};

/// Failure of an external service call. Never fatal to the run: the caller
/// degrades per the documented degraded-mode behavior.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The call did not complete within the configured timeout.
    #[error("service timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured timeout that elapsed.
        timeout_ms: u64,
    },
    /// The service could not be reached or returned an error status.
    #[error("service unavailable: {reason}")]
    Unavailable {
        /// Transport or status detail.
        reason: String,
    },
    /// The service answered with a payload that violates the contract
    /// (e.g. a score vector of the wrong length).
    #[error("malformed service response: {detail}")]
    Malformed {
        /// What was wrong with the payload.
        detail: String,
    },
}

/// Result alias for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// One similarity query: a cell text compared against a fixed set of
/// per-field semantic prototypes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimilarityQuery {
    /// The cell text to score.
    pub text: String,
    /// The prototype strings for the field the cell sits in.
    pub prototypes: Vec<String>,
}

/// Semantic-similarity service: scores each query text against its
/// prototype set, returning the best similarity in `[0, 1]` per query.
///
/// Contract: deterministic given identical inputs (modulo documented model
/// variance, which the scorer's weighted combination tolerates).
pub trait SimilarityScorer: Send + Sync + Debug {
    /// Scores a batch of queries. The returned vector must have exactly one
    /// score per query, in query order.
    fn score_batch(&self, queries: &[SimilarityQuery]) -> ServiceResult<Vec<f32>>;
}

/// Relevance/ranking service: scores a list of candidate snippets against
/// one instruction. Scores are relative and comparable only within the call.
pub trait RelevanceRanker: Send + Sync + Debug {
    /// Returns one relevance score per candidate, in candidate order.
    fn rank(&self, instruction: &str, candidates: &[String]) -> ServiceResult<Vec<f32>>;
}

/// Issues a batch call with at most one retry, the crate-wide retry policy
/// for external services. Repeated failure propagates as the last error.
pub fn with_one_retry<T>(mut call: impl FnMut() -> ServiceResult<T>) -> ServiceResult<T> {
    match call() {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::debug!(target: "services", error = %first, "service call failed; retrying once");
            call()
        }
    }
}
