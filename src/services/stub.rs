//! Deterministic in-process service implementations.
//!
//! These stand in for the external collaborators in tests and offline runs.
//! They are also the builder defaults: an extractor constructed without
//! endpoints degrades exactly the way an unreachable service would, rather
//! than fabricating signals.

use super::{RelevanceRanker, ServiceError, ServiceResult, SimilarityQuery, SimilarityScorer};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Similarity scorer that always reports the service as unavailable.
#[derive(Debug, Default)]
pub struct UnavailableSimilarity;

impl SimilarityScorer for UnavailableSimilarity {
    fn score_batch(&self, _queries: &[SimilarityQuery]) -> ServiceResult<Vec<f32>> {
        Err(ServiceError::Unavailable {
            reason: "no similarity service configured".into(),
        })
    }
}

/// Relevance ranker that always reports the service as unavailable.
#[derive(Debug, Default)]
pub struct UnavailableRanker;

impl RelevanceRanker for UnavailableRanker {
    fn rank(&self, _instruction: &str, _candidates: &[String]) -> ServiceResult<Vec<f32>> {
        Err(ServiceError::Unavailable {
            reason: "no relevance service configured".into(),
        })
    }
}

/// Similarity scorer returning a fixed score for every query.
#[derive(Debug)]
pub struct FixedSimilarity {
    score: f32,
}

impl FixedSimilarity {
    /// A scorer that answers every query with `score`.
    pub fn new(score: f32) -> Self {
        Self { score }
    }
}

impl SimilarityScorer for FixedSimilarity {
    fn score_batch(&self, queries: &[SimilarityQuery]) -> ServiceResult<Vec<f32>> {
        Ok(vec![self.score; queries.len()])
    }
}

/// Deterministic lexical ranker: scores each candidate by case-insensitive
/// token overlap with the instruction, tie-broken by earlier position
/// (a strictly decreasing epsilon). Useful where tests need a plausible but
/// fully reproducible ranking.
#[derive(Debug, Default)]
pub struct LexicalStubRanker;

impl RelevanceRanker for LexicalStubRanker {
    fn rank(&self, instruction: &str, candidates: &[String]) -> ServiceResult<Vec<f32>> {
        let needle: Vec<String> = instruction
            .to_lowercase()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        Ok(candidates
            .iter()
            .enumerate()
            .map(|(i, cand)| {
                let hay = cand.to_lowercase();
                let hits = needle.iter().filter(|w| hay.contains(*w)).count();
                hits as f32 - i as f32 * 1e-4
            })
            .collect())
    }
}

/// Test scorer that replays scripted score vectors, one per `score_batch`
/// call.
#[derive(Debug, Default)]
pub struct ScriptedSimilarity {
    scripts: Mutex<Vec<ServiceResult<Vec<f32>>>>,
}

impl ScriptedSimilarity {
    /// A scorer that replays the given responses in order.
    pub fn new(scripts: Vec<ServiceResult<Vec<f32>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
        }
    }
}

impl SimilarityScorer for ScriptedSimilarity {
    fn score_batch(&self, queries: &[SimilarityQuery]) -> ServiceResult<Vec<f32>> {
        let mut scripts = self.scripts.lock().expect("script lock");
        if scripts.is_empty() {
            return Ok(vec![0.0; queries.len()]);
        }
        scripts.remove(0)
    }
}

/// Test ranker that replays scripted score vectors and counts calls.
#[derive(Debug, Default)]
pub struct CountingRanker {
    /// Scripted responses, consumed front to back. When empty, candidates
    /// are scored by reverse position (later candidates score lower).
    scripts: Mutex<Vec<ServiceResult<Vec<f32>>>>,
    calls: AtomicUsize,
}

impl CountingRanker {
    /// A ranker with no script: deterministic positional scores.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ranker that replays the given responses in order.
    pub fn scripted(scripts: Vec<ServiceResult<Vec<f32>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `rank` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RelevanceRanker for CountingRanker {
    fn rank(&self, _instruction: &str, candidates: &[String]) -> ServiceResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().expect("script lock");
        if scripts.is_empty() {
            return Ok((0..candidates.len())
                .map(|i| (candidates.len() - i) as f32)
                .collect());
        }
        scripts.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_stubs_error() {
        assert!(UnavailableSimilarity.score_batch(&[]).is_err());
        assert!(UnavailableRanker.rank("x", &[]).is_err());
    }

    #[test]
    fn fixed_similarity_matches_query_count() {
        let scorer = FixedSimilarity::new(0.8);
        let queries = vec![
            SimilarityQuery {
                text: "1".into(),
                prototypes: vec!["2".into()],
            };
            3
        ];
        assert_eq!(scorer.score_batch(&queries).unwrap(), vec![0.8, 0.8, 0.8]);
    }

    #[test]
    fn lexical_ranker_prefers_overlapping_candidate() {
        let ranker = LexicalStubRanker;
        let scores = ranker
            .rank(
                "pick the numeric price",
                &["Fifty Rupiah".into(), "price 19.573.311".into()],
            )
            .unwrap();
        assert!(scores[1] > scores[0]);
    }

    #[test]
    fn lexical_ranker_breaks_ties_by_position() {
        let ranker = LexicalStubRanker;
        let scores = ranker.rank("zzz", &["a".into(), "b".into()]).unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn counting_ranker_replays_scripts() {
        let ranker = CountingRanker::scripted(vec![
            Ok(vec![0.1, 0.9]),
            Err(ServiceError::Timeout { timeout_ms: 5 }),
        ]);
        assert_eq!(ranker.rank("i", &["a".into(), "b".into()]).unwrap(), vec![0.1, 0.9]);
        assert!(ranker.rank("i", &["a".into()]).is_err());
        assert_eq!(ranker.calls(), 2);
    }
}
