//! Hypothesis scoring and selection.
//!
//! Each surviving hypothesis gets four signals: a relevance score from the
//! ranking service (one batched call per page over hypothesis summaries), a
//! completeness rate, a type-fit score from the similarity service (one
//! batched call per page over typed cell texts), and a structural anomaly
//! rate computed locally. The weighted combination decides the winner.
//!
//! Degraded mode: when a service call fails after its single retry, that
//! signal contributes zero for every hypothesis and the weights are NOT
//! renormalized, so degraded pages score systematically lower than healthy
//! ones instead of being silently rescaled.

use crate::core::config::ExtractionConfig;
use crate::domain::{FieldKind, Hypothesis, RankedHypothesis, ScoreBreakdown};
use crate::processors::letter_ratio;
use crate::services::{RelevanceRanker, SimilarityQuery, SimilarityScorer, with_one_retry};

/// A hypothesis with its score breakdown attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHypothesis {
    /// The hypothesis itself.
    pub hypothesis: Hypothesis,
    /// The four signals and their weighted combination.
    pub score: ScoreBreakdown,
}

impl ScoredHypothesis {
    /// Report form: identifier plus breakdown.
    pub fn ranked(&self) -> RankedHypothesis {
        RankedHypothesis {
            id: self.hypothesis.id.clone(),
            score: self.score,
        }
    }
}

/// The scored batch plus degradation bookkeeping for the page report.
#[derive(Debug)]
pub struct ScoringOutcome {
    /// Hypotheses in input order, each with its breakdown.
    pub scored: Vec<ScoredHypothesis>,
    /// True when at least one service signal was zeroed out.
    pub degraded: bool,
    /// Human-readable degradation reasons, one per failed signal.
    pub reasons: Vec<String>,
}

/// The chosen hypothesis and the retained runners-up.
#[derive(Debug)]
pub struct Selection {
    /// The winner, moved out of the batch.
    pub chosen: ScoredHypothesis,
    /// Ranks 2 and 3, kept as read-only diagnostics.
    pub alternates: Vec<RankedHypothesis>,
}

/// Scores every hypothesis of one page.
pub fn score_page(
    hypotheses: Vec<Hypothesis>,
    config: &ExtractionConfig,
    similarity: &dyn SimilarityScorer,
    ranker: &dyn RelevanceRanker,
) -> ScoringOutcome {
    let mut degraded = false;
    let mut reasons = Vec::new();

    let type_fits = type_fit_scores(&hypotheses, config, similarity, &mut degraded, &mut reasons);
    let relevances = relevance_scores(&hypotheses, config, ranker, &mut degraded, &mut reasons);

    let scored = hypotheses
        .into_iter()
        .enumerate()
        .map(|(i, hypothesis)| {
            let relevance = relevances[i];
            let completeness = hypothesis.completeness_rate;
            let type_fit = type_fits[i];
            let anomaly = anomaly_rate(&hypothesis, config);
            let w = &config.weights;
            let final_score = w.relevance * relevance
                + w.completeness * completeness
                + w.type_fit * type_fit
                - w.anomaly * anomaly;
            ScoredHypothesis {
                hypothesis,
                score: ScoreBreakdown {
                    relevance,
                    completeness,
                    type_fit,
                    anomaly,
                    final_score,
                },
            }
        })
        .collect();

    ScoringOutcome {
        scored,
        degraded,
        reasons,
    }
}

/// One batched similarity call covering every typed cell of every
/// hypothesis. Scores are averaged per row first and the row means averaged
/// per hypothesis, so a row with many typed cells weighs the same as a
/// sparse one. Fields without configured prototypes contribute nothing.
fn type_fit_scores(
    hypotheses: &[Hypothesis],
    config: &ExtractionConfig,
    similarity: &dyn SimilarityScorer,
    degraded: &mut bool,
    reasons: &mut Vec<String>,
) -> Vec<f32> {
    let mut queries: Vec<SimilarityQuery> = Vec::new();
    // (start, len) per row, grouped per hypothesis.
    let mut row_spans: Vec<Vec<(usize, usize)>> = Vec::new();

    for hypothesis in hypotheses {
        let mut rows = Vec::with_capacity(hypothesis.rows.len());
        for row in &hypothesis.rows {
            let start = queries.len();
            for field in FieldKind::ALL {
                let Some(prototypes) = config.prototypes.get(&field) else {
                    continue;
                };
                let Some(text) = row.first_text(field) else {
                    continue;
                };
                queries.push(SimilarityQuery {
                    text: text.to_string(),
                    prototypes: prototypes.clone(),
                });
            }
            rows.push((start, queries.len() - start));
        }
        row_spans.push(rows);
    }

    if queries.is_empty() {
        return vec![0.0; hypotheses.len()];
    }

    let call = || {
        let scores = similarity.score_batch(&queries)?;
        if scores.len() != queries.len() {
            return Err(crate::services::ServiceError::Malformed {
                detail: format!("expected {} scores, got {}", queries.len(), scores.len()),
            });
        }
        Ok(scores)
    };
    match with_one_retry(call) {
        Ok(scores) => row_spans
            .iter()
            .map(|rows| {
                let means: Vec<f32> = rows
                    .iter()
                    .filter(|&&(_, len)| len > 0)
                    .map(|&(start, len)| {
                        scores[start..start + len].iter().sum::<f32>() / len as f32
                    })
                    .collect();
                if means.is_empty() {
                    0.0
                } else {
                    means.iter().sum::<f32>() / means.len() as f32
                }
            })
            .collect(),
        Err(error) => {
            tracing::warn!(target: "scoring", %error, "similarity service failed; zeroing type fit");
            *degraded = true;
            reasons.push(format!("similarity unavailable: {error}"));
            vec![0.0; hypotheses.len()]
        }
    }
}

/// One batched relevance call over hypothesis summaries. Raw scores are
/// comparable only within this call, so they are min-max normalized to
/// `[0, 1]` here and never reused across pages. A constant vector maps to
/// 0.5 for every hypothesis.
fn relevance_scores(
    hypotheses: &[Hypothesis],
    config: &ExtractionConfig,
    ranker: &dyn RelevanceRanker,
    degraded: &mut bool,
    reasons: &mut Vec<String>,
) -> Vec<f32> {
    if hypotheses.is_empty() {
        return Vec::new();
    }
    let summaries: Vec<String> = hypotheses
        .iter()
        .map(|h| h.summary(config.summary_max_chars))
        .collect();

    let call = || {
        let raw = ranker.rank(&config.page_instruction, &summaries)?;
        if raw.len() != summaries.len() {
            return Err(crate::services::ServiceError::Malformed {
                detail: format!("expected {} scores, got {}", summaries.len(), raw.len()),
            });
        }
        Ok(raw)
    };
    match with_one_retry(call) {
        Ok(raw) => normalize_unit(&raw),
        Err(error) => {
            tracing::warn!(target: "scoring", %error, "relevance service failed; zeroing relevance");
            *degraded = true;
            reasons.push(format!("relevance unavailable: {error}"));
            vec![0.0; hypotheses.len()]
        }
    }
}

/// Min-max normalization into `[0, 1]`; a constant (or single-element)
/// vector maps to 0.5.
fn normalize_unit(raw: &[f32]) -> Vec<f32> {
    let min = raw.iter().copied().fold(f32::INFINITY, f32::min);
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !(max - min).is_normal() {
        return vec![0.5; raw.len()];
    }
    raw.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Fraction of rows exhibiting a structural anomaly: a numeric-typed cell
/// dominated by letters, or a short-field line with too many tokens.
pub fn anomaly_rate(hypothesis: &Hypothesis, config: &ExtractionConfig) -> f32 {
    if hypothesis.rows.is_empty() {
        return 0.0;
    }
    let anomalous = hypothesis
        .rows
        .iter()
        .filter(|row| {
            FieldKind::ALL.iter().any(|&field| {
                let lines = row.lines(field);
                if field.is_numeric_typed() {
                    lines
                        .first()
                        .is_some_and(|l| letter_ratio(&l.text) > config.anomaly.letter_ratio)
                } else if field.is_short_field() {
                    lines
                        .iter()
                        .any(|l| l.token_count > config.anomaly.short_field_max_tokens)
                } else {
                    false
                }
            })
        })
        .count();
    anomalous as f32 / hypothesis.rows.len() as f32
}

/// Picks the winner: highest final score, then lowest anomaly rate, then
/// lexicographically smallest hypothesis id. Ranks 2 and 3 are retained as
/// alternates. Returns `None` on an empty batch.
pub fn select(outcome: ScoringOutcome) -> Option<Selection> {
    let mut scored = outcome.scored;
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| {
        b.score
            .final_score
            .total_cmp(&a.score.final_score)
            .then(a.score.anomaly.total_cmp(&b.score.anomaly))
            .then(a.hypothesis.id.cmp(&b.hypothesis.id))
    });
    let alternates = scored
        .iter()
        .skip(1)
        .take(2)
        .map(ScoredHypothesis::ranked)
        .collect();
    let chosen = scored.swap_remove(0);
    Some(Selection { chosen, alternates })
}
