//! Relevance-backed tie-breaking of field candidates.
//!
//! Fields resolve in canonical order within a row, so later queries can cite
//! the values already frozen for the row. A field with one eligible
//! candidate freezes immediately with no service call; only a genuine tie
//! (two or more eligible candidates) spends a ranking call. Service failure
//! after the single retry leaves the field `Unresolved` and marks the page
//! degraded; it never aborts the run or invents a value.

use crate::core::config::ExtractionConfig;
use crate::domain::{FieldKind, ResolvedField, ResolvedRow, Row, TieBreakRecord};
use crate::pipeline::candidates::build_row_candidates;
use crate::processors::truncate_chars;
use crate::services::{RelevanceRanker, with_one_retry};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Resolution of a page's rows plus diagnostics.
#[derive(Debug)]
pub struct TieBreakOutcome {
    /// One resolved row per input row, same order.
    pub rows: Vec<ResolvedRow>,
    /// One record per (row, field) that had at least one raw candidate.
    pub records: Vec<TieBreakRecord>,
    /// True when a ranking call failed and a field was left unresolved.
    pub degraded: bool,
    /// One reason per failed call.
    pub reasons: Vec<String>,
}

/// Resolves every field of every row of the winning hypothesis.
pub fn resolve_rows(
    rows: &[Row],
    config: &ExtractionConfig,
    ranker: &dyn RelevanceRanker,
) -> TieBreakOutcome {
    let mut outcome = TieBreakOutcome {
        rows: Vec::with_capacity(rows.len()),
        records: Vec::new(),
        degraded: false,
        reasons: Vec::new(),
    };

    for (row_index, row) in rows.iter().enumerate() {
        let mut fields: BTreeMap<FieldKind, ResolvedField> = BTreeMap::new();

        for mut list in build_row_candidates(row, config) {
            let field = list.field;
            if list.entries.is_empty() {
                fields.insert(field, ResolvedField::Unresolved);
                continue;
            }

            let eligible: Vec<usize> = list
                .eligible()
                .iter()
                .map(|c| {
                    list.entries
                        .iter()
                        .position(|e| e.text == c.text)
                        .unwrap_or(0)
                })
                .collect();

            let resolved = match eligible.len() {
                0 => ResolvedField::Unresolved,
                1 => ResolvedField::Frozen(list.entries[eligible[0]].text.clone()),
                _ => {
                    let texts: Vec<String> = eligible
                        .iter()
                        .map(|&i| list.entries[i].text.clone())
                        .collect();
                    let instruction = tie_break_instruction(field, &fields, config);
                    let call = || {
                        let scores = ranker.rank(&instruction, &texts)?;
                        if scores.len() != texts.len() {
                            return Err(crate::services::ServiceError::Malformed {
                                detail: format!(
                                    "expected {} scores, got {}",
                                    texts.len(),
                                    scores.len()
                                ),
                            });
                        }
                        Ok(scores)
                    };
                    match with_one_retry(call) {
                        Ok(scores) => {
                            for (slot, &entry_index) in eligible.iter().enumerate() {
                                list.entries[entry_index].relevance = Some(scores[slot]);
                            }
                            // Strict greater-than: equal scores keep the
                            // earlier (upper) candidate.
                            let mut best = 0usize;
                            for (slot, score) in scores.iter().enumerate() {
                                if *score > scores[best] {
                                    best = slot;
                                }
                            }
                            ResolvedField::Frozen(list.entries[eligible[best]].text.clone())
                        }
                        Err(error) => {
                            tracing::warn!(
                                target: "tiebreak",
                                row = row_index,
                                field = %field,
                                %error,
                                "ranking failed; leaving field unresolved"
                            );
                            outcome.degraded = true;
                            outcome
                                .reasons
                                .push(format!("tie-break failed for {field}: {error}"));
                            ResolvedField::Unresolved
                        }
                    }
                }
            };

            outcome.records.push(TieBreakRecord {
                row_index,
                field,
                chosen: resolved.value().map(str::to_string),
                candidates: list.entries.clone(),
            });
            fields.insert(field, resolved);
        }

        outcome.rows.push(ResolvedRow { fields });
    }

    outcome
}

/// Builds the per-field ranking instruction, embedding the row values frozen
/// so far as bounded context.
fn tie_break_instruction(
    field: FieldKind,
    frozen: &BTreeMap<FieldKind, ResolvedField>,
    config: &ExtractionConfig,
) -> String {
    let context = frozen
        .iter()
        .filter_map(|(f, r)| r.value().map(|v| format!("{f}={}", v.replace('\n', " "))))
        .join("; ");
    let context = truncate_chars(&context, config.context_max_chars);
    format!(
        "Select the most plausible {field} value for this invoice line item. Row context: {context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Line;
    use crate::processors::{HSpan, VSpan};
    use crate::services::ServiceError;
    use crate::services::stub::CountingRanker;

    fn line(field: FieldKind, text: &str, token_count: usize) -> Line {
        Line {
            field,
            text: text.to_string(),
            h: HSpan::new(0.0, 10.0),
            v: VSpan::new(0.0, 10.0),
            token_count,
        }
    }

    fn clean_row() -> Row {
        Row {
            v: VSpan::new(0.0, 10.0),
            cells: vec![
                (FieldKind::Identifier, vec![line(FieldKind::Identifier, "1", 1)]),
                (FieldKind::Description, vec![line(FieldKind::Description, "Flight ticket", 2)]),
                (FieldKind::Quantity, vec![line(FieldKind::Quantity, "1", 1)]),
                (FieldKind::UnitOfMeasure, vec![line(FieldKind::UnitOfMeasure, "PAX", 1)]),
                (FieldKind::UnitPrice, vec![line(FieldKind::UnitPrice, "1,500,000", 1)]),
                (FieldKind::Amount, vec![line(FieldKind::Amount, "1,500,000", 1)]),
            ],
            has_left_anchor: true,
            has_right_anchor: true,
        }
    }

    #[test]
    fn singletons_freeze_without_service_calls() {
        let config = ExtractionConfig::default();
        let ranker = CountingRanker::new();
        let outcome = resolve_rows(&[clean_row()], &config, &ranker);

        assert_eq!(ranker.calls(), 0);
        assert!(!outcome.degraded);
        let row = &outcome.rows[0];
        assert_eq!(row.value(FieldKind::Quantity), Some("1"));
        assert_eq!(row.value(FieldKind::UnitOfMeasure), Some("PAX"));
        assert_eq!(row.value(FieldKind::UnitPrice), Some("1,500,000"));
        assert_eq!(row.value(FieldKind::Description), Some("Flight ticket"));
        // Every populated field left a record.
        assert_eq!(outcome.records.len(), 6);
    }

    #[test]
    fn higher_relevance_wins_a_two_way_price_tie() {
        let config = ExtractionConfig::default();
        let mut row = clean_row();
        for (field, lines) in &mut row.cells {
            if *field == FieldKind::UnitPrice {
                *lines = vec![
                    line(FieldKind::UnitPrice, "19.573.311", 1),
                    line(FieldKind::UnitPrice, "117.439.866", 1),
                ];
            }
        }
        let ranker = CountingRanker::scripted(vec![Ok(vec![0.2, 0.9])]);
        let outcome = resolve_rows(&[row], &config, &ranker);

        assert_eq!(ranker.calls(), 1);
        assert_eq!(
            outcome.rows[0].value(FieldKind::UnitPrice),
            Some("117.439.866")
        );
        // The loser stays visible in the diagnostics with its score.
        let record = outcome
            .records
            .iter()
            .find(|r| r.field == FieldKind::UnitPrice)
            .expect("price record");
        assert_eq!(record.chosen.as_deref(), Some("117.439.866"));
        assert_eq!(record.candidates.len(), 2);
        assert_eq!(record.candidates[0].relevance, Some(0.2));
        assert_eq!(record.candidates[1].relevance, Some(0.9));
    }

    #[test]
    fn equal_scores_keep_the_upper_candidate() {
        let config = ExtractionConfig::default();
        let mut row = clean_row();
        for (field, lines) in &mut row.cells {
            if *field == FieldKind::Amount {
                *lines = vec![
                    line(FieldKind::Amount, "100", 1),
                    line(FieldKind::Amount, "200", 1),
                ];
            }
        }
        let ranker = CountingRanker::scripted(vec![Ok(vec![0.7, 0.7])]);
        let outcome = resolve_rows(&[row], &config, &ranker);
        assert_eq!(outcome.rows[0].value(FieldKind::Amount), Some("100"));
    }

    #[test]
    fn ranking_failure_leaves_field_unresolved_and_degrades() {
        let config = ExtractionConfig::default();
        let mut row = clean_row();
        for (field, lines) in &mut row.cells {
            if *field == FieldKind::UnitPrice {
                *lines = vec![
                    line(FieldKind::UnitPrice, "100", 1),
                    line(FieldKind::UnitPrice, "200", 1),
                ];
            }
        }
        let ranker = CountingRanker::scripted(vec![
            Err(ServiceError::Timeout { timeout_ms: 10 }),
            Err(ServiceError::Timeout { timeout_ms: 10 }),
        ]);
        let outcome = resolve_rows(&[row], &config, &ranker);

        assert_eq!(ranker.calls(), 2); // one retry, then give up
        assert!(outcome.degraded);
        assert_eq!(outcome.reasons.len(), 1);
        assert_eq!(outcome.rows[0].value(FieldKind::UnitPrice), None);
        // The other fields still resolved.
        assert_eq!(outcome.rows[0].value(FieldKind::Amount), Some("1,500,000"));
    }

    #[test]
    fn weak_only_price_resolves_to_unresolved_without_a_call() {
        let config = ExtractionConfig::default();
        let mut row = clean_row();
        for (field, lines) in &mut row.cells {
            if *field == FieldKind::UnitPrice {
                *lines = vec![line(FieldKind::UnitPrice, "Fifty Rupiah Sub", 3)];
            }
        }
        let ranker = CountingRanker::new();
        let outcome = resolve_rows(&[row], &config, &ranker);

        assert_eq!(ranker.calls(), 0);
        assert_eq!(outcome.rows[0].value(FieldKind::UnitPrice), None);
        let record = outcome
            .records
            .iter()
            .find(|r| r.field == FieldKind::UnitPrice)
            .expect("price record");
        assert!(record.chosen.is_none());
        assert_eq!(record.candidates.len(), 1); // evidence retained
        assert!(!outcome.degraded); // shape rejection is not degradation
    }

    #[test]
    fn worded_quantity_freezes_as_weak_singleton() {
        let config = ExtractionConfig::default();
        let mut row = clean_row();
        for (field, lines) in &mut row.cells {
            if *field == FieldKind::Quantity {
                *lines = vec![line(FieldKind::Quantity, "two", 1)];
            }
        }
        let outcome = resolve_rows(&[row], &config, &CountingRanker::new());
        assert_eq!(outcome.rows[0].value(FieldKind::Quantity), Some("two"));
    }

    #[test]
    fn missing_field_is_explicitly_unresolved() {
        let config = ExtractionConfig::default();
        let row = Row {
            v: VSpan::new(0.0, 10.0),
            cells: vec![(FieldKind::Description, vec![line(FieldKind::Description, "Hotel", 1)])],
            has_left_anchor: true,
            has_right_anchor: false,
        };
        let outcome = resolve_rows(&[row], &config, &CountingRanker::new());
        let resolved = &outcome.rows[0];
        assert_eq!(resolved.value(FieldKind::Description), Some("Hotel"));
        assert_eq!(
            resolved.fields.get(&FieldKind::Amount),
            Some(&ResolvedField::Unresolved)
        );
        // No record for fields that never had a candidate.
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn instruction_cites_previously_frozen_values() {
        let config = ExtractionConfig::default();
        let mut frozen = BTreeMap::new();
        frozen.insert(
            FieldKind::Description,
            ResolvedField::Frozen("Flight ticket\nCGK-DPS".into()),
        );
        frozen.insert(FieldKind::Quantity, ResolvedField::Frozen("1".into()));
        frozen.insert(FieldKind::Amount, ResolvedField::Unresolved);

        let instruction = tie_break_instruction(FieldKind::UnitPrice, &frozen, &config);
        assert!(instruction.contains("unit_price"));
        assert!(instruction.contains("description=Flight ticket CGK-DPS"));
        assert!(instruction.contains("quantity=1"));
        assert!(!instruction.contains("amount="));
    }

    #[test]
    fn context_is_truncated_to_the_configured_budget() {
        let mut config = ExtractionConfig::default();
        config.context_max_chars = 10;
        let mut frozen = BTreeMap::new();
        frozen.insert(
            FieldKind::Description,
            ResolvedField::Frozen("a very long description that keeps going".into()),
        );
        let instruction = tie_break_instruction(FieldKind::Quantity, &frozen, &config);
        let context = instruction.split("Row context: ").nth(1).expect("context");
        assert!(context.chars().count() <= 10);
    }
}
