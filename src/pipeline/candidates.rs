//! Field candidate building.
//!
//! After a hypothesis wins, each of its rows becomes a set of per-field
//! candidate lists. Building is shape-driven and never invents text: every
//! candidate is the verbatim text of a line (or, for descriptions, the
//! newline join of the row's description lines). A field with zero eligible
//! candidates later resolves to `Unresolved`.

use crate::core::config::ExtractionConfig;
use crate::domain::{Candidate, CandidateList, FieldKind, Row};
use crate::processors::{is_numeric_shaped, is_pure_digits, is_short_alpha};

/// Builds the candidate list for one field of one row. The list is
/// deduplicated and capped at the configured size, keeping first-occurrence
/// (top-to-bottom) order.
pub fn build_candidates(row: &Row, field: FieldKind, config: &ExtractionConfig) -> CandidateList {
    let mut list = CandidateList::new(field);
    let lines = row.lines(field);
    if lines.is_empty() {
        return list;
    }

    match field {
        // A multi-line description is one logical value, not an ambiguity.
        FieldKind::Description => {
            let joined = lines
                .iter()
                .map(|l| l.text.as_str())
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if !joined.is_empty() {
                list.push_dedup(Candidate::strong(joined));
            }
        }
        FieldKind::Identifier => {
            for line in lines {
                if !line.text.trim().is_empty() {
                    list.push_dedup(Candidate::strong(line.text.clone()));
                }
            }
        }
        FieldKind::Quantity => {
            for line in lines {
                if is_pure_digits(&line.text) && line.token_count <= 2 {
                    list.push_dedup(Candidate::strong(line.text.clone()));
                } else if !line.text.trim().is_empty() {
                    // Worded quantities ("two") stay usable but flagged.
                    list.push_dedup(Candidate::weak(line.text.clone()));
                }
            }
        }
        FieldKind::UnitOfMeasure => {
            for line in lines {
                if is_short_alpha(&line.text, config.anomaly.unit_max_chars) {
                    list.push_dedup(Candidate::strong(line.text.clone()));
                } else if !line.text.trim().is_empty() {
                    list.push_dedup(Candidate::weak(line.text.clone()));
                }
            }
        }
        FieldKind::UnitPrice | FieldKind::Amount => {
            for line in lines {
                if is_numeric_shaped(&line.text) {
                    list.push_dedup(Candidate::strong(line.text.clone()));
                }
            }
            // Evidence-only fallback: the longest line, never frozen because
            // weak candidates are ineligible on numeric-typed fields.
            if list.entries.is_empty()
                && let Some(longest) = lines
                    .iter()
                    .filter(|l| !l.text.trim().is_empty())
                    .max_by_key(|l| l.text.chars().count())
            {
                list.push_dedup(Candidate::weak(longest.text.clone()));
            }
        }
    }

    list.cap(config.candidate_cap);
    list
}

/// Builds candidate lists for every field of a row, in canonical field
/// order. Fields with no lines yield empty lists so the resolver can record
/// an explicit `Unresolved`.
pub fn build_row_candidates(row: &Row, config: &ExtractionConfig) -> Vec<CandidateList> {
    FieldKind::ALL
        .iter()
        .map(|&field| build_candidates(row, field, config))
        .collect()
}
