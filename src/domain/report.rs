//! Terminal artifacts of a pipeline run.
//!
//! A [`PageReport`] is the append-only record a page run produces: status,
//! resolved rows, the chosen hypothesis with its score breakdown, retained
//! alternates, and tie-break diagnostics. Reports are versioned with the
//! configuration tag so reruns under a different configuration never mix
//! silently with prior artifacts.

use super::structure::{Candidate, FieldKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field's final value: frozen text or an explicit unresolved marker.
/// The engine never invents a value for an unresolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum ResolvedField {
    /// A single frozen text value.
    Frozen(String),
    /// No shape-valid candidate existed, or the required service score
    /// could not be obtained.
    Unresolved,
}

impl ResolvedField {
    /// The frozen text, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            ResolvedField::Frozen(v) => Some(v),
            ResolvedField::Unresolved => None,
        }
    }
}

/// One output row: per field, either a frozen value or `Unresolved`.
/// Derived once from the winning hypothesis and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRow {
    /// Resolution per field, in canonical field order.
    pub fields: BTreeMap<FieldKind, ResolvedField>,
}

impl ResolvedRow {
    /// Convenience accessor for a field's frozen value.
    pub fn value(&self, field: FieldKind) -> Option<&str> {
        self.fields.get(&field).and_then(|f| f.value())
    }
}

/// The four scoring signals plus the weighted final score, retained so an
/// audit can recompute the combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Relevance-service score relative to the page's other hypotheses.
    /// Zero in degraded mode.
    pub relevance: f32,
    /// Fraction of rows with every required field non-empty.
    pub completeness: f32,
    /// Mean per-field similarity against the semantic prototypes.
    /// Zero in degraded mode.
    pub type_fit: f32,
    /// Fraction of rows exhibiting a structural anomaly.
    pub anomaly: f32,
    /// `w1*relevance + w2*completeness + w3*type_fit - w4*anomaly`.
    pub final_score: f32,
}

/// A scored hypothesis as retained in the report: identifier + breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHypothesis {
    /// Hypothesis identifier (parameter-derived, unique per page).
    pub id: String,
    /// Score breakdown.
    pub score: ScoreBreakdown,
}

/// Diagnostic record of one tie-break decision: the frozen winner plus the
/// losing candidates with the scores they received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakRecord {
    /// Zero-based row index within the resolved rows.
    pub row_index: usize,
    /// Field being resolved.
    pub field: FieldKind,
    /// The frozen value, or None when the field ended unresolved.
    pub chosen: Option<String>,
    /// Every candidate considered, with any relevance score it received.
    pub candidates: Vec<Candidate>,
}

/// Per-page outcome visible to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// All signals available, rows resolved normally.
    Ok,
    /// An external service was unavailable; some contributions were zeroed
    /// or fields left unresolved.
    Degraded,
    /// The page produced no bands or no valid hypotheses and was excluded
    /// from downstream processing.
    Excluded,
}

/// The per-page diagnostic record produced by a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// Zero-based page index.
    pub page_index: usize,
    /// Structured outcome: ok / degraded / excluded.
    pub status: PageStatus,
    /// Reason string for excluded or degraded pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Configuration version tag stamped at run time.
    pub config_version: String,
    /// The winning hypothesis, absent for excluded pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen: Option<RankedHypothesis>,
    /// Ranks 2-3, retained read-only for diagnostics.
    pub alternates: Vec<RankedHypothesis>,
    /// Final resolved rows, empty for excluded pages.
    pub rows: Vec<ResolvedRow>,
    /// Tie-break diagnostics for every field that had candidates.
    pub tie_breaks: Vec<TieBreakRecord>,
}

impl PageReport {
    /// An excluded-page report carrying only the reason.
    pub fn excluded(page_index: usize, config_version: &str, reason: impl Into<String>) -> Self {
        Self {
            page_index,
            status: PageStatus::Excluded,
            reason: Some(reason.into()),
            config_version: config_version.to_string(),
            chosen: None,
            alternates: Vec::new(),
            rows: Vec::new(),
            tie_breaks: Vec::new(),
        }
    }
}

/// Document-level roll-up across pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Pages that completed with all signals.
    pub ok: usize,
    /// Pages that completed in degraded mode.
    pub degraded: usize,
    /// Pages excluded (no-bands / no-hypotheses).
    pub excluded: usize,
}

impl DocumentSummary {
    /// Tallies page statuses.
    pub fn from_reports(reports: &[PageReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.status {
                PageStatus::Ok => summary.ok += 1,
                PageStatus::Degraded => summary.degraded += 1,
                PageStatus::Excluded => summary.excluded += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_report_has_no_rows() {
        let report = PageReport::excluded(3, "v1", "no-bands");
        assert_eq!(report.status, PageStatus::Excluded);
        assert_eq!(report.reason.as_deref(), Some("no-bands"));
        assert!(report.rows.is_empty());
        assert!(report.chosen.is_none());
    }

    #[test]
    fn summary_counts_statuses() {
        let reports = vec![
            PageReport::excluded(0, "v1", "no-bands"),
            PageReport::excluded(1, "v1", "no-hypotheses"),
        ];
        let summary = DocumentSummary::from_reports(&reports);
        assert_eq!(summary.excluded, 2);
        assert_eq!(summary.ok, 0);
    }

    #[test]
    fn resolved_field_serializes_with_state_tag() {
        let frozen = serde_json::to_string(&ResolvedField::Frozen("PAX".into())).unwrap();
        assert!(frozen.contains("\"frozen\""));
        assert!(frozen.contains("PAX"));

        let unresolved = serde_json::to_string(&ResolvedField::Unresolved).unwrap();
        assert!(unresolved.contains("\"unresolved\""));
    }
}
