//! Structural types shared by every pipeline stage.
//!
//! Lifecycle: `Token`s arrive from the upstream tokenizer and are never
//! mutated. `Band`s are computed once per page. `Line`s and `Row`s are
//! recomputed per hypothesis parameter set and owned by exactly one
//! [`Hypothesis`]; two hypotheses never share a line list, even when their
//! parameters coincide.

use crate::processors::{HSpan, VSpan};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The closed set of line-item fields a band can represent.
///
/// The declaration order is the canonical field order used for deterministic
/// iteration (tie-breaking must not depend on hash ordering).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Item number / code / SKU column.
    Identifier,
    /// Free-text description column.
    Description,
    /// Quantity column.
    Quantity,
    /// Unit-of-measure column.
    UnitOfMeasure,
    /// Per-unit price column.
    UnitPrice,
    /// Line total column.
    Amount,
}

impl FieldKind {
    /// All fields in canonical order.
    pub const ALL: [FieldKind; 6] = [
        FieldKind::Identifier,
        FieldKind::Description,
        FieldKind::Quantity,
        FieldKind::UnitOfMeasure,
        FieldKind::UnitPrice,
        FieldKind::Amount,
    ];

    /// Fields whose frozen value is expected to look numeric.
    pub fn is_numeric_typed(&self) -> bool {
        matches!(self, FieldKind::UnitPrice | FieldKind::Amount)
    }

    /// Fields expected to hold a short value (at most a few tokens).
    pub fn is_short_field(&self) -> bool {
        matches!(self, FieldKind::Quantity | FieldKind::UnitOfMeasure)
    }

    /// Fields a row must fill to count as complete.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            FieldKind::Description
                | FieldKind::Quantity
                | FieldKind::UnitPrice
                | FieldKind::Amount
        )
    }

    /// Stable lowercase name used in reports and service payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Identifier => "identifier",
            FieldKind::Description => "description",
            FieldKind::Quantity => "quantity",
            FieldKind::UnitOfMeasure => "unit_of_measure",
            FieldKind::UnitPrice => "unit_price",
            FieldKind::Amount => "amount",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A positioned text token produced by the upstream tokenizer.
///
/// Read-only input to the whole pipeline; the engine never mutates token
/// content or coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Token text, exactly as tokenized.
    pub text: Arc<str>,
    /// Left edge of the bounding box.
    pub x0: f32,
    /// Right edge of the bounding box.
    pub x1: f32,
    /// Top edge of the bounding box.
    pub y0: f32,
    /// Bottom edge of the bounding box.
    pub y1: f32,
    /// Zero-based page index.
    pub page_index: usize,
}

impl Token {
    /// Creates a token from text and box coordinates.
    pub fn new(text: impl Into<Arc<str>>, x0: f32, x1: f32, y0: f32, y1: f32, page_index: usize) -> Self {
        Self {
            text: text.into(),
            x0,
            x1,
            y0,
            y1,
            page_index,
        }
    }

    /// Horizontal extent of the token.
    pub fn h_span(&self) -> HSpan {
        HSpan::new(self.x0, self.x1)
    }

    /// Vertical extent of the token.
    pub fn v_span(&self) -> VSpan {
        VSpan::new(self.y0, self.y1)
    }

    /// Vertical center, the merge key for line grouping.
    pub fn v_center(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }
}

/// A column region derived from header tokens. Created once per page by the
/// band locator and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Band {
    /// The field this band represents.
    pub field: FieldKind,
    /// Horizontal extent of the band after halfway extension to neighbors.
    pub span: HSpan,
}

/// A token assigned to a band by the token classifier. Carries a copy of the
/// token's text and extents so each hypothesis can build its own lines
/// without referencing shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedToken {
    /// The band (field) this token belongs to.
    pub field: FieldKind,
    /// Token text.
    pub text: Arc<str>,
    /// Horizontal extent.
    pub h: HSpan,
    /// Vertical extent.
    pub v: VSpan,
}

/// Tokens within one band merged by vertical proximity into one text unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    /// Band this line was built in. Lines never cross bands.
    pub field: FieldKind,
    /// Concatenated text, left-to-right, single-space separated.
    pub text: String,
    /// Horizontal extent (union of member tokens).
    pub h: HSpan,
    /// Vertical extent (union of member tokens).
    pub v: VSpan,
    /// Number of tokens merged into this line.
    pub token_count: usize,
}

/// How aggressively wrapped description lines are pulled into a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescMergePolicy {
    /// Swallow every contiguous description line between the row's left
    /// anchor and its first numeric line.
    Greedy,
    /// Swallow only the first contiguous line unless a later line's vertical
    /// extent overlaps a numeric line already in the row.
    Conservative,
}

impl fmt::Display for DescMergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescMergePolicy::Greedy => f.write_str("greedy"),
            DescMergePolicy::Conservative => f.write_str("conservative"),
        }
    }
}

/// Which neighbor a stranded line between two rows is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrphanPolicy {
    /// Attach to the row above.
    AttachUp,
    /// Attach to the row below.
    AttachDown,
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrphanPolicy::AttachUp => f.write_str("up"),
            OrphanPolicy::AttachDown => f.write_str("down"),
        }
    }
}

/// One combination from the lattice parameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeParams {
    /// Two tokens merge into the same line iff their vertical centers differ
    /// by less than this.
    pub merge_tolerance: f32,
    /// Description merge policy.
    pub desc_policy: DescMergePolicy,
    /// Orphan attachment policy.
    pub orphan_policy: OrphanPolicy,
}

impl LatticeParams {
    /// Stable identifier string for the hypothesis built from these
    /// parameters, e.g. `"t7-conservative-up"`. Also the selector's final
    /// tie-break key, so it must be unique within a page.
    pub fn id(&self) -> String {
        format!(
            "t{}-{}-{}",
            self.merge_tolerance, self.desc_policy, self.orphan_policy
        )
    }
}

/// A cross-band grouping of lines representing one candidate line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    /// Vertical span, the union of every line chosen for this row.
    pub v: VSpan,
    /// Lines per field, in insertion (top-to-bottom) order. A field with
    /// more than one line is expected here; disambiguation happens later.
    pub cells: Vec<(FieldKind, Vec<Line>)>,
    /// True when the row was seeded by an identifier/description anchor.
    pub has_left_anchor: bool,
    /// True when the row was seeded by an amount-shaped anchor.
    pub has_right_anchor: bool,
}

impl Row {
    /// Lines for one field, empty when the field has none.
    pub fn lines(&self, field: FieldKind) -> &[Line] {
        self.cells
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, lines)| lines.as_slice())
            .unwrap_or(&[])
    }

    /// First line's text for one field, if any.
    pub fn first_text(&self, field: FieldKind) -> Option<&str> {
        self.lines(field).first().map(|l| l.text.as_str())
    }

    /// True when every required field has at least one non-empty line.
    pub fn is_complete(&self) -> bool {
        FieldKind::ALL
            .iter()
            .filter(|f| f.is_required())
            .all(|f| self.lines(*f).iter().any(|l| !l.text.trim().is_empty()))
    }
}

/// One complete row segmentation of a page under one parameter combination.
///
/// Hypotheses for a page coexist as an immutable batch; generating one never
/// consults or mutates another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hypothesis {
    /// Stable identifier derived from the parameters.
    pub id: String,
    /// The parameters this hypothesis was generated under.
    pub params: LatticeParams,
    /// Rows ordered top-to-bottom.
    pub rows: Vec<Row>,
    /// Fraction of rows with every required field non-empty.
    pub completeness_rate: f32,
}

impl Hypothesis {
    /// Compact one-line summary for relevance ranking: aggregate shape plus
    /// a preview of the first row's required fields.
    pub fn summary(&self, max_chars: usize) -> String {
        let preview = self
            .rows
            .first()
            .map(|row| {
                FieldKind::ALL
                    .iter()
                    .filter_map(|f| row.first_text(*f))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .unwrap_or_default();
        let head = format!(
            "rows={} complete={:.2} first=[{}]",
            self.rows.len(),
            self.completeness_rate,
            preview
        );
        crate::processors::truncate_chars(&head, max_chars)
    }
}

/// One raw or filtered candidate value for a (row, field) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Candidate text, verbatim from its line.
    pub text: String,
    /// Weak candidates carry evidence but lose to any strong candidate;
    /// for numeric-typed fields they are never frozen at all.
    pub weak: bool,
    /// Relevance score attached by the tie-breaker, when a service call was
    /// made. Comparable only within one (row, field) resolution.
    pub relevance: Option<f32>,
}

impl Candidate {
    /// A regular (strong) candidate.
    pub fn strong(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weak: false,
            relevance: None,
        }
    }

    /// A weak candidate kept as evidence.
    pub fn weak(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weak: true,
            relevance: None,
        }
    }
}

/// Deduplicated, insertion-ordered candidate values for one (row, field)
/// pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateList {
    /// The field being disambiguated.
    pub field: FieldKind,
    /// Candidates in first-occurrence order.
    pub entries: Vec<Candidate>,
}

impl CandidateList {
    /// Creates an empty list for a field.
    pub fn new(field: FieldKind) -> Self {
        Self {
            field,
            entries: Vec::new(),
        }
    }

    /// Appends a candidate unless an entry with identical text exists.
    pub fn push_dedup(&mut self, candidate: Candidate) {
        if !self.entries.iter().any(|c| c.text == candidate.text) {
            self.entries.push(candidate);
        }
    }

    /// Truncates to at most `cap` entries, keeping first-occurrence order.
    pub fn cap(&mut self, cap: usize) {
        self.entries.truncate(cap);
    }

    /// Candidates eligible for freezing. Numeric-typed fields never freeze
    /// weak (last-resort) candidates; short fields may freeze a weak worded
    /// value when nothing stronger exists.
    pub fn eligible(&self) -> Vec<&Candidate> {
        if self.field.is_numeric_typed() {
            self.entries.iter().filter(|c| !c.weak).collect()
        } else {
            self.entries.iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(field: FieldKind, text: &str, top: f32, bottom: f32) -> Line {
        Line {
            field,
            text: text.to_string(),
            h: HSpan::new(0.0, 10.0),
            v: VSpan::new(top, bottom),
            token_count: 1,
        }
    }

    #[test]
    fn field_order_is_canonical() {
        let mut sorted = FieldKind::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, FieldKind::ALL.to_vec());
        assert!(FieldKind::Identifier < FieldKind::Amount);
    }

    #[test]
    fn row_completeness_requires_all_required_fields() {
        let mut row = Row {
            v: VSpan::new(0.0, 10.0),
            cells: vec![
                (FieldKind::Description, vec![line(FieldKind::Description, "Ticket", 0.0, 10.0)]),
                (FieldKind::Quantity, vec![line(FieldKind::Quantity, "1", 0.0, 10.0)]),
                (FieldKind::UnitPrice, vec![line(FieldKind::UnitPrice, "100", 0.0, 10.0)]),
            ],
            has_left_anchor: true,
            has_right_anchor: true,
        };
        assert!(!row.is_complete());

        row.cells
            .push((FieldKind::Amount, vec![line(FieldKind::Amount, "100", 0.0, 10.0)]));
        assert!(row.is_complete());
    }

    #[test]
    fn blank_line_does_not_count_toward_completeness() {
        let row = Row {
            v: VSpan::new(0.0, 10.0),
            cells: vec![
                (FieldKind::Description, vec![line(FieldKind::Description, "  ", 0.0, 10.0)]),
            ],
            has_left_anchor: false,
            has_right_anchor: false,
        };
        assert!(row.lines(FieldKind::Description).len() == 1);
        assert!(!row.is_complete());
    }

    #[test]
    fn candidate_list_dedup_and_cap() {
        let mut list = CandidateList::new(FieldKind::UnitPrice);
        list.push_dedup(Candidate::strong("19.573.311"));
        list.push_dedup(Candidate::strong("Rp 19.573.311"));
        list.push_dedup(Candidate::strong("19.573.311"));
        list.push_dedup(Candidate::strong("20.000"));
        list.push_dedup(Candidate::strong("21.000"));
        assert_eq!(list.entries.len(), 4);

        list.cap(3);
        assert_eq!(list.entries.len(), 3);
        assert_eq!(list.entries[0].text, "19.573.311");
        assert_eq!(list.entries[1].text, "Rp 19.573.311");
    }

    #[test]
    fn weak_candidates_ineligible_for_numeric_fields_only() {
        let mut price = CandidateList::new(FieldKind::UnitPrice);
        price.push_dedup(Candidate::weak("Fifty Rupiah Sub"));
        assert!(price.eligible().is_empty());

        let mut qty = CandidateList::new(FieldKind::Quantity);
        qty.push_dedup(Candidate::weak("two"));
        assert_eq!(qty.eligible().len(), 1);
    }

    #[test]
    fn params_id_is_stable() {
        let params = LatticeParams {
            merge_tolerance: 7.0,
            desc_policy: DescMergePolicy::Conservative,
            orphan_policy: OrphanPolicy::AttachUp,
        };
        assert_eq!(params.id(), "t7-conservative-up");
    }

    #[test]
    fn hypothesis_summary_is_truncated() {
        let hyp = Hypothesis {
            id: "t7-greedy-up".into(),
            params: LatticeParams {
                merge_tolerance: 7.0,
                desc_policy: DescMergePolicy::Greedy,
                orphan_policy: OrphanPolicy::AttachUp,
            },
            rows: vec![],
            completeness_rate: 0.0,
        };
        let s = hyp.summary(20);
        assert!(s.chars().count() <= 20);
        assert!(s.starts_with("rows=0"));
    }
}
