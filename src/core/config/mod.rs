//! Configuration for the extraction pipeline.
//!
//! One [`ExtractionConfig`] record is loaded per run and passed by reference
//! through every stage; there is no global mutable state, which keeps pages
//! and hypotheses reproducible under parallel execution. Validation failures
//! are fatal to the run (setup defects, not document noise).

pub mod parallel;

pub use parallel::ParallelPolicy;

use crate::core::errors::ExtractError;
use crate::domain::{DescMergePolicy, FieldKind, LatticeParams, OrphanPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One expected field and the closed list of header alias strings that
/// identify its column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    /// Which field this is.
    pub kind: FieldKind,
    /// Header aliases, matched case-insensitively. Single- and two-token
    /// header cells are both supported ("unit price").
    pub aliases: Vec<String>,
}

/// Weights for the hypothesis score combination.
///
/// `final = relevance*w1 + completeness*w2 + type_fit*w3 - anomaly*w4`.
/// When a service signal is unavailable its contribution is zero and the
/// weights are NOT renormalized (documented degraded mode).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the relevance-service signal. Default 0.6.
    #[serde(default = "ScoreWeights::default_relevance")]
    pub relevance: f32,
    /// Weight of the completeness rate. Default 0.2.
    #[serde(default = "ScoreWeights::default_completeness")]
    pub completeness: f32,
    /// Weight of the similarity-service type fit. Default 0.15.
    #[serde(default = "ScoreWeights::default_type_fit")]
    pub type_fit: f32,
    /// Penalty weight of the anomaly rate. Default 0.05.
    #[serde(default = "ScoreWeights::default_anomaly")]
    pub anomaly: f32,
}

impl ScoreWeights {
    fn default_relevance() -> f32 {
        0.6
    }
    fn default_completeness() -> f32 {
        0.2
    }
    fn default_type_fit() -> f32 {
        0.15
    }
    fn default_anomaly() -> f32 {
        0.05
    }

    fn validate(&self) -> Result<(), ExtractError> {
        for (name, w) in [
            ("weights.relevance", self.relevance),
            ("weights.completeness", self.completeness),
            ("weights.type_fit", self.type_fit),
            ("weights.anomaly", self.anomaly),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(ExtractError::invalid_field(
                    name,
                    "a finite value in [0, 1]",
                    format!("{w}"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance: Self::default_relevance(),
            completeness: Self::default_completeness(),
            type_fit: Self::default_type_fit(),
            anomaly: Self::default_anomaly(),
        }
    }
}

/// Parameter grid and merge thresholds for the lattice generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatticeGrid {
    /// Vertical-merge tolerance levels; one hypothesis family per level.
    /// Default: [4.0, 7.0, 10.0].
    #[serde(default = "LatticeGrid::default_merge_tolerances")]
    pub merge_tolerances: Vec<f32>,
    /// Description-merge policies to try. Default: both.
    #[serde(default = "LatticeGrid::default_desc_policies")]
    pub desc_policies: Vec<DescMergePolicy>,
    /// Orphan-attachment policies to try. Default: both.
    #[serde(default = "LatticeGrid::default_orphan_policies")]
    pub orphan_policies: Vec<OrphanPolicy>,
    /// Bounded vertical window for pairing left and right anchors.
    /// Default: 12.0.
    #[serde(default = "LatticeGrid::default_anchor_window")]
    pub anchor_window: f32,
    /// Maximum distance at which a stranded line attaches to a neighbor row.
    /// Default: 6.0.
    #[serde(default = "LatticeGrid::default_orphan_buffer")]
    pub orphan_buffer: f32,
    /// Tolerated overlap between adjacent rows before a hypothesis is
    /// rejected as non-monotonic. Default: 2.0.
    #[serde(default = "LatticeGrid::default_row_overlap_tolerance")]
    pub row_overlap_tolerance: f32,
    /// Conservative policy: a later description line joins only when it
    /// overlaps a numeric line already in the row by at least this fraction
    /// of the shorter extent. Default: 0.5.
    #[serde(default = "LatticeGrid::default_desc_overlap_ratio")]
    pub desc_overlap_ratio: f32,
}

impl LatticeGrid {
    fn default_merge_tolerances() -> Vec<f32> {
        vec![4.0, 7.0, 10.0]
    }
    fn default_desc_policies() -> Vec<DescMergePolicy> {
        vec![DescMergePolicy::Greedy, DescMergePolicy::Conservative]
    }
    fn default_orphan_policies() -> Vec<OrphanPolicy> {
        vec![OrphanPolicy::AttachUp, OrphanPolicy::AttachDown]
    }
    fn default_anchor_window() -> f32 {
        12.0
    }
    fn default_orphan_buffer() -> f32 {
        6.0
    }
    fn default_row_overlap_tolerance() -> f32 {
        2.0
    }
    fn default_desc_overlap_ratio() -> f32 {
        0.5
    }

    /// Enumerates the Cartesian parameter grid in a stable order.
    pub fn combinations(&self) -> Vec<LatticeParams> {
        let mut params = Vec::new();
        for &merge_tolerance in &self.merge_tolerances {
            for &desc_policy in &self.desc_policies {
                for &orphan_policy in &self.orphan_policies {
                    params.push(LatticeParams {
                        merge_tolerance,
                        desc_policy,
                        orphan_policy,
                    });
                }
            }
        }
        params
    }

    fn validate(&self) -> Result<(), ExtractError> {
        if self.merge_tolerances.is_empty() {
            return Err(ExtractError::missing_field(
                "merge_tolerances",
                "lattice grid",
            ));
        }
        if self.merge_tolerances.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(ExtractError::invalid_field(
                "grid.merge_tolerances",
                "finite positive tolerances",
                format!("{:?}", self.merge_tolerances),
            ));
        }
        if self.desc_policies.is_empty() || self.orphan_policies.is_empty() {
            return Err(ExtractError::config_error_detailed(
                "lattice grid",
                "desc_policies and orphan_policies must each list at least one policy",
            ));
        }
        if !(0.0..=1.0).contains(&self.desc_overlap_ratio) {
            return Err(ExtractError::invalid_field(
                "grid.desc_overlap_ratio",
                "a value in [0, 1]",
                format!("{}", self.desc_overlap_ratio),
            ));
        }
        Ok(())
    }
}

impl Default for LatticeGrid {
    fn default() -> Self {
        Self {
            merge_tolerances: Self::default_merge_tolerances(),
            desc_policies: Self::default_desc_policies(),
            orphan_policies: Self::default_orphan_policies(),
            anchor_window: Self::default_anchor_window(),
            orphan_buffer: Self::default_orphan_buffer(),
            row_overlap_tolerance: Self::default_row_overlap_tolerance(),
            desc_overlap_ratio: Self::default_desc_overlap_ratio(),
        }
    }
}

/// Shape-anomaly thresholds. The source heuristics are informal, so these
/// are configuration rather than constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnomalyThresholds {
    /// A numeric-typed field value is anomalous when its letter ratio
    /// exceeds this. Default: 0.3.
    #[serde(default = "AnomalyThresholds::default_letter_ratio")]
    pub letter_ratio: f32,
    /// A short field (quantity, unit) is anomalous past this token count.
    /// Default: 4.
    #[serde(default = "AnomalyThresholds::default_short_field_max_tokens")]
    pub short_field_max_tokens: usize,
    /// Maximum character count for a unit-of-measure candidate. Default: 10.
    #[serde(default = "AnomalyThresholds::default_unit_max_chars")]
    pub unit_max_chars: usize,
}

impl AnomalyThresholds {
    fn default_letter_ratio() -> f32 {
        0.3
    }
    fn default_short_field_max_tokens() -> usize {
        4
    }
    fn default_unit_max_chars() -> usize {
        10
    }
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            letter_ratio: Self::default_letter_ratio(),
            short_field_max_tokens: Self::default_short_field_max_tokens(),
            unit_max_chars: Self::default_unit_max_chars(),
        }
    }
}

/// The configuration record for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionConfig {
    /// Expected fields with their header aliases, left-to-right.
    #[serde(default = "ExtractionConfig::default_fields")]
    pub fields: Vec<FieldSpec>,
    /// Minimum header alias matches required to lock bands. When absent,
    /// a majority of the expected fields is required.
    #[serde(default)]
    pub min_header_matches: Option<usize>,
    /// Vertical tolerance when grouping header tokens into candidate header
    /// lines. Default: 5.0.
    #[serde(default = "ExtractionConfig::default_header_line_tolerance")]
    pub header_line_tolerance: f32,
    /// Lattice parameter grid.
    #[serde(default)]
    pub grid: LatticeGrid,
    /// Score combination weights.
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Anomaly thresholds.
    #[serde(default)]
    pub anomaly: AnomalyThresholds,
    /// CandidateList cap after filtering. Default: 3.
    #[serde(default = "ExtractionConfig::default_candidate_cap")]
    pub candidate_cap: usize,
    /// Fixed semantic prototypes per field for the similarity service.
    #[serde(default = "ExtractionConfig::default_prototypes")]
    pub prototypes: BTreeMap<FieldKind, Vec<String>>,
    /// Instruction given to the relevance service when ranking hypothesis
    /// summaries for one page.
    #[serde(default = "ExtractionConfig::default_page_instruction")]
    pub page_instruction: String,
    /// Maximum characters of row context embedded in a tie-break query.
    /// Default: 120.
    #[serde(default = "ExtractionConfig::default_context_max_chars")]
    pub context_max_chars: usize,
    /// Maximum characters of a hypothesis summary sent for ranking.
    /// Default: 200.
    #[serde(default = "ExtractionConfig::default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Bounded timeout for external service calls, in milliseconds.
    /// Default: 10_000.
    #[serde(default = "ExtractionConfig::default_service_timeout_ms")]
    pub service_timeout_ms: u64,
    /// Version tag stamped into every page report so reruns with different
    /// configuration never silently mix with prior artifacts.
    #[serde(default = "ExtractionConfig::default_config_version")]
    pub config_version: String,
    /// Parallelism policy.
    #[serde(default)]
    pub parallel: ParallelPolicy,
}

impl ExtractionConfig {
    fn default_fields() -> Vec<FieldSpec> {
        let alias = |kind: FieldKind, names: &[&str]| FieldSpec {
            kind,
            aliases: names.iter().map(|s| s.to_string()).collect(),
        };
        vec![
            alias(FieldKind::Identifier, &["no", "no.", "item", "code", "sku", "#"]),
            alias(
                FieldKind::Description,
                &["description", "item description", "details", "particulars"],
            ),
            alias(FieldKind::Quantity, &["qty", "qty.", "quantity", "jml"]),
            alias(FieldKind::UnitOfMeasure, &["uom", "unit", "units", "satuan"]),
            alias(
                FieldKind::UnitPrice,
                &["unit price", "price", "rate", "harga", "unit cost"],
            ),
            alias(
                FieldKind::Amount,
                &["amount", "total", "line total", "subtotal", "jumlah"],
            ),
        ]
    }

    fn default_header_line_tolerance() -> f32 {
        5.0
    }

    fn default_candidate_cap() -> usize {
        3
    }

    fn default_prototypes() -> BTreeMap<FieldKind, Vec<String>> {
        let protos = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        BTreeMap::from([
            (FieldKind::Quantity, protos(&["1", "2", "10", "3 pcs"])),
            (
                FieldKind::UnitOfMeasure,
                protos(&["pcs", "kg", "PAX", "hours", "unit"]),
            ),
            (
                FieldKind::UnitPrice,
                protos(&["19,573,311", "1,250.00", "15.00"]),
            ),
            (
                FieldKind::Amount,
                protos(&["117,439,866", "2,500.00", "30.00"]),
            ),
        ])
    }

    fn default_page_instruction() -> String {
        "Rank these candidate row segmentations of an invoice page by how well \
         they read as a coherent list of line items."
            .to_string()
    }

    fn default_context_max_chars() -> usize {
        120
    }

    fn default_summary_max_chars() -> usize {
        200
    }

    fn default_service_timeout_ms() -> u64 {
        10_000
    }

    fn default_config_version() -> String {
        "v1".to_string()
    }

    /// Minimum header matches in effect: the configured value, or a
    /// majority of the expected fields.
    pub fn effective_min_header_matches(&self) -> usize {
        self.min_header_matches
            .unwrap_or(self.fields.len() / 2 + 1)
    }

    /// Alias list for one field, empty when the field is not configured.
    pub fn aliases(&self, field: FieldKind) -> &[String] {
        self.fields
            .iter()
            .find(|spec| spec.kind == field)
            .map(|spec| spec.aliases.as_slice())
            .unwrap_or(&[])
    }

    /// Validates the whole record. Any failure is fatal to the run.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.fields.is_empty() {
            return Err(ExtractError::missing_field("fields", "extraction config"));
        }
        for spec in &self.fields {
            if spec.aliases.is_empty() {
                return Err(ExtractError::missing_field(
                    "aliases",
                    format!("field '{}'", spec.kind),
                ));
            }
        }
        let mut kinds: Vec<FieldKind> = self.fields.iter().map(|s| s.kind).collect();
        kinds.sort();
        kinds.dedup();
        if kinds.len() != self.fields.len() {
            return Err(ExtractError::config_error_detailed(
                "extraction config",
                "duplicate field kinds in `fields`",
            ));
        }
        if let Some(min) = self.min_header_matches
            && (min == 0 || min > self.fields.len())
        {
            return Err(ExtractError::invalid_field(
                "min_header_matches",
                format!("a value in [1, {}]", self.fields.len()),
                format!("{min}"),
            ));
        }
        if self.candidate_cap == 0 {
            return Err(ExtractError::invalid_field(
                "candidate_cap",
                "at least 1",
                "0",
            ));
        }
        self.weights.validate()?;
        self.grid.validate()?;
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fields: Self::default_fields(),
            min_header_matches: None,
            header_line_tolerance: Self::default_header_line_tolerance(),
            grid: LatticeGrid::default(),
            weights: ScoreWeights::default(),
            anomaly: AnomalyThresholds::default(),
            candidate_cap: Self::default_candidate_cap(),
            prototypes: Self::default_prototypes(),
            page_instruction: Self::default_page_instruction(),
            context_max_chars: Self::default_context_max_chars(),
            summary_max_chars: Self::default_summary_max_chars(),
            service_timeout_ms: Self::default_service_timeout_ms(),
            config_version: Self::default_config_version(),
            parallel: ParallelPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExtractionConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.effective_min_header_matches(), 4); // majority of 6
        assert_eq!(config.grid.combinations().len(), 12); // 3 x 2 x 2
    }

    #[test]
    fn grid_combinations_are_stably_ordered() {
        let grid = LatticeGrid::default();
        let ids: Vec<String> = grid.combinations().iter().map(|p| p.id()).collect();
        assert_eq!(ids[0], "t4-greedy-up");
        assert_eq!(ids[1], "t4-greedy-down");
        assert_eq!(ids[2], "t4-conservative-up");
        assert_eq!(ids.last().unwrap(), "t10-conservative-down");
        let mut dedup = ids.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), ids.len());
    }

    #[test]
    fn nan_weight_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.weights.relevance = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.weights.anomaly = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_alias_list_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.fields[2].aliases.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn duplicate_field_kind_is_rejected() {
        let mut config = ExtractionConfig::default();
        let dup = config.fields[0].clone();
        config.fields.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_min_header_matches_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.min_header_matches = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_tolerance_grid_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.grid.merge_tolerances.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ExtractionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExtractionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"config_version": "vendor-a-v2"}"#).unwrap();
        assert_eq!(config.config_version, "vendor-a-v2");
        assert_eq!(config.candidate_cap, 3);
        assert!(!config.fields.is_empty());
    }
}
