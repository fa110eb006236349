//! Core error types for the extraction pipeline.
//!
//! Two kinds of failure exist and must not be conflated:
//!
//! - Document noise (missing header, unmergeable rows, unscorable fields) is
//!   per-page and surfaces as a `PageStatus` on the page report, never as an
//!   `Err` that could abort sibling pages.
//! - Setup defects (malformed weight tables, empty alias lists, bad
//!   parameter grids) are [`ExtractError`]s and fatal to the whole run.

use thiserror::Error;

/// Enum identifying which stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Band location from header tokens.
    BandLocation,
    /// Token-to-band classification.
    TokenClassification,
    /// Hypothesis generation.
    LatticeGeneration,
    /// Hypothesis scoring.
    Scoring,
    /// Hypothesis selection.
    Selection,
    /// Candidate building.
    CandidateBuilding,
    /// Field tie-breaking.
    TieBreaking,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::BandLocation => write!(f, "band location"),
            ProcessingStage::TokenClassification => write!(f, "token classification"),
            ProcessingStage::LatticeGeneration => write!(f, "lattice generation"),
            ProcessingStage::Scoring => write!(f, "scoring"),
            ProcessingStage::Selection => write!(f, "selection"),
            ProcessingStage::CandidateBuilding => write!(f, "candidate building"),
            ProcessingStage::TieBreaking => write!(f, "tie-breaking"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Run-fatal errors of the extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A configuration value is malformed. Always fatal: it indicates a
    /// setup defect rather than document noise.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error occurred during processing that indicates a programming or
    /// setup defect (not document noise).
    #[error("{stage} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        stage: ProcessingStage,
        /// Additional context about the error.
        context: String,
    },

    /// Input artifact could not be read or parsed (CLI surface).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization")]
    Serde(#[from] serde_json::Error),
}

impl ExtractError {
    /// Creates a configuration error with context and details.
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a configuration error for missing required fields.
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!(
                "missing required field '{}' in {}",
                field.into(),
                context.into()
            ),
        }
    }

    /// Creates a configuration error for invalid field values.
    pub fn invalid_field(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ConfigError {
            message: format!(
                "invalid value for field '{}': expected {}, got {}",
                field.into(),
                expected.into(),
                actual.into()
            ),
        }
    }

    /// Wraps a stage-scoped defect.
    pub fn processing(stage: ProcessingStage, context: impl Into<String>) -> Self {
        Self::Processing {
            stage,
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_helpers_format_message() {
        let err = ExtractError::invalid_field("weights.relevance", "a finite value in [0, 1]", "NaN");
        assert!(matches!(err, ExtractError::ConfigError { .. }));
        assert!(err.to_string().contains("weights.relevance"));

        let err = ExtractError::missing_field("aliases", "field 'quantity'");
        assert!(err.to_string().contains("aliases"));
    }

    #[test]
    fn stage_display_is_lowercase_prose() {
        assert_eq!(ProcessingStage::TieBreaking.to_string(), "tie-breaking");
        assert_eq!(ProcessingStage::BandLocation.to_string(), "band location");
    }
}
