//! Core infrastructure: error taxonomy and run configuration.

pub mod config;
pub mod errors;

pub use config::{
    AnomalyThresholds, ExtractionConfig, FieldSpec, LatticeGrid, ParallelPolicy, ScoreWeights,
};
pub use errors::{ExtractError, ProcessingStage};
