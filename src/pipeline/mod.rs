//! The extraction pipeline, stage by stage.
//!
//! Data flows one way: tokens → bands → banded tokens → hypotheses →
//! scored batch → winner → candidate lists → resolved rows → page report.
//! Earlier artifacts are never revisited once a stage has consumed them.

pub mod bands;
pub mod candidates;
pub mod extractor;
pub mod lattice;
pub mod scoring;
pub mod tiebreak;

pub use bands::{BandLayout, classify_tokens, locate_bands};
pub use candidates::{build_candidates, build_row_candidates};
pub use extractor::{Extractor, ExtractorBuilder};
pub use lattice::{generate, generate_all, respects_bands};
pub use scoring::{ScoredHypothesis, ScoringOutcome, Selection, score_page, select};
pub use tiebreak::{TieBreakOutcome, resolve_rows};
