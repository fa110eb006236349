//! Shared processing primitives used across pipeline stages.
//!
//! These are pure functions and value types with no stage-specific state:
//! axis-aligned span math and text shape classifiers.

pub mod geometry;
pub mod shape;

pub use geometry::{HSpan, VSpan};
pub use shape::{is_numeric_shaped, is_pure_digits, is_short_alpha, letter_ratio, truncate_chars};
