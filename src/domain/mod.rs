//! Immutable data model for the row-segmentation engine.
//!
//! Everything here is produced once by a pipeline stage and read thereafter;
//! no type in this module mutates another stage's output.

pub mod report;
pub mod structure;

pub use report::*;
pub use structure::*;
