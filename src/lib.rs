//! Row segmentation and field disambiguation for positionally-tokenized
//! invoice pages.
//!
//! The engine takes the tokens of a page (text plus bounding box), locks
//! column bands from the header line, generates a lattice of candidate row
//! segmentations under a small parameter grid, scores each hypothesis with
//! a mix of local structure signals and two external scoring services, and
//! resolves every field of the winning segmentation to a frozen verbatim
//! value or an explicit `Unresolved` marker. The output is one
//! [`domain::PageReport`] per page.
//!
//! # Example
//!
//! ```no_run
//! use rowlattice::domain::Token;
//! use rowlattice::pipeline::Extractor;
//!
//! # fn main() -> Result<(), rowlattice::core::errors::ExtractError> {
//! let extractor = Extractor::builder().build()?;
//! let tokens: Vec<Token> = vec![/* from the upstream tokenizer */];
//! let reports = extractor.extract_document(&tokens);
//! for report in &reports {
//!     println!("page {}: {:?}", report.page_index, report.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Pages are independent: a noisy page is excluded or degraded on its own
//! report and never aborts its siblings. Only configuration defects are
//! fatal, raised when the extractor is built.

pub mod core;
pub mod domain;
pub mod pipeline;
pub mod processors;
pub mod services;
pub mod utils;

pub use core::config::ExtractionConfig;
pub use core::errors::ExtractError;
pub use domain::{DocumentSummary, PageReport, PageStatus, Token};
pub use pipeline::{Extractor, ExtractorBuilder};
