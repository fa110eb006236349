//! The extraction driver: runs every stage for a page and assembles the
//! page report.
//!
//! Page outcomes never cross-contaminate: a page that fails to produce
//! bands or hypotheses is excluded with a reason while its siblings proceed,
//! and a degraded service affects only the signals documented for degraded
//! mode. The only fatal errors at this level are configuration defects,
//! raised at build time.

use crate::core::config::ExtractionConfig;
use crate::core::errors::ExtractError;
use crate::domain::{DocumentSummary, PageReport, PageStatus, Token};
use crate::pipeline::bands::{classify_tokens, locate_bands};
use crate::pipeline::lattice::generate_all;
use crate::pipeline::scoring::{score_page, select};
use crate::pipeline::tiebreak::resolve_rows;
use crate::services::stub::{UnavailableRanker, UnavailableSimilarity};
use crate::services::{RelevanceRanker, SimilarityScorer};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for [`Extractor`]. Service adapters default to the unavailable
/// stubs, so an extractor without endpoints runs fully degraded rather than
/// failing.
#[derive(Debug, Default)]
pub struct ExtractorBuilder {
    config: ExtractionConfig,
    similarity: Option<Arc<dyn SimilarityScorer>>,
    ranker: Option<Arc<dyn RelevanceRanker>>,
}

impl ExtractorBuilder {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration record.
    pub fn config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Injects the semantic-similarity adapter.
    pub fn similarity(mut self, similarity: Arc<dyn SimilarityScorer>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Injects the relevance-ranking adapter.
    pub fn ranker(mut self, ranker: Arc<dyn RelevanceRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Validates the configuration and builds the extractor. Configuration
    /// defects are fatal here, before any page is touched.
    pub fn build(self) -> Result<Extractor, ExtractError> {
        self.config.validate()?;
        Ok(Extractor {
            config: self.config,
            similarity: self
                .similarity
                .unwrap_or_else(|| Arc::new(UnavailableSimilarity)),
            ranker: self.ranker.unwrap_or_else(|| Arc::new(UnavailableRanker)),
        })
    }
}

/// The configured extraction pipeline.
#[derive(Debug)]
pub struct Extractor {
    config: ExtractionConfig,
    similarity: Arc<dyn SimilarityScorer>,
    ranker: Arc<dyn RelevanceRanker>,
}

impl Extractor {
    /// Entry point for configuration.
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Runs the full pipeline for one page of tokens.
    pub fn extract_page(&self, page_index: usize, tokens: &[Token]) -> PageReport {
        let version = self.config.config_version.as_str();

        let Some(layout) = locate_bands(tokens, &self.config) else {
            tracing::info!(target: "extractor", page = page_index, "excluding page: no bands");
            return PageReport::excluded(page_index, version, "no-bands");
        };
        let banded = classify_tokens(tokens, &layout);

        let hypotheses = generate_all(&banded, &self.config);
        if hypotheses.is_empty() {
            tracing::info!(target: "extractor", page = page_index, "excluding page: no hypotheses");
            return PageReport::excluded(page_index, version, "no-hypotheses");
        }
        tracing::debug!(
            target: "extractor",
            page = page_index,
            hypotheses = hypotheses.len(),
            "scoring hypothesis batch"
        );

        let outcome = score_page(
            hypotheses,
            &self.config,
            self.similarity.as_ref(),
            self.ranker.as_ref(),
        );
        let mut degraded = outcome.degraded;
        let mut reasons = outcome.reasons.clone();

        let Some(selection) = select(outcome) else {
            return PageReport::excluded(page_index, version, "no-hypotheses");
        };

        let resolution = resolve_rows(&selection.chosen.hypothesis.rows, &self.config, self.ranker.as_ref());
        degraded |= resolution.degraded;
        reasons.extend(resolution.reasons);

        let status = if degraded {
            PageStatus::Degraded
        } else {
            PageStatus::Ok
        };
        tracing::info!(
            target: "extractor",
            page = page_index,
            chosen = %selection.chosen.hypothesis.id,
            rows = resolution.rows.len(),
            ?status,
            "page extracted"
        );

        PageReport {
            page_index,
            status,
            reason: (!reasons.is_empty()).then(|| reasons.join("; ")),
            config_version: version.to_string(),
            chosen: Some(selection.chosen.ranked()),
            alternates: selection.alternates,
            rows: resolution.rows,
            tie_breaks: resolution.records,
        }
    }

    /// Runs the pipeline for a whole document. Tokens are grouped by their
    /// `page_index`; pages run in parallel above the configured threshold.
    /// Reports come back ordered by page index.
    pub fn extract_document(&self, tokens: &[Token]) -> Vec<PageReport> {
        let mut pages: BTreeMap<usize, Vec<Token>> = BTreeMap::new();
        for token in tokens {
            pages.entry(token.page_index).or_default().push(token.clone());
        }
        let pages: Vec<(usize, Vec<Token>)> = pages.into_iter().collect();

        let reports: Vec<PageReport> = if pages.len() > self.config.parallel.page_threshold {
            pages
                .par_iter()
                .map(|(index, tokens)| self.extract_page(*index, tokens))
                .collect()
        } else {
            pages
                .iter()
                .map(|(index, tokens)| self.extract_page(*index, tokens))
                .collect()
        };

        let summary = DocumentSummary::from_reports(&reports);
        tracing::info!(
            target: "extractor",
            ok = summary.ok,
            degraded = summary.degraded,
            excluded = summary.excluded,
            "document extracted"
        );
        reports
    }
}
