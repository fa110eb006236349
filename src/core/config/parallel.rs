//! Shared parallel processing configuration.

use serde::{Deserialize, Serialize};

/// Centralized configuration for parallel processing behavior.
///
/// Pages are independent and hypothesis generation within a page is
/// independent per parameter combination, so both loops can run on rayon.
/// This policy bounds the pool and keeps tiny workloads sequential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use for parallel processing.
    /// If None, rayon will use the default thread pool size.
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Page counts at or below this threshold are processed sequentially.
    /// Default: 2
    #[serde(default = "ParallelPolicy::default_page_threshold")]
    pub page_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Install the global rayon thread pool with the configured number of
    /// threads. Call once at startup before any parallel processing.
    ///
    /// Returns `Ok(true)` when the pool was configured, `Ok(false)` when
    /// `max_threads` is None, and an error when the pool already exists.
    pub fn install_global_thread_pool(&self) -> Result<bool, rayon::ThreadPoolBuildError> {
        if let Some(num_threads) = self.max_threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn default_page_threshold() -> usize {
        2
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            page_threshold: Self::default_page_threshold(),
        }
    }
}
