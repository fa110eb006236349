//! rowlattice CLI
//!
//! Extracts line-item rows from a tokenized document and prints the page
//! reports as JSON.
//!
//! # Usage
//!
//! ```bash
//! rowlattice-cli extract --tokens page_tokens.json --pretty
//! rowlattice-cli extract --tokens page_tokens.json --config run.json \
//!     --similarity-url http://localhost:8801/similarity \
//!     --ranker-url http://localhost:8802/rank
//! rowlattice-cli validate-config --config run.json
//! ```

use clap::{Parser, Subcommand};
use rowlattice::core::config::ExtractionConfig;
use rowlattice::core::errors::ExtractError;
use rowlattice::domain::{DocumentSummary, Token};
use rowlattice::pipeline::Extractor;
use rowlattice::services::{HttpRelevanceRanker, HttpSimilarityScorer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rowlattice-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Row segmentation and field disambiguation for tokenized documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract line-item rows from a token file
    Extract {
        /// JSON file holding the document's tokens (array of
        /// {text, x0, x1, y0, y1, page_index})
        #[arg(long)]
        tokens: PathBuf,

        /// Optional configuration file; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Endpoint of the semantic-similarity service
        #[arg(long = "similarity-url", env = "ROWLATTICE_SIMILARITY_URL")]
        similarity_url: Option<String>,

        /// Endpoint of the relevance-ranking service
        #[arg(long = "ranker-url", env = "ROWLATTICE_RANKER_URL")]
        ranker_url: Option<String>,

        /// Write the reports here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a configuration file without running an extraction
    ValidateConfig {
        /// Configuration file to check
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    rowlattice::utils::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            tokens,
            config,
            similarity_url,
            ranker_url,
            output,
            pretty,
        } => run_extract(
            &tokens,
            config.as_deref(),
            similarity_url,
            ranker_url,
            output.as_deref(),
            pretty,
        ),
        Commands::ValidateConfig { config } => run_validate(&config),
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ExtractionConfig, ExtractError> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            let config: ExtractionConfig = serde_json::from_str(&raw)?;
            Ok(config)
        }
        None => Ok(ExtractionConfig::default()),
    }
}

fn run_extract(
    tokens_path: &Path,
    config_path: Option<&Path>,
    similarity_url: Option<String>,
    ranker_url: Option<String>,
    output: Option<&Path>,
    pretty: bool,
) -> Result<(), ExtractError> {
    let config = load_config(config_path)?;
    if let Err(error) = config.parallel.install_global_thread_pool() {
        return Err(ExtractError::ConfigError {
            message: format!("thread pool setup failed: {error}"),
        });
    }

    let raw = fs::read_to_string(tokens_path)?;
    let tokens: Vec<Token> = serde_json::from_str(&raw).map_err(|e| ExtractError::InvalidInput {
        message: format!("{}: {e}", tokens_path.display()),
    })?;
    info!(tokens = tokens.len(), "loaded token file");

    let timeout_ms = config.service_timeout_ms;
    let mut builder = Extractor::builder().config(config);
    if let Some(url) = similarity_url {
        let scorer = HttpSimilarityScorer::new(url, timeout_ms).map_err(|e| {
            ExtractError::ConfigError {
                message: format!("similarity client: {e}"),
            }
        })?;
        builder = builder.similarity(Arc::new(scorer));
    }
    if let Some(url) = ranker_url {
        let ranker = HttpRelevanceRanker::new(url, timeout_ms).map_err(|e| {
            ExtractError::ConfigError {
                message: format!("ranker client: {e}"),
            }
        })?;
        builder = builder.ranker(Arc::new(ranker));
    }
    let extractor = builder.build()?;

    let reports = extractor.extract_document(&tokens);
    let summary = DocumentSummary::from_reports(&reports);
    info!(
        ok = summary.ok,
        degraded = summary.degraded,
        excluded = summary.excluded,
        "extraction finished"
    );

    let rendered = if pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    match output {
        Some(path) => fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), ExtractError> {
    let config = load_config(Some(config_path))?;
    config.validate()?;
    println!(
        "{} is valid (version {})",
        config_path.display(),
        config.config_version
    );
    Ok(())
}
