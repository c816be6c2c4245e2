//! rustscholar - Google Scholar article metadata on the command line
//!
//! ## Usage
//!
//! ```bash
//! rustscholar --max-results 1 --encoding json --file articles.json --author Marr theory of edge detection
//! ```
//!
//! Invalid queries, network failures and configuration errors exit non-zero.
//! A run cut short by an unreadable later page still writes what it found,
//! exits zero and reports the truncation on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use rustscholar::{
    dumps_all, AbortHandle, Format, HttpFetcher, Paginator, Query, ResultParser, ScholarConfig,
    StopReason,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Retrieve article information from Google Scholar
#[derive(Parser)]
#[command(name = "rustscholar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Search terms
    #[arg(required_unless_present = "author")]
    search_terms: Vec<String>,

    /// Author name
    #[arg(short, long)]
    author: Option<String>,

    /// Maximum results to return
    #[arg(short, long, default_value_t = rustscholar::query::DEFAULT_MAX_RESULTS)]
    max_results: usize,

    /// Output encoding: json, binary, mapping (dict) or csv
    #[arg(short, long, default_value = "json")]
    encoding: Format,

    /// Write the results to file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Year filter (results from this year onwards)
    #[arg(long)]
    ylo: Option<i32>,

    /// Year filter (results up to this year)
    #[arg(long)]
    yhi: Option<i32>,

    /// JSON config file overriding upstream settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror site URL
    #[arg(long)]
    mirror: Option<String>,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    proxy: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries encoded results
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let query = Query::new(&cli.search_terms)
        .author(cli.author.as_deref().unwrap_or_default())
        .years(cli.ylo, cli.yhi)
        .max_results(cli.max_results);

    let abort = AbortHandle::new();
    let signal_abort = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current page");
            signal_abort.abort();
        }
    });

    let parser = ResultParser::scholar(&config)?;
    let fetcher = HttpFetcher::new(&config)?;
    let paginator = Paginator::new(&config, parser, fetcher)?.with_abort(abort);

    let harvest = paginator.run(&query).await.context("Search failed")?;

    match &harvest.stop {
        StopReason::NoResults => info!("No results found"),
        StopReason::Cancelled => {
            warn!(count = harvest.articles.len(), "Run cancelled, writing partial results")
        }
        StopReason::Truncated { page, error } => {
            eprintln!(
                "warning: results truncated, page {} could not be parsed: {}",
                page + 1,
                error
            );
        }
        StopReason::MaxResults | StopReason::Exhausted => {}
    }

    let output = dumps_all(&harvest.articles, cli.encoding)?.into_bytes();
    write_output(cli.file.as_ref(), &output)?;

    info!(count = harvest.articles.len(), fetches = harvest.fetches, "Done");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ScholarConfig> {
    let mut config = match &cli.config {
        Some(path) => ScholarConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScholarConfig::default(),
    };

    if let Some(mirror) = &cli.mirror {
        config.base_url = mirror.clone();
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy = Some(proxy.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn write_output(file: Option<&PathBuf>, output: &[u8]) -> Result<()> {
    match file {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Results written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
