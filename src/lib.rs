//! # rustscholar
//!
//! Retrieve article metadata (title, authors, year, citation and version
//! counts) from Google Scholar result pages.
//!
//! ## Modules
//!
//! - [`query`] - Structured queries and request URLs
//! - [`fields`] - Swappable field extraction rules
//! - [`parser`] - Result page splitting and parsing
//! - [`paginator`] - The sequential fetch/parse loop
//! - [`article`] - Article records and output formats
//! - [`fetch`] - HTTP page fetching
//! - [`config`] - Upstream constants
//! - [`error`] - Custom error types
//!
//! Runs are sequential and never retry. Callers that issue many queries are
//! responsible for spacing them out.
//!
//! ## Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> rustscholar::Result<()> {
//!     let articles = rustscholar::search(&["edge", "detection"], Some("Marr"), 5).await?;
//!     println!("Found {} results", articles.len());
//!     Ok(())
//! }
//! ```

pub mod article;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fields;
pub mod paginator;
pub mod parser;
pub mod query;

pub use article::{dumps_all, Article, Dump, Fields, Format};
pub use config::ScholarConfig;
pub use error::{Result, ScholarError};
pub use fetch::{Fetcher, HttpFetcher};
pub use fields::{FieldExtractor, FieldSet, FieldValue};
pub use paginator::{AbortHandle, Harvest, Paginator, StopReason};
pub use parser::{BlockLayout, ParsedPage, ResultBlock, ResultParser};
pub use query::{Query, QueryBuilder};

use tracing::warn;

/// Run `query` with the standard layout and field set against `fetcher`.
pub async fn run_query<F: Fetcher>(
    config: &ScholarConfig,
    query: &Query,
    fetcher: F,
) -> Result<Harvest> {
    let parser = ResultParser::scholar(config)?;
    Paginator::new(config, parser, fetcher)?.run(query).await
}

/// Search Google Scholar with default settings.
///
/// Articles gathered before a parse failure on a later page are returned;
/// use [`run_query`] to see why a run stopped.
pub async fn search(
    terms: &[&str],
    author: Option<&str>,
    max_results: usize,
) -> Result<Vec<Article>> {
    let config = ScholarConfig::default();
    let mut query = Query::new(terms).max_results(max_results);
    if let Some(author) = author {
        query = query.author(author);
    }

    let harvest = run_query(&config, &query, HttpFetcher::new(&config)?).await?;
    if let StopReason::Truncated { page, error } = &harvest.stop {
        warn!(page, error = %error, "Results truncated");
    }
    Ok(harvest.into_articles())
}
