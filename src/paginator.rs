//! The fetch/parse loop.
//!
//! Pages are fetched strictly one after another so that upstream ranking
//! order is preserved and only one request is ever in flight. The loop stops
//! at the first of: enough articles, no next page, a cancelled
//! [`AbortHandle`], or a parse failure after the first page (in which case
//! the articles gathered so far are returned together with the error).

use crate::article::Article;
use crate::config::ScholarConfig;
use crate::error::{Result, ScholarError};
use crate::fetch::Fetcher;
use crate::parser::ResultParser;
use crate::query::{Query, QueryBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared flag a caller can set to stop a run between pages.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run stopped.
#[derive(Debug)]
pub enum StopReason {
    /// `max_results` articles were collected
    MaxResults,
    /// The upstream has no further pages (or the page limit was reached)
    Exhausted,
    /// The first page had no results at all
    NoResults,
    /// The abort handle was triggered
    Cancelled,
    /// A later page could not be parsed; earlier articles are kept
    Truncated {
        /// Zero-based page that failed
        page: usize,
        error: ScholarError,
    },
}

/// Outcome of a run.
#[derive(Debug)]
pub struct Harvest {
    /// Articles in upstream ranking order
    pub articles: Vec<Article>,
    /// Number of pages fetched
    pub fetches: usize,
    pub stop: StopReason,
}

impl Harvest {
    /// True if a parse failure cut the run short
    pub fn is_truncated(&self) -> bool {
        matches!(self.stop, StopReason::Truncated { .. })
    }

    pub fn into_articles(self) -> Vec<Article> {
        self.articles
    }
}

/// Drives query building, fetching and parsing across result pages.
#[derive(Debug)]
pub struct Paginator<F> {
    builder: QueryBuilder,
    parser: ResultParser,
    fetcher: F,
    max_pages: usize,
    abort: Option<AbortHandle>,
}

impl<F: Fetcher> Paginator<F> {
    pub fn new(config: &ScholarConfig, parser: ResultParser, fetcher: F) -> Result<Self> {
        Ok(Self {
            builder: QueryBuilder::new(config)?,
            parser,
            fetcher,
            max_pages: config.max_pages,
            abort: None,
        })
    }

    /// Check `handle` before each page
    pub fn with_abort(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_aborted)
    }

    /// Run `query` to completion. Every call starts again from the first page.
    ///
    /// # Errors
    ///
    /// Invalid queries fail before any fetch. Network errors are returned
    /// unchanged from whichever page they occur on. A parse error on the
    /// first page is returned as an error; on later pages it ends the run
    /// with [`StopReason::Truncated`].
    pub async fn run(&self, query: &Query) -> Result<Harvest> {
        query.validate()?;

        info!(
            query = %query.search_text(),
            max_results = query.max_results,
            "Starting scholar query"
        );

        let mut articles = Vec::new();
        let mut fetches = 0;
        let mut page = 0;

        let stop = loop {
            if self.aborted() {
                info!(page, collected = articles.len(), "Run cancelled");
                break StopReason::Cancelled;
            }
            if page >= self.max_pages {
                warn!(page, "Page limit reached");
                break StopReason::Exhausted;
            }

            let url = self.builder.build(query, page)?;
            debug!(page, url = %url, "Fetching page");
            let fetched = self.fetcher.fetch(&url).await;
            fetches += 1;

            // Non-HTML bodies surface from the fetcher as parse errors too
            let parsed = match fetched.and_then(|html| self.parser.parse(&html)) {
                Ok(parsed) => parsed,
                Err(error) if error.is_parse() && page > 0 => {
                    warn!(page, error = %error, "Parse failed, returning partial results");
                    break StopReason::Truncated { page, error };
                }
                Err(error) => return Err(error),
            };

            if parsed.articles.is_empty() {
                break if page == 0 {
                    StopReason::NoResults
                } else {
                    StopReason::Exhausted
                };
            }

            let remaining = query.max_results - articles.len();
            articles.extend(parsed.articles.into_iter().take(remaining));

            if articles.len() >= query.max_results {
                break StopReason::MaxResults;
            }
            if !parsed.has_next_page {
                break StopReason::Exhausted;
            }
            page += 1;
        };

        info!(total = articles.len(), fetches, stop = ?stop, "Query complete");
        Ok(Harvest {
            articles,
            fetches,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;

    /// One scripted response.
    enum Canned {
        Page(String),
        /// A body that is not HTML, as the HTTP fetcher reports it
        NotHtml,
        /// The upstream answers 503
        Unavailable,
    }

    /// Serves canned pages in order and records requested URLs.
    struct CannedFetcher {
        pages: Vec<Canned>,
        requested: Mutex<Vec<Url>>,
    }

    impl CannedFetcher {
        fn new(pages: Vec<Canned>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requested.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    impl Fetcher for CannedFetcher {
        async fn fetch(&self, url: &Url) -> Result<String> {
            let index = {
                let mut requested = self.requested.lock().map_err(|_| {
                    ScholarError::Parse("poisoned fetch log".to_string())
                })?;
                requested.push(url.clone());
                requested.len() - 1
            };
            match self.pages.get(index) {
                Some(Canned::Page(html)) => Ok(html.clone()),
                Some(Canned::NotHtml) => Err(ScholarError::Parse(
                    "expected an HTML page, got 'application/json'".to_string(),
                )),
                Some(Canned::Unavailable) => Err(ScholarError::Http {
                    status: 503,
                    url: url.to_string(),
                }),
                None => Ok(page(0, 0, false)),
            }
        }
    }

    fn page(first: usize, count: usize, next: bool) -> String {
        let entries: String = (first..first + count)
            .map(|i| {
                format!(
                    r#"<div class="gs_r gs_or gs_scl"><h3 class="gs_rt">Paper {}</h3>
                       <div class="gs_a">X Author - Venue, 2001 - host</div></div>"#,
                    i
                )
            })
            .collect();
        let nav = if next {
            r#"<div id="gs_n"><a href="/next"><span class="gs_ico_nav_next"></span></a></div>"#
        } else {
            ""
        };
        format!(
            r#"<html><body><div id="gs_res_ccl_mid">{}</div>{}</body></html>"#,
            entries, nav
        )
    }

    fn paginator(pages: Vec<Canned>) -> Paginator<CannedFetcher> {
        let config = ScholarConfig::default();
        let parser = ResultParser::scholar(&config).expect("standard parser");
        Paginator::new(&config, parser, CannedFetcher::new(pages)).expect("valid config")
    }

    fn titles(harvest: &Harvest) -> Vec<String> {
        harvest
            .articles
            .iter()
            .filter_map(|a| a.title().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_stops_at_max_results() -> Result<()> {
        let p = paginator(vec![
            Canned::Page(page(0, 10, true)),
            Canned::Page(page(10, 10, true)),
            Canned::Page(page(20, 10, true)),
        ]);
        let harvest = p.run(&Query::new(["optics"]).max_results(15)).await?;

        assert_eq!(harvest.articles.len(), 15);
        assert_eq!(harvest.fetches, 2);
        assert_eq!(p.fetcher().calls(), 2);
        assert!(matches!(harvest.stop, StopReason::MaxResults));
        assert_eq!(titles(&harvest)[14], "Paper 14");
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_returns_everything() -> Result<()> {
        let p = paginator(vec![
            Canned::Page(page(0, 10, true)),
            Canned::Page(page(10, 4, false)),
        ]);
        let harvest = p.run(&Query::new(["optics"]).max_results(50)).await?;

        assert_eq!(harvest.articles.len(), 14);
        assert!(matches!(harvest.stop, StopReason::Exhausted));

        let requested = p.fetcher().requested.lock().map_err(|_| {
            ScholarError::Parse("poisoned".to_string())
        })?;
        assert!(requested[0].as_str().contains("start=0"));
        assert!(requested[1].as_str().contains("start=10"));
        Ok(())
    }

    #[tokio::test]
    async fn test_single_page_without_next() -> Result<()> {
        let p = paginator(vec![
            Canned::Page(page(0, 3, false)),
            Canned::Page(page(3, 10, true)),
        ]);
        let harvest = p.run(&Query::new(["optics"]).max_results(10)).await?;

        assert_eq!(harvest.articles.len(), 3);
        assert_eq!(p.fetcher().calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_first_page() -> Result<()> {
        let p = paginator(vec![Canned::Page(page(0, 0, false))]);
        let harvest = p.run(&Query::new(["nothing"])).await?;

        assert!(harvest.articles.is_empty());
        assert_eq!(harvest.fetches, 1);
        assert!(matches!(harvest.stop, StopReason::NoResults));
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_error_after_first_page_keeps_results() -> Result<()> {
        let p = paginator(vec![
            Canned::Page(page(0, 10, true)),
            Canned::Page(r#"<html><body><form id="captcha"></form></body></html>"#.to_string()),
        ]);
        let harvest = p.run(&Query::new(["optics"]).max_results(30)).await?;

        assert!(harvest.is_truncated());
        assert_eq!(harvest.articles.len(), 10);
        assert!(matches!(harvest.stop, StopReason::Truncated { page: 1, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_html_after_first_page_keeps_results() -> Result<()> {
        let p = paginator(vec![Canned::Page(page(0, 10, true)), Canned::NotHtml]);
        let harvest = p.run(&Query::new(["optics"]).max_results(30)).await?;

        assert_eq!(harvest.articles.len(), 10);
        assert_eq!(harvest.fetches, 2);
        match &harvest.stop {
            StopReason::Truncated { page, error } => {
                assert_eq!(*page, 1);
                assert!(error.is_parse());
            }
            other => panic!("expected a truncated run, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_non_html_first_page_fails() {
        let p = paginator(vec![Canned::NotHtml]);
        let err = p
            .run(&Query::new(["optics"]))
            .await
            .expect_err("first-page parse error must fail");
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_parse_error_on_first_page_fails() {
        let p = paginator(vec![Canned::Page("not html at all".to_string())]);
        let err = p
            .run(&Query::new(["optics"]))
            .await
            .expect_err("first-page parse error must fail");
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_network_error_is_propagated() {
        let p = paginator(vec![
            Canned::Page(page(0, 10, true)),
            Canned::Unavailable,
        ]);
        let err = p
            .run(&Query::new(["optics"]).max_results(20))
            .await
            .expect_err("network error must fail");
        assert!(matches!(err, ScholarError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_invalid_query_fetches_nothing() {
        let p = paginator(vec![Canned::Page(page(0, 10, false))]);
        let err = p
            .run(&Query::new(Vec::<String>::new()))
            .await
            .expect_err("empty query must fail");
        assert!(matches!(err, ScholarError::InvalidQuery(_)));
        assert_eq!(p.fetcher().calls(), 0);
    }

    #[tokio::test]
    async fn test_abort_before_run() -> Result<()> {
        let handle = AbortHandle::new();
        handle.abort();
        let p = paginator(vec![Canned::Page(page(0, 10, true))]).with_abort(handle);
        let harvest = p.run(&Query::new(["optics"])).await?;

        assert!(matches!(harvest.stop, StopReason::Cancelled));
        assert_eq!(harvest.fetches, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_page_limit() -> Result<()> {
        let config = ScholarConfig {
            max_pages: 2,
            ..Default::default()
        };
        let parser = ResultParser::scholar(&config)?;
        let pages = (0..5).map(|i| Canned::Page(page(i * 10, 10, true))).collect();
        let p = Paginator::new(&config, parser, CannedFetcher::new(pages))?;
        let harvest = p.run(&Query::new(["optics"]).max_results(100)).await?;

        assert_eq!(harvest.articles.len(), 20);
        assert!(matches!(harvest.stop, StopReason::Exhausted));
        Ok(())
    }
}
