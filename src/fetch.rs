//! Page fetching.
//!
//! The paginator only needs "URL in, HTML out". [`HttpFetcher`] is the
//! reqwest-backed implementation used by the CLI; tests plug in canned pages.
//! No retries and no delays happen here: spacing out runs is up to the caller.

use crate::config::ScholarConfig;
use crate::error::{Result, ScholarError};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Source of raw result pages.
pub trait Fetcher {
    /// Fetch `url`, failing with a network error on transport problems or a
    /// non-success status.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String>> + Send;
}

/// Fetches pages over HTTP, keeping cookies for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build HTTP client with optional proxy
    pub fn new(config: &ScholarConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url.as_str())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Upstream returned an error status");
            return Err(ScholarError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(content_type) = content_type {
            if !content_type.contains("html") {
                return Err(ScholarError::Parse(format!(
                    "expected an HTML page, got '{}'",
                    content_type
                )));
            }
        }

        Ok(response.text().await?)
    }
}
