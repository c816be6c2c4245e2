//! Upstream constants and client settings.
//!
//! Everything that is specific to the upstream search page (host, path,
//! parameter names, page size) lives here so that layout or URL drift is a
//! configuration change rather than a code change.

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Settings for building requests and walking result pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScholarConfig {
    /// Base URL, e.g. a mirror site
    pub base_url: String,
    /// Path of the search endpoint
    pub search_path: String,
    /// Number of results the upstream renders per page
    pub page_size: usize,
    /// Name of the result-offset parameter
    pub offset_param: String,
    /// Name of the free-text query parameter
    pub query_param: String,
    /// Interface language (`hl`), forced for consistent parsing
    pub language: String,
    /// Source data type filter (`as_sdt`); `None` leaves it unset
    pub sdt: Option<String>,
    /// Upper bound on pages walked by a single run
    pub max_pages: usize,
    /// User agent sent with every request
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCHOLAR_URL.to_string(),
            search_path: "/scholar".to_string(),
            page_size: 10,
            offset_param: "start".to_string(),
            query_param: "q".to_string(),
            language: "en".to_string(),
            sdt: Some("0,5".to_string()),
            max_pages: 100,
            user_agent: USER_AGENT.to_string(),
            timeout_secs: 30,
            proxy: None,
        }
    }
}

impl ScholarConfig {
    /// Load a config from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded scholar config");
        Ok(config)
    }

    /// Reject settings that would make pagination or URL building meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ScholarError::Config("page_size must be positive".to_string()));
        }
        if self.max_pages == 0 {
            return Err(ScholarError::Config("max_pages must be positive".to_string()));
        }
        if self.offset_param.is_empty() || self.query_param.is_empty() {
            return Err(ScholarError::Config(
                "query and offset parameter names must not be empty".to_string(),
            ));
        }
        self.search_url().map(|_| ())
    }

    /// Base URL with trailing slashes removed
    pub fn base(&self) -> Result<Url> {
        Url::parse(self.base_url.trim_end_matches('/')).map_err(|e| {
            ScholarError::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })
    }

    /// Search endpoint without any query parameters
    pub fn search_url(&self) -> Result<Url> {
        self.base()?
            .join(&self.search_path)
            .map_err(|e| ScholarError::Config(format!("Invalid search path: {}", e)))
    }
}
