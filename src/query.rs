//! Structured queries and the request URLs they turn into.
//!
//! The author filter travels inside the free-text parameter as
//! `author:"Name"`, the way the upstream search box expects it, and the
//! year range uses the `as_ylo` / `as_yhi` parameters.

use crate::config::ScholarConfig;
use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Default number of articles returned by a run
pub const DEFAULT_MAX_RESULTS: usize = 10;

const AUTHOR_OPERATOR: &str = "author:";
const AUTHOR_PREFIX: &str = "author:\"";
const YEAR_LOW_PARAM: &str = "as_ylo";
const YEAR_HIGH_PARAM: &str = "as_yhi";

/// A search request against the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Search words, in order. Each entry is a single whitespace-free word.
    pub terms: Vec<String>,
    /// Optional author filter
    pub author: Option<String>,
    /// Results from this year onwards
    pub year_low: Option<i32>,
    /// Results up to this year
    pub year_high: Option<i32>,
    /// Maximum number of articles to return
    pub max_results: usize,
}

impl Query {
    /// Build a query from free-text terms. Terms are split on whitespace.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .flat_map(|t| {
                t.as_ref()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            terms,
            author: None,
            year_low: None,
            year_high: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Set the author filter. Blank names clear it.
    pub fn author(mut self, author: impl AsRef<str>) -> Self {
        let author = author.as_ref().trim();
        self.author = (!author.is_empty()).then(|| author.to_string());
        self
    }

    /// Restrict results to a publication year range
    pub fn years(mut self, low: Option<i32>, high: Option<i32>) -> Self {
        self.year_low = low;
        self.year_high = high;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Check the invariants the request builder relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(ScholarError::InvalidQuery(
                "max_results must be positive".to_string(),
            ));
        }
        if self.terms.is_empty() && self.author.is_none() {
            return Err(ScholarError::InvalidQuery(
                "either search terms or an author is required".to_string(),
            ));
        }
        if self.terms.iter().any(|t| t.is_empty() || t.contains(char::is_whitespace)) {
            return Err(ScholarError::InvalidQuery(
                "search terms must be non-empty single words".to_string(),
            ));
        }
        if let Some(term) = self.terms.iter().find(|t| t.starts_with(AUTHOR_OPERATOR)) {
            return Err(ScholarError::InvalidQuery(format!(
                "use the author filter instead of the '{}' term",
                term
            )));
        }
        if let Some(author) = &self.author {
            if author.trim().is_empty() || author.contains('"') {
                return Err(ScholarError::InvalidQuery(format!(
                    "invalid author filter: {:?}",
                    author
                )));
            }
        }
        if let (Some(low), Some(high)) = (self.year_low, self.year_high) {
            if low > high {
                return Err(ScholarError::InvalidQuery(format!(
                    "year range is inverted: {} > {}",
                    low, high
                )));
            }
        }
        Ok(())
    }

    /// Free-text value sent upstream: the terms plus the author operator.
    pub fn search_text(&self) -> String {
        let mut text = self.terms.join(" ");
        if let Some(author) = &self.author {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(AUTHOR_PREFIX);
            text.push_str(author);
            text.push('"');
        }
        text
    }
}

/// Query fields recovered from a request URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedQuery {
    pub terms: Vec<String>,
    pub author: Option<String>,
    pub year_low: Option<i32>,
    pub year_high: Option<i32>,
    /// Zero-based page index
    pub page_offset: usize,
}

impl DecodedQuery {
    /// Rebuild a [`Query`]; the result cap is not part of the URL.
    pub fn into_query(self, max_results: usize) -> Query {
        Query {
            terms: self.terms,
            author: self.author,
            year_low: self.year_low,
            year_high: self.year_high,
            max_results,
        }
    }
}

/// Translates queries into upstream request URLs.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    search_url: Url,
    page_size: usize,
    offset_param: String,
    query_param: String,
    language: String,
    sdt: Option<String>,
}

impl QueryBuilder {
    pub fn new(config: &ScholarConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            search_url: config.search_url()?,
            page_size: config.page_size,
            offset_param: config.offset_param.clone(),
            query_param: config.query_param.clone(),
            language: config.language.clone(),
            sdt: config.sdt.clone(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Build the URL for the zero-based page `page_offset` of `query`.
    pub fn build(&self, query: &Query, page_offset: usize) -> Result<Url> {
        query.validate()?;

        let start = page_offset
            .checked_mul(self.page_size)
            .ok_or_else(|| ScholarError::InvalidQuery("page offset out of range".to_string()))?;

        let mut url = self.search_url.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair(&self.query_param, &query.search_text());
            if !self.language.is_empty() {
                params.append_pair("hl", &self.language);
            }
            if let Some(sdt) = &self.sdt {
                params.append_pair("as_sdt", sdt);
            }
            if let Some(year) = query.year_low {
                params.append_pair(YEAR_LOW_PARAM, &year.to_string());
            }
            if let Some(year) = query.year_high {
                params.append_pair(YEAR_HIGH_PARAM, &year.to_string());
            }
            params.append_pair(&self.offset_param, &start.to_string());
        }

        debug!(page = page_offset, url = %url, "Built search URL");
        Ok(url)
    }

    /// Recover the query fields encoded in a URL produced by [`Self::build`].
    pub fn decode(&self, url: &Url) -> Result<DecodedQuery> {
        let mut text = None;
        let mut year_low = None;
        let mut year_high = None;
        let mut start = 0usize;

        for (key, value) in url.query_pairs() {
            if key == self.query_param.as_str() {
                text = Some(value.into_owned());
            } else if key == self.offset_param.as_str() {
                start = parse_param(&key, &value)?;
            } else if key == YEAR_LOW_PARAM {
                year_low = Some(parse_param(&key, &value)?);
            } else if key == YEAR_HIGH_PARAM {
                year_high = Some(parse_param(&key, &value)?);
            }
        }

        let text = text.ok_or_else(|| {
            ScholarError::InvalidQuery(format!("URL has no '{}' parameter", self.query_param))
        })?;
        let (terms, author) = split_author(&text);

        Ok(DecodedQuery {
            terms,
            author,
            year_low,
            year_high,
            page_offset: start / self.page_size,
        })
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ScholarError::InvalidQuery(format!("bad value for '{}': {}", key, value)))
}

/// Separate the `author:"..."` operator from the remaining words. The
/// operator only counts at the start of a whitespace-separated token.
fn split_author(text: &str) -> (Vec<String>, Option<String>) {
    let operator = text.match_indices(AUTHOR_PREFIX).map(|(i, _)| i).find(|&i| {
        text[..i]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace)
    });
    let Some(start) = operator else {
        return (text.split_whitespace().map(str::to_string).collect(), None);
    };

    let rest = &text[start + AUTHOR_PREFIX.len()..];
    let (author, tail) = match rest.find('"') {
        Some(end) => (&rest[..end], &rest[end + 1..]),
        None => (rest, ""),
    };

    let terms = text[..start]
        .split_whitespace()
        .chain(tail.split_whitespace())
        .map(str::to_string)
        .collect();
    let author = author.trim();
    (terms, (!author.is_empty()).then(|| author.to_string()))
}
