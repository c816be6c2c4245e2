//! Declarative field extraction.
//!
//! A [`FieldSet`] is an ordered registry of named [`FieldExtractor`]s. Each
//! extractor looks at one [`ResultBlock`] and either produces a value or
//! reports that nothing was found, in which case the field's registered
//! default is used. Extractors never see each other's output, so adapting
//! to a layout change means replacing single entries.
//!
//! An extractor that finds its marker but cannot make sense of it (for
//! example a number that does not parse) returns `Some(FieldValue::Absent)`,
//! which overrides the default.

use crate::article::Article;
use crate::error::{Result, ScholarError};
use crate::parser::{compile_selector, ResultBlock};
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const TITLE: &str = "title";
pub const AUTHORS: &str = "authors";
pub const YEAR: &str = "year";
pub const CITATION_COUNT: &str = "citation_count";
pub const NUM_VERSIONS: &str = "num_versions";
pub const URL: &str = "url";
pub const CITATIONS_URL: &str = "citations_url";
pub const VERSIONS_URL: &str = "versions_url";

/// Identifier stamped on articles produced by [`FieldSet::standard`]
pub const STANDARD_VERSION: &str = "scholar-standard/1";

/// One extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Nothing usable was found; rendered as `null`
    #[default]
    Absent,
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => Ok(()),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join("; ")),
        }
    }
}

/// A rule mapping one result block to one field value.
///
/// `None` means the field was not found and the registered default applies.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue>;
}

/// Extractor backed by a closure, see [`from_fn`].
pub struct FnExtractor<F>(F);

/// Wrap a closure as a [`FieldExtractor`].
pub fn from_fn<F>(f: F) -> FnExtractor<F>
where
    F: Fn(&ResultBlock<'_>) -> Option<FieldValue> + Send + Sync,
{
    FnExtractor(f)
}

impl<F> FieldExtractor for FnExtractor<F>
where
    F: Fn(&ResultBlock<'_>) -> Option<FieldValue> + Send + Sync,
{
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue> {
        (self.0)(block)
    }
}

/// Text of the first element matching a selector, passed through a cleanup.
pub struct TextField {
    selector: Selector,
    clean: fn(&str) -> String,
}

impl TextField {
    pub fn new(css: &str, clean: fn(&str) -> String) -> Result<Self> {
        Ok(Self {
            selector: compile_selector(css)?,
            clean,
        })
    }
}

impl FieldExtractor for TextField {
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue> {
        let text = (self.clean)(&block.text_of(&self.selector)?);
        (!text.is_empty()).then_some(FieldValue::Text(text))
    }
}

/// Text of the first element matching a selector, split into a list.
pub struct ListField {
    selector: Selector,
    split: fn(&str) -> Vec<String>,
}

impl ListField {
    pub fn new(css: &str, split: fn(&str) -> Vec<String>) -> Result<Self> {
        Ok(Self {
            selector: compile_selector(css)?,
            split,
        })
    }
}

impl FieldExtractor for ListField {
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue> {
        let items = (self.split)(&block.text_of(&self.selector)?);
        (!items.is_empty()).then_some(FieldValue::List(items))
    }
}

/// First capture group of a pattern, searched in the text of each matching
/// element in document order, parsed as an integer.
pub struct NumberField {
    selector: Selector,
    pattern: Regex,
}

impl NumberField {
    pub fn new(css: &str, pattern: &str) -> Result<Self> {
        Ok(Self {
            selector: compile_selector(css)?,
            pattern: compile_pattern(pattern)?,
        })
    }
}

impl FieldExtractor for NumberField {
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue> {
        let capture = block.select(&self.selector).find_map(|element| {
            let text = collapse_whitespace(&element.text().collect::<String>());
            self.pattern
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })?;

        match parse_count(&capture) {
            Some(n) => Some(FieldValue::Integer(n)),
            None => {
                debug!(text = %capture, "Number marker found but unparseable");
                Some(FieldValue::Absent)
            }
        }
    }
}

/// Resolved `href` of the first link matching a selector whose text
/// matches an optional pattern.
pub struct LinkField {
    selector: Selector,
    text: Option<Regex>,
}

impl LinkField {
    pub fn new(css: &str, text: Option<&str>) -> Result<Self> {
        Ok(Self {
            selector: compile_selector(css)?,
            text: text.map(compile_pattern).transpose()?,
        })
    }
}

impl FieldExtractor for LinkField {
    fn extract(&self, block: &ResultBlock<'_>) -> Option<FieldValue> {
        block
            .select(&self.selector)
            .filter(|link| match &self.text {
                Some(pattern) => pattern.is_match(&link.text().collect::<String>()),
                None => true,
            })
            .find_map(|link| link.value().attr("href"))
            .and_then(|href| block.resolve(href))
            .map(FieldValue::Text)
    }
}

struct FieldRule {
    name: String,
    default: FieldValue,
    extractor: Box<dyn FieldExtractor>,
}

/// Ordered schema of an [`Article`].
pub struct FieldSet {
    version: String,
    rules: Vec<FieldRule>,
}

impl FieldSet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            rules: Vec::new(),
        }
    }

    /// Append a named extractor. Field names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        default: FieldValue,
        extractor: impl FieldExtractor + 'static,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ScholarError::Config(format!(
                "field '{}' is already registered in field set '{}'",
                name, self.version
            )));
        }
        self.rules.push(FieldRule {
            name,
            default,
            extractor: Box::new(extractor),
        });
        Ok(self)
    }

    /// Builder form of [`Self::register`].
    pub fn with(
        mut self,
        name: impl Into<String>,
        default: FieldValue,
        extractor: impl FieldExtractor + 'static,
    ) -> Result<Self> {
        self.register(name, default, extractor)?;
        Ok(self)
    }

    /// Swap the extractor of an existing field, keeping its position and default.
    pub fn replace(&mut self, name: &str, extractor: impl FieldExtractor + 'static) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| ScholarError::Config(format!("no field named '{}'", name)))?;
        rule.extractor = Box::new(extractor);
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every extractor, in order, against one block.
    pub fn extract(&self, block: &ResultBlock<'_>) -> Article {
        let fields = self
            .rules
            .iter()
            .map(|rule| {
                let value = rule.extractor.extract(block).unwrap_or_else(|| {
                    debug!(field = %rule.name, "Field not found, using default");
                    rule.default.clone()
                });
                (rule.name.clone(), value)
            })
            .collect();
        Article::new(fields, &self.version)
    }

    /// Field set for the current Google Scholar result layout.
    pub fn standard() -> Result<Self> {
        Self::new(STANDARD_VERSION)
            .with(TITLE, FieldValue::Absent, TextField::new("h3.gs_rt", clean_title)?)?
            .with(
                AUTHORS,
                FieldValue::List(Vec::new()),
                ListField::new("div.gs_a", split_authors)?,
            )?
            .with(
                YEAR,
                FieldValue::Absent,
                NumberField::new("div.gs_a", r"\s-\s.*?\b(\d{4})\b")?,
            )?
            .with(
                CITATION_COUNT,
                FieldValue::Integer(0),
                NumberField::new("div.gs_fl a", r"(?:Cited by|被引用)\s*([\d,]+)")?,
            )?
            .with(
                NUM_VERSIONS,
                FieldValue::Integer(1),
                NumberField::new("div.gs_fl a", r"All\s+([\d,]+)\s+versions")?,
            )?
            .with(URL, FieldValue::Absent, LinkField::new("h3.gs_rt a", None)?)?
            .with(
                CITATIONS_URL,
                FieldValue::Absent,
                LinkField::new("div.gs_fl a", Some(r"Cited by|被引用"))?,
            )?
            .with(
                VERSIONS_URL,
                FieldValue::Absent,
                LinkField::new("div.gs_fl a", Some(r"All\s+[\d,]+\s+versions"))?,
            )
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSet")
            .field("version", &self.version)
            .field("fields", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ScholarError::Parse(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Collapse runs of whitespace (including non-breaking spaces) to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_count(text: &str) -> Option<i64> {
    text.replace(',', "").parse().ok()
}

/// Drop leading type tags such as `[PDF]` or `[CITATION][C]`.
pub fn clean_title(text: &str) -> String {
    let mut rest = collapse_whitespace(text);
    while let Some(tail) = rest.strip_prefix('[') {
        let Some(end) = tail.find(']') else { break };
        let tag = &tail[..end];
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_uppercase()) {
            break;
        }
        rest = tail[end + 1..].trim_start().to_string();
    }
    rest
}

/// Author names from a byline like `D Marr, E Hildreth - Journal, 1980 - host`.
pub fn split_authors(text: &str) -> Vec<String> {
    let byline = collapse_whitespace(text);
    let names = byline.split(" - ").next().unwrap_or_default();
    names
        .split(',')
        .map(|name| name.trim().trim_end_matches('…').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
