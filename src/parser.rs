//! Result page parsing.
//!
//! A [`BlockLayout`] says where the result list lives, how one entry is
//! delimited from the next and what the "next page" control looks like.
//! Together with a [`FieldSet`] it forms the unit that has to be updated
//! when the upstream markup drifts.

use crate::article::Article;
use crate::config::ScholarConfig;
use crate::error::{OptionExt, Result, ScholarError};
use crate::fields::{collapse_whitespace, FieldSet};
use scraper::element_ref::Select;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

/// One parsed result entry, handed to each extractor of a [`FieldSet`].
#[derive(Debug, Clone, Copy)]
pub struct ResultBlock<'a> {
    element: ElementRef<'a>,
    base: &'a Url,
}

impl<'a> ResultBlock<'a> {
    pub fn new(element: ElementRef<'a>, base: &'a Url) -> Self {
        Self { element, base }
    }

    pub fn element(&self) -> ElementRef<'a> {
        self.element
    }

    /// All descendants matching `selector`, in document order
    pub fn select<'b>(&self, selector: &'b Selector) -> Select<'a, 'b> {
        self.element.select(selector)
    }

    /// Whitespace-collapsed text of the first element matching `selector`
    pub fn text_of(&self, selector: &Selector) -> Option<String> {
        self.select(selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
    }

    /// Whitespace-collapsed text of the whole block
    pub fn text(&self) -> String {
        collapse_whitespace(&self.element.text().collect::<String>())
    }

    /// Resolve a possibly relative link against the page's base URL
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.base.join(href).ok().map(String::from)
    }
}

/// Compile a CSS selector, mapping failures to a parse error.
pub(crate) fn compile_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ScholarError::Parse(format!("invalid selector '{}': {}", css, e)))
}

/// Structural markers of a results page.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    name: String,
    container: Selector,
    block: Selector,
    next_page: Selector,
}

impl BlockLayout {
    pub fn new(
        name: impl Into<String>,
        container: &str,
        block: &str,
        next_page: &str,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            container: compile_selector(container)?,
            block: compile_selector(block)?,
            next_page: compile_selector(next_page)?,
        })
    }

    /// Layout of the Google Scholar results page
    pub fn scholar() -> Result<Self> {
        Self::new(
            "scholar",
            "#gs_res_ccl_mid",
            "div.gs_r.gs_or.gs_scl",
            "#gs_n a .gs_ico_nav_next",
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Articles found on one page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub articles: Vec<Article>,
    /// Whether a "next page" control was found. False when in doubt.
    pub has_next_page: bool,
}

/// Splits a results page into blocks and applies a [`FieldSet`] to each.
#[derive(Debug)]
pub struct ResultParser {
    layout: BlockLayout,
    fields: FieldSet,
    base_url: Url,
}

impl ResultParser {
    pub fn new(layout: BlockLayout, fields: FieldSet, base_url: Url) -> Self {
        Self {
            layout,
            fields,
            base_url,
        }
    }

    /// Standard Google Scholar layout and field set, links resolved
    /// against the configured base URL.
    pub fn scholar(config: &ScholarConfig) -> Result<Self> {
        Ok(Self::new(
            BlockLayout::scholar()?,
            FieldSet::standard()?,
            config.base()?,
        ))
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Parse a page with the parser's own field set.
    pub fn parse(&self, html: &str) -> Result<ParsedPage> {
        self.parse_with(html, &self.fields)
    }

    /// Parse a page with an alternative field set.
    ///
    /// A page without the results container (an anti-bot interstitial, an
    /// error page, a changed layout) is a parse error. A container with no
    /// entries is a valid empty page.
    pub fn parse_with(&self, html: &str, fields: &FieldSet) -> Result<ParsedPage> {
        if !looks_like_html(html) {
            return Err(ScholarError::Parse("response is not an HTML document".to_string()));
        }

        let document = Html::parse_document(html);
        let container = document
            .select(&self.layout.container)
            .next()
            .ok_or_parse(&format!(
                "results container not found for layout '{}'",
                self.layout.name
            ))?;

        let articles: Vec<Article> = container
            .select(&self.layout.block)
            .map(|element| fields.extract(&ResultBlock::new(element, &self.base_url)))
            .collect();

        let has_next_page = document.select(&self.layout.next_page).next().is_some();
        if !has_next_page {
            debug!(layout = %self.layout.name, "No next-page marker found");
        }

        info!(count = articles.len(), has_next_page, "Parsed results");
        Ok(ParsedPage {
            articles,
            has_next_page,
        })
    }
}

fn looks_like_html(body: &str) -> bool {
    body.trim_start_matches('\u{feff}').trim_start().starts_with('<')
}
