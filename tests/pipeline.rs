//! End-to-end runs of the paginator against canned result pages.

use pretty_assertions::assert_eq;
use rustscholar::fields::{AUTHORS, CITATION_COUNT, NUM_VERSIONS, TITLE, YEAR};
use rustscholar::{
    dumps_all, run_query, Dump, FieldValue, Fetcher, Fields, Format, Query, QueryBuilder, Result,
    ScholarConfig, StopReason,
};
use std::sync::Mutex;
use url::Url;

const MARR_PAGE: &str = include_str!("fixtures/marr.html");

/// Answers every request with the same page and remembers what was asked.
struct StubFetcher {
    html: String,
    requested: Mutex<Vec<Url>>,
}

impl StubFetcher {
    fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<Url> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for &StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.clone());
        }
        Ok(self.html.clone())
    }
}

fn marr_query() -> Query {
    Query::new(["theory", "of", "edge", "detection"])
        .author("Marr")
        .max_results(1)
}

#[tokio::test]
async fn test_marr_scenario() -> Result<()> {
    let config = ScholarConfig::default();
    let stub = StubFetcher::new(MARR_PAGE);
    let harvest = run_query(&config, &marr_query(), &stub).await?;

    assert_eq!(stub.requested().len(), 1);
    assert!(matches!(harvest.stop, StopReason::MaxResults));
    assert_eq!(harvest.articles.len(), 1);

    let article = &harvest.articles[0];
    assert_eq!(article.title(), Some("A computational theory of edge detection"));
    assert_eq!(
        article.authors(),
        Some(&["D. Marr".to_string(), "E. Hildreth".to_string()][..])
    );
    assert_eq!(article.year(), Some(1980));
    assert_eq!(article.citation_count(), Some(4200));
    assert_eq!(article.num_versions(), Some(3));

    let Dump::Text(json) = article.dumps(Format::Json)? else {
        panic!("json dump must be text");
    };
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["citation_count"], serde_json::json!(4200));

    let declared: Vec<&str> = article.fields().names().collect();
    assert_eq!(&declared[..5], &[TITLE, AUTHORS, YEAR, CITATION_COUNT, NUM_VERSIONS]);
    let mut last = 0;
    for name in &declared {
        let pos = json
            .find(&format!("\"{}\":", name))
            .unwrap_or_else(|| panic!("{} missing from json", name));
        assert!(pos >= last, "{} out of order", name);
        last = pos;
    }
    Ok(())
}

#[tokio::test]
async fn test_request_reflects_query() -> Result<()> {
    let config = ScholarConfig::default();
    let stub = StubFetcher::new(MARR_PAGE);
    run_query(&config, &marr_query(), &stub).await?;

    let requested = stub.requested();
    let decoded = QueryBuilder::new(&config)?.decode(&requested[0])?;
    assert_eq!(decoded.page_offset, 0);
    assert_eq!(decoded.into_query(1), marr_query());
    Ok(())
}

#[tokio::test]
async fn test_unparseable_year_keeps_article() -> Result<()> {
    let config = ScholarConfig::default();
    let page = MARR_PAGE.replace("Series B, 1980", "Series B, forthcoming");
    let stub = StubFetcher::new(page);
    let harvest = run_query(&config, &marr_query(), &stub).await?;

    assert_eq!(harvest.articles.len(), 1);
    let article = &harvest.articles[0];
    assert_eq!(article.get(YEAR), Some(&FieldValue::Absent));
    assert_eq!(article.citation_count(), Some(4200));
    Ok(())
}

#[tokio::test]
async fn test_no_next_page_means_one_fetch() -> Result<()> {
    let config = ScholarConfig::default();
    let stub = StubFetcher::new(MARR_PAGE);
    let harvest = run_query(&config, &marr_query().max_results(25), &stub).await?;

    assert_eq!(stub.requested().len(), 1);
    assert_eq!(harvest.articles.len(), 1);
    assert!(matches!(harvest.stop, StopReason::Exhausted));
    Ok(())
}

#[tokio::test]
async fn test_json_and_mapping_agree() -> Result<()> {
    let config = ScholarConfig::default();
    let stub = StubFetcher::new(MARR_PAGE);
    let harvest = run_query(&config, &marr_query(), &stub).await?;

    let Dump::Text(json) = dumps_all(&harvest.articles, Format::Json)? else {
        panic!("json dump must be text");
    };
    let Dump::Mappings(mappings) = dumps_all(&harvest.articles, Format::Mapping)? else {
        panic!("mapping dump must be mappings");
    };
    let parsed: Vec<Fields> = serde_json::from_str(&json)?;
    assert_eq!(parsed, mappings);
    Ok(())
}

#[tokio::test]
async fn test_captcha_page_is_a_parse_error() {
    let config = ScholarConfig::default();
    let stub = StubFetcher::new(
        r#"<html><body><div id="gs_captcha_ccl"><form action="/sorry">Please show you're not a robot</form></div></body></html>"#,
    );
    let err = run_query(&config, &marr_query(), &stub)
        .await
        .expect_err("unrecognised page must fail");
    assert!(err.is_parse());
}
