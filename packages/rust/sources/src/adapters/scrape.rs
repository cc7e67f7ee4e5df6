//! Generic scraped-site adapter.
//!
//! `source_url` is an index page (a news or blog listing). Links on the same
//! host whose path contains `/news`, `/blog` or `/research` are followed, up
//! to `max_articles`, and each detail page becomes one item. The link text is
//! the title, falling back to the page's `<h1>` or `<title>`.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::SourceAdapter;
use crate::http::HttpClient;
use crate::text::element_text;

static ARTICLE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(news|blog|research)(/|$)").expect("valid regex"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static CONTENT: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "main", r#"[role="main"]"#, "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static PUBLISHED: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="article:published_time"]"#).expect("valid selector")
});
static TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time[datetime]").expect("valid selector"));

pub struct ScrapeAdapter {
    http: Arc<HttpClient>,
    max_articles: usize,
}

impl ScrapeAdapter {
    pub fn new(http: Arc<HttpClient>, max_articles: usize) -> Self {
        Self { http, max_articles }
    }
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let index_url = Url::parse(&source.source_url)
            .map_err(|e| AiDigestError::validation(format!("{}: {e}", source.source_url)))?;
        let index = self.http.get_text(&source.source_url).await?;
        let links = article_links(&index, &index_url, self.max_articles);
        debug!(count = links.len(), "article links found");

        let mut items = Vec::new();
        for (url, link_text) in links {
            match self.http.get_text(url.as_str()).await {
                Ok(html) => {
                    if let Some(item) = article_to_item(&html, &url, &link_text, source) {
                        items.push(item);
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to fetch article, skipping");
                }
            }
        }
        Ok(items)
    }
}

/// Unique article links on the index page, in document order, with their text.
pub(crate) fn article_links(html: &str, index_url: &Url, max: usize) -> Vec<(Url, String)> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&LINK) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let Ok(mut url) = index_url.join(href) else {
            continue;
        };
        url.set_fragment(None);

        if url.host_str() != index_url.host_str()
            || !ARTICLE_PATH.is_match(url.path())
            || url.path().trim_end_matches('/') == index_url.path().trim_end_matches('/')
        {
            continue;
        }
        if seen.insert(url.to_string()) {
            links.push((url, element_text(el)));
            if links.len() >= max {
                break;
            }
        }
    }
    links
}

fn article_to_item(html: &str, url: &Url, link_text: &str, source: &SourceConfig) -> Option<RawItem> {
    let doc = Html::parse_document(html);

    let body = CONTENT
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(element_text)
        .filter(|b| !b.is_empty())?;

    let title = Some(link_text.to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| doc.select(&H1).next().map(element_text))
        .or_else(|| doc.select(&TITLE).next().map(element_text))
        .unwrap_or_default();

    let published = doc
        .select(&PUBLISHED)
        .next()
        .and_then(|m| m.value().attr("content"))
        .or_else(|| doc.select(&TIME).next().and_then(|t| t.value().attr("datetime")))
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|d| d.with_timezone(&Utc));

    Some(
        RawItem::new(SourceKind::Scrape, &source.source_name, title, body)
            .with_url(url.to_string())
            .with_published_at(published),
    )
}
