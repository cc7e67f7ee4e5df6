//! Repository trending adapter (GitHub trending page).
//!
//! `source_url` is a trending page such as
//! `https://github.com/trending?since=daily&language=python`. Each
//! `article.Box-row` becomes one item; the url is the repository page.

use std::sync::{Arc, LazyLock};

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::SourceAdapter;
use crate::http::HttpClient;
use crate::text::element_text;

static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.Box-row").expect("valid selector"));
static NAME_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2 a[href]").expect("valid selector"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static LANGUAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"span[itemprop="programmingLanguage"]"#).expect("valid selector")
});
static STARS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href$="/stargazers"]"#).expect("valid selector"));
static STARS_TODAY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.d-inline-block.float-sm-right").expect("valid selector")
});

pub struct RepoTrendingAdapter {
    http: Arc<HttpClient>,
    max_items: usize,
}

impl RepoTrendingAdapter {
    pub fn new(http: Arc<HttpClient>, max_items: usize) -> Self {
        Self { http, max_items }
    }
}

#[async_trait]
impl SourceAdapter for RepoTrendingAdapter {
    fn name(&self) -> &str {
        "repo"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let base = Url::parse(&source.source_url)
            .map_err(|e| AiDigestError::validation(format!("{}: {e}", source.source_url)))?;
        let html = self.http.get_text(&source.source_url).await?;
        Ok(parse_trending(&html, &base, source, self.max_items))
    }
}

pub(crate) fn parse_trending(html: &str, base: &Url, source: &SourceConfig, max_items: usize) -> Vec<RawItem> {
    let doc = Html::parse_document(html);
    doc.select(&ROW)
        .filter_map(|row| row_to_item(row, base, source))
        .take(max_items)
        .collect()
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn row_to_item(row: ElementRef<'_>, base: &Url, source: &SourceConfig) -> Option<RawItem> {
    let link = row.select(&NAME_LINK).next()?;
    let repo_path = link.value().attr("href")?.trim().trim_matches('/').to_string();
    if repo_path.is_empty() {
        return None;
    }
    let url = base.join(&format!("/{repo_path}")).ok()?;

    let description = first_text(row, &DESCRIPTION).unwrap_or_else(|| "No description".into());
    let language = first_text(row, &LANGUAGE).unwrap_or_else(|| "unknown".into());
    let stars = first_text(row, &STARS).unwrap_or_else(|| "0".into());

    let mut body = format!(
        "Repository: {repo_path}\nDescription: {description}\nLanguage: {language}\nStars: {stars}"
    );
    if let Some(today) = first_text(row, &STARS_TODAY) {
        body.push_str(&format!("\nTrending: {today}"));
    }

    Some(
        RawItem::new(SourceKind::Repo, &source.source_name, repo_path, body).with_url(url.to_string()),
    )
}
