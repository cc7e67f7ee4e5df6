//! RSS/Atom feed adapter.
//!
//! `source_url` is the feed URL. The newest `max_items` entries become items;
//! the body is the entry content, else its summary, cleaned of markup.

use std::sync::Arc;

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use feed_rs::model::Entry;

use super::SourceAdapter;
use crate::http::HttpClient;
use crate::text::clean_markup;

pub struct FeedAdapter {
    http: Arc<HttpClient>,
    max_items: usize,
}

impl FeedAdapter {
    pub fn new(http: Arc<HttpClient>, max_items: usize) -> Self {
        Self { http, max_items }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn name(&self) -> &str {
        "feed"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let body = self.http.get_text(&source.source_url).await?;
        parse_feed(&body, source, self.max_items)
    }
}

/// Parse a feed document into items for `source`.
pub(crate) fn parse_feed(content: &str, source: &SourceConfig, max_items: usize) -> Result<Vec<RawItem>> {
    let feed = feed_rs::parser::parse(content.as_bytes())
        .map_err(|e| AiDigestError::parse(format!("failed to parse feed: {e}")))?;

    let mut entries = feed.entries;
    // Newest first when the feed carries dates; undated entries keep feed order.
    entries.sort_by(|a, b| entry_time(b).cmp(&entry_time(a)));

    Ok(entries
        .into_iter()
        .filter_map(|entry| entry_to_item(entry, source))
        .take(max_items)
        .collect())
}

fn entry_time(entry: &Entry) -> Option<chrono::DateTime<chrono::Utc>> {
    entry.published.or(entry.updated)
}

fn entry_to_item(entry: Entry, source: &SourceConfig) -> Option<RawItem> {
    let title = clean_markup(&entry.title.as_ref()?.content);
    let raw_body = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))?;
    let body = clean_markup(&raw_body);
    if title.is_empty() || body.is_empty() {
        return None;
    }

    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    Some(
        RawItem::new(SourceKind::Feed, &source.source_name, title, body)
            .with_url(url)
            .with_published_at(entry_time(&entry)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Politeness;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title>
  <item>
    <title>Older post</title>
    <link>https://blog.test/older</link>
    <description>&lt;p&gt;Older &lt;b&gt;summary&lt;/b&gt;&lt;/p&gt;</description>
    <pubDate>Mon, 12 Oct 2026 08:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Newer post</title>
    <link>https://blog.test/newer</link>
    <description>Newer summary</description>
    <pubDate>Wed, 14 Oct 2026 08:00:00 GMT</pubDate>
  </item>
  <item>
    <title>No body</title>
    <link>https://blog.test/empty</link>
  </item>
</channel></rss>"#;

    fn source() -> SourceConfig {
        SourceConfig::new(SourceKind::Feed, "Test Blog", "https://blog.test/rss")
    }

    #[test]
    fn parses_and_orders_newest_first() {
        let items = parse_feed(RSS, &source(), 10).expect("parse");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Newer post");
        assert_eq!(items[1].body, "Older summary");
        assert_eq!(items[1].url.as_deref(), Some("https://blog.test/older"));
        assert!(items[1].published_at.is_some());
        assert!(items.iter().all(|i| i.source_name == "Test Blog"));
    }

    #[test]
    fn respects_max_items() {
        let items = parse_feed(RSS, &source(), 1).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Newer post");
    }

    #[test]
    fn malformed_feed_is_parse_error() {
        let err = parse_feed("<html>not a feed", &source(), 10).unwrap_err();
        assert!(matches!(err, AiDigestError::Parse { .. }));
    }

    #[tokio::test]
    async fn fetches_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let http = Arc::new(
            HttpClient::with_politeness(Duration::from_secs(5), Politeness::none()).unwrap(),
        );
        let adapter = FeedAdapter::new(http, 20);
        let source = SourceConfig::new(SourceKind::Feed, "Test Blog", format!("{}/rss", server.uri()));
        assert_eq!(adapter.fetch(&source).await.len(), 2);
    }

    #[tokio::test]
    async fn server_error_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = Arc::new(
            HttpClient::with_politeness(Duration::from_secs(5), Politeness::none()).unwrap(),
        );
        let adapter = FeedAdapter::new(http, 20);
        let source = SourceConfig::new(SourceKind::Feed, "Down", format!("{}/rss", server.uri()));
        assert!(adapter.fetch(&source).await.is_empty());
    }
}
