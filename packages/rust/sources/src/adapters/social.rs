//! Social timeline list adapter (Twitter/X API v2).
//!
//! `source_url` is the opaque list id. The adapter calls
//! `{api_base}/2/lists/{id}/tweets` with a bearer token. Without a token it
//! logs a warning and returns nothing; placeholder ids never reach it.

use std::sync::Arc;

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use super::SourceAdapter;
use crate::http::HttpClient;
use crate::text::{collapse_whitespace, truncate_chars};

/// Characters of the post used as its title.
const TITLE_CHARS: usize = 80;

pub struct SocialListAdapter {
    http: Arc<HttpClient>,
    api_base: String,
    bearer_token: Option<String>,
    max_items: usize,
}

impl SocialListAdapter {
    pub fn new(
        http: Arc<HttpClient>,
        api_base: &str,
        bearer_token: Option<String>,
        max_items: usize,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bearer_token,
            max_items,
        }
    }

    fn list_url(&self, list_id: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/2/lists/{list_id}/tweets", self.api_base))
            .map_err(|e| AiDigestError::validation(format!("invalid social API url: {e}")))?;
        url.query_pairs_mut()
            // The API accepts 1..=100 results per page.
            .append_pair("max_results", &self.max_items.clamp(1, 100).to_string())
            .append_pair("tweet.fields", "created_at,author_id,public_metrics");
        Ok(url.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ListTweets {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct Metrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
}

#[async_trait]
impl SourceAdapter for SocialListAdapter {
    fn name(&self) -> &str {
        "social"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let Some(token) = self.bearer_token.as_deref() else {
            warn!(source = %source.source_name, "no social API bearer token configured, skipping");
            return Ok(Vec::new());
        };

        let url = self.list_url(source.source_url.trim())?;
        let page: ListTweets = self.http.get_json(&url, Some(token)).await?;

        Ok(page
            .data
            .into_iter()
            .take(self.max_items)
            .map(|t| tweet_to_item(t, source))
            .collect())
    }
}

fn tweet_to_item(tweet: Tweet, source: &SourceConfig) -> RawItem {
    let text = collapse_whitespace(&tweet.text);
    let mut body = text.clone();
    if let Some(author) = &tweet.author_id {
        body.push_str(&format!("\n\nAuthor: {author}"));
    }
    if let Some(m) = &tweet.public_metrics {
        body.push_str(&format!(
            "\nLikes: {} Reposts: {} Replies: {}",
            m.like_count, m.retweet_count, m.reply_count
        ));
    }

    RawItem::new(
        SourceKind::Social,
        &source.source_name,
        truncate_chars(&text, TITLE_CHARS),
        body,
    )
    .with_url(format!("https://twitter.com/i/web/status/{}", tweet.id))
    .with_published_at(tweet.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Politeness;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> Arc<HttpClient> {
        Arc::new(HttpClient::with_politeness(Duration::from_secs(5), Politeness::none()).unwrap())
    }

    #[tokio::test]
    async fn reads_list_timeline() {
        let server = MockServer::start().await;
        let body = r#"{"data": [
            {"id": "111", "text": "New open weights model is out", "author_id": "42",
             "created_at": "2026-10-15T12:00:00.000Z",
             "public_metrics": {"like_count": 10, "retweet_count": 2, "reply_count": 1}},
            {"id": "222", "text": "Thread on evals"}
        ], "meta": {"result_count": 2}}"#;
        Mock::given(method("GET"))
            .and(path("/2/lists/1959163650708840833/tweets"))
            .and(query_param("max_results", "20"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = SocialListAdapter::new(http(), &server.uri(), Some("token-1".into()), 20);
        let source = SourceConfig::new(SourceKind::Social, "AI list", "1959163650708840833");
        let items = adapter.try_fetch(&source).await.expect("fetch");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "New open weights model is out");
        assert_eq!(items[0].url.as_deref(), Some("https://twitter.com/i/web/status/111"));
        assert!(items[0].body.contains("Likes: 10"));
        assert!(items[0].published_at.is_some());
    }

    #[tokio::test]
    async fn missing_token_returns_empty_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = SocialListAdapter::new(http(), &server.uri(), None, 20);
        let source = SourceConfig::new(SourceKind::Social, "AI list", "123");
        assert!(adapter.try_fetch(&source).await.expect("no error").is_empty());
    }

    #[tokio::test]
    async fn empty_timeline_has_no_data_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"meta": {"result_count": 0}}"#))
            .mount(&server)
            .await;

        let adapter = SocialListAdapter::new(http(), &server.uri(), Some("t".into()), 20);
        let source = SourceConfig::new(SourceKind::Social, "AI list", "123");
        assert!(adapter.try_fetch(&source).await.expect("fetch").is_empty());
    }
}
