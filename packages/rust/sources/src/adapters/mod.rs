//! Source adapter trait and the built-in adapter per [`SourceKind`].
//!
//! Every adapter reads [`SourceConfig::source_url`] its own way (documented on
//! each adapter) and turns the remote payload into [`RawItem`]s.

mod feed;
mod model;
mod paper;
mod repo;
mod scrape;
mod social;

use std::sync::Arc;

use aidigest_shared::{AdaptersConfig, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::http::HttpClient;

pub use feed::FeedAdapter;
pub use model::ModelHubAdapter;
pub use paper::PaperAdapter;
pub use repo::RepoTrendingAdapter;
pub use scrape::ScrapeAdapter;
pub use social::SocialListAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One kind of ingestion source.
///
/// Implementors provide [`SourceAdapter::try_fetch`]; callers use
/// [`SourceAdapter::fetch`], which never fails.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Fetch items for one registry entry.
    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>>;

    /// Fetch items, reducing any failure to an empty result plus a log event.
    /// Items with an empty body are dropped.
    async fn fetch(&self, source: &SourceConfig) -> Vec<RawItem> {
        let span = info_span!("fetch", adapter = self.name(), source = %source.source_name);
        async {
            match self.try_fetch(source).await {
                Ok(mut items) => {
                    let before = items.len();
                    items.retain(RawItem::is_valid);
                    if items.len() < before {
                        debug!(dropped = before - items.len(), "dropped items with empty body");
                    }
                    if items.is_empty() {
                        info!("source returned no items");
                    } else {
                        info!(count = items.len(), "fetched items");
                    }
                    items
                }
                Err(e) => {
                    warn!(url = %source.source_url, error = %e, "fetch failed, skipping source");
                    Vec::new()
                }
            }
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Exhaustive mapping from [`SourceKind`] to its adapter.
#[derive(Clone)]
pub struct AdapterRegistry {
    feed: Arc<dyn SourceAdapter>,
    paper: Arc<dyn SourceAdapter>,
    model: Arc<dyn SourceAdapter>,
    repo: Arc<dyn SourceAdapter>,
    scrape: Arc<dyn SourceAdapter>,
    social: Arc<dyn SourceAdapter>,
}

impl AdapterRegistry {
    /// Built-in adapters sharing one HTTP client.
    ///
    /// The social bearer token is read once here from the env var named by
    /// `social_bearer_env`.
    pub fn new(http: Arc<HttpClient>, config: &AdaptersConfig) -> Self {
        let max = config.max_items_per_source;
        let token = std::env::var(&config.social_bearer_env)
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            feed: Arc::new(FeedAdapter::new(http.clone(), max)),
            paper: Arc::new(PaperAdapter::new(http.clone(), max)),
            model: Arc::new(ModelHubAdapter::new(http.clone(), max)),
            repo: Arc::new(RepoTrendingAdapter::new(http.clone(), max)),
            scrape: Arc::new(ScrapeAdapter::new(http.clone(), config.scrape_max_articles)),
            social: Arc::new(SocialListAdapter::new(
                http,
                &config.social_api_base,
                token,
                max,
            )),
        }
    }

    pub fn adapter_for(&self, kind: SourceKind) -> Arc<dyn SourceAdapter> {
        match kind {
            SourceKind::Feed => self.feed.clone(),
            SourceKind::Paper => self.paper.clone(),
            SourceKind::Model => self.model.clone(),
            SourceKind::Repo => self.repo.clone(),
            SourceKind::Scrape => self.scrape.clone(),
            SourceKind::Social => self.social.clone(),
        }
    }

    /// Replace the adapter for one kind.
    pub fn with(mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) -> Self {
        let slot = match kind {
            SourceKind::Feed => &mut self.feed,
            SourceKind::Paper => &mut self.paper,
            SourceKind::Model => &mut self.model,
            SourceKind::Repo => &mut self.repo,
            SourceKind::Scrape => &mut self.scrape,
            SourceKind::Social => &mut self.social,
        };
        *slot = adapter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidigest_shared::AiDigestError;
    use std::time::Duration;

    struct Failing;

    #[async_trait]
    impl SourceAdapter for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn try_fetch(&self, _source: &SourceConfig) -> Result<Vec<RawItem>> {
            Err(AiDigestError::Network("connection refused".into()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
            Ok(vec![
                RawItem::new(source.source_type, &source.source_name, "kept", "body"),
                RawItem::new(source.source_type, &source.source_name, "dropped", "  "),
            ])
        }
    }

    fn registry() -> AdapterRegistry {
        let http = Arc::new(
            HttpClient::with_politeness(Duration::from_secs(1), crate::Politeness::none())
                .expect("client"),
        );
        AdapterRegistry::new(http, &AdaptersConfig::default())
    }

    #[tokio::test]
    async fn failure_becomes_empty_result() {
        let source = SourceConfig::new(SourceKind::Feed, "down", "https://down.test/rss");
        assert!(Failing.fetch(&source).await.is_empty());
    }

    #[tokio::test]
    async fn empty_bodies_are_dropped() {
        let source = SourceConfig::new(SourceKind::Feed, "blog", "https://blog.test/rss");
        let items = Fixed.fetch(&source).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "kept");
    }

    #[test]
    fn dispatch_covers_every_kind() {
        let registry = registry();
        let names: Vec<String> = SourceKind::ALL
            .iter()
            .map(|k| registry.adapter_for(*k).name().to_string())
            .collect();
        assert_eq!(names, ["feed", "paper", "model", "repo", "scrape", "social"]);
    }

    #[test]
    fn override_replaces_one_kind() {
        let registry = registry().with(SourceKind::Repo, Arc::new(Fixed));
        assert_eq!(registry.adapter_for(SourceKind::Repo).name(), "fixed");
        assert_eq!(registry.adapter_for(SourceKind::Feed).name(), "feed");
    }
}
