//! Core domain types: fetched items, stored rows, insights, and registry entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AiDigestError;

/// Number of body characters that, together with the title, form the
/// fallback identity of an item without a url.
pub const DEDUP_PREFIX_CHARS: usize = 100;

/// Neutral importance score used when the classifier gives none.
pub const DEFAULT_IMPORTANCE_SCORE: f64 = 0.5;

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Structural category of an ingestion source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS/Atom feed.
    #[serde(alias = "rss")]
    Feed,
    /// Paper index (arXiv query API).
    #[serde(alias = "arxiv")]
    Paper,
    /// Model hub listing (Hugging Face API).
    #[serde(alias = "huggingface")]
    Model,
    /// Repository trending page (GitHub).
    #[serde(alias = "github")]
    Repo,
    /// Generic scraped web page.
    #[serde(alias = "web_scrape")]
    Scrape,
    /// Social timeline list.
    #[serde(alias = "twitter", alias = "twitter_list", alias = "social_list")]
    Social,
}

impl SourceKind {
    /// Every kind, in registry dispatch order.
    pub const ALL: [SourceKind; 6] = [
        Self::Feed,
        Self::Paper,
        Self::Model,
        Self::Repo,
        Self::Scrape,
        Self::Social,
    ];

    /// Stable storage/config key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Paper => "paper",
            Self::Model => "model",
            Self::Repo => "repo",
            Self::Scrape => "scrape",
            Self::Social => "social",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = AiDigestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" => Ok(Self::Feed),
            "paper" | "arxiv" => Ok(Self::Paper),
            "model" | "huggingface" => Ok(Self::Model),
            "repo" | "github" => Ok(Self::Repo),
            "scrape" | "web_scrape" => Ok(Self::Scrape),
            "social" | "twitter" | "twitter_list" | "social_list" => Ok(Self::Social),
            other => Err(AiDigestError::validation(format!(
                "unknown source kind '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// A UUID v7 identifier for stored rows (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub Uuid);

impl ContentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// RawItem
// ---------------------------------------------------------------------------

/// A unit of freshly fetched content from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Kind of the source that produced this item.
    pub source_type: SourceKind,
    /// Registry name of the producing source.
    pub source_name: String,
    /// Title; may be empty.
    pub title: String,
    /// Normalized plain-text body; must be non-empty.
    pub body: String,
    /// Canonical link, the primary dedup key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Publication time reported by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// When the adapter produced the item.
    pub fetched_at: DateTime<Utc>,
}

impl RawItem {
    /// Create an item stamped with the current fetch time.
    pub fn new(
        source_type: SourceKind,
        source_name: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            source_name: source_name.into(),
            title: title.into().trim().to_string(),
            body: body.into().trim().to_string(),
            url: None,
            published_at: None,
            fetched_at: Utc::now(),
        }
    }

    /// Attach a url. Blank urls are treated as absent.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let url = url.trim();
        self.url = (!url.is_empty()).then(|| url.to_string());
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// `true` when the body survives normalization.
    pub fn is_valid(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Title followed by the first [`DEDUP_PREFIX_CHARS`] characters of the body.
    pub fn dedup_prefix(&self) -> String {
        let mut prefix = self.title.clone();
        prefix.extend(self.body.chars().take(DEDUP_PREFIX_CHARS));
        prefix
    }

    /// Storage identity: the url when present, otherwise a SHA-256 of
    /// [`RawItem::dedup_prefix`].
    pub fn dedup_key(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(self.dedup_prefix().as_bytes());
                format!("sha256:{:x}", hasher.finalize())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StoredContent
// ---------------------------------------------------------------------------

/// Durable counterpart of a [`RawItem`] plus its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredContent {
    /// Identity assigned at persistence.
    pub id: ContentId,
    /// The item as it was stored.
    pub item: RawItem,
    /// Set once a classification attempt completed, or retries ran out.
    pub is_processed: bool,
    /// Last classification error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    /// Classification attempts made so far.
    pub attempts: u32,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
}

impl StoredContent {
    /// Processed without an insight: retries are exhausted.
    pub fn is_permanently_failed(&self) -> bool {
        self.is_processed && self.processing_error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Insight
// ---------------------------------------------------------------------------

/// Clamp a score into `[0, 1]`; NaN becomes the neutral default.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        DEFAULT_IMPORTANCE_SCORE
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Insight fields produced by the generator, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInsight {
    pub summary: String,
    pub analysis: String,
    /// Free-text taxonomy label.
    pub category: String,
    /// Always within `[0, 1]`.
    pub importance_score: f64,
    /// Set when the generator returned a degraded result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NewInsight {
    pub fn new(
        summary: impl Into<String>,
        analysis: impl Into<String>,
        category: impl Into<String>,
        importance_score: f64,
    ) -> Self {
        Self {
            summary: summary.into(),
            analysis: analysis.into(),
            category: category.into(),
            importance_score: clamp_score(importance_score),
            error: None,
        }
    }

    pub fn degraded(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A persisted insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: ContentId,
    /// Owning [`StoredContent`].
    pub raw_content_id: ContentId,
    pub summary: String,
    pub analysis: String,
    pub category: String,
    pub importance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An insight joined with the metadata of the item it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightWithSource {
    #[serde(flatten)]
    pub insight: Insight,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source_name: String,
    pub source_type: SourceKind,
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Placeholder list id shipped in sample configurations.
pub const SOCIAL_LIST_PLACEHOLDER: &str = "your_twitter_list_id_here";

/// Registry entry controlling which adapters run.
///
/// `source_url` depends on `source_type`: a feed URL, an API query URL, a
/// page URL, or an opaque list id for social timelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_type: SourceKind,
    pub source_name: String,
    pub source_url: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Lower runs first.
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_active() -> bool {
    true
}
fn default_priority() -> i64 {
    1
}

impl SourceConfig {
    pub fn new(
        source_type: SourceKind,
        source_name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            source_name: source_name.into(),
            source_url: source_url.into(),
            is_active: true,
            priority: default_priority(),
        }
    }

    /// A social list whose id is still a placeholder counts as unconfigured.
    pub fn is_configured(&self) -> bool {
        match self.source_type {
            SourceKind::Social => {
                let id = self.source_url.trim();
                !id.is_empty() && id != SOCIAL_LIST_PLACEHOLDER
            }
            _ => !self.source_url.trim().is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingStats
// ---------------------------------------------------------------------------

/// Snapshot of the processing state of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_raw_content: u64,
    pub processed_content: u64,
    pub unprocessed_content: u64,
    /// Processed rows that carry an error and no insight.
    pub failed_content: u64,
    pub total_insights: u64,
    /// Stored rows per source kind.
    pub by_source_type: BTreeMap<String, u64>,
}

impl ProcessingStats {
    /// Share of stored rows already processed, in percent.
    pub fn processing_rate(&self) -> f64 {
        if self.total_raw_content == 0 {
            0.0
        } else {
            self.processed_content as f64 / self.total_raw_content as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_roundtrip() {
        let id = ContentId::new();
        let s = id.to_string();
        let parsed: ContentId = s.parse().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn source_kind_accepts_legacy_names() {
        assert_eq!("rss".parse::<SourceKind>().unwrap(), SourceKind::Feed);
        assert_eq!("arxiv".parse::<SourceKind>().unwrap(), SourceKind::Paper);
        assert_eq!("twitter_list".parse::<SourceKind>().unwrap(), SourceKind::Social);
        assert!("podcast".parse::<SourceKind>().is_err());

        let cfg: SourceConfig = toml::from_str(
            r#"
source_type = "web_scrape"
source_name = "Anthropic News"
source_url = "https://www.anthropic.com/news"
"#,
        )
        .expect("parse legacy kind");
        assert_eq!(cfg.source_type, SourceKind::Scrape);
        assert!(cfg.is_active);
        assert_eq!(cfg.priority, 1);
    }

    #[test]
    fn source_kind_serializes_canonical_name() {
        let json = serde_json::to_string(&SourceKind::Model).unwrap();
        assert_eq!(json, r#""model""#);
    }

    #[test]
    fn placeholder_social_list_is_unconfigured() {
        let placeholder = SourceConfig::new(SourceKind::Social, "AI list", SOCIAL_LIST_PLACEHOLDER);
        assert!(!placeholder.is_configured());

        let blank = SourceConfig::new(SourceKind::Social, "AI list", "  ");
        assert!(!blank.is_configured());

        let real = SourceConfig::new(SourceKind::Social, "AI list", "1959163650708840833");
        assert!(real.is_configured());
    }

    #[test]
    fn blank_url_is_absent() {
        let item = RawItem::new(SourceKind::Feed, "blog", "t", "body").with_url("   ");
        assert!(item.url.is_none());
    }

    #[test]
    fn dedup_key_prefers_url() {
        let item = RawItem::new(SourceKind::Feed, "blog", "t", "body").with_url("https://a.test/1");
        assert_eq!(item.dedup_key(), "https://a.test/1");

        let no_url = RawItem::new(SourceKind::Feed, "blog", "t", "body");
        let key = no_url.dedup_key();
        assert!(key.starts_with("sha256:"));
        assert_eq!(key, RawItem::new(SourceKind::Paper, "other", "t", "body").dedup_key());
    }

    #[test]
    fn dedup_prefix_counts_characters_not_bytes() {
        let body = "é".repeat(150);
        let item = RawItem::new(SourceKind::Feed, "blog", "T", body);
        assert_eq!(item.dedup_prefix().chars().count(), 1 + DEDUP_PREFIX_CHARS);
    }

    #[test]
    fn whitespace_body_is_invalid() {
        let item = RawItem::new(SourceKind::Feed, "blog", "title", " \n\t ");
        assert!(!item.is_valid());
    }

    #[test]
    fn new_insight_clamps_score() {
        assert_eq!(NewInsight::new("s", "a", "c", 1.7).importance_score, 1.0);
        assert_eq!(NewInsight::new("s", "a", "c", -0.2).importance_score, 0.0);
        assert_eq!(NewInsight::new("s", "a", "c", f64::NAN).importance_score, 0.5);
    }

    #[test]
    fn processing_rate_handles_empty_store() {
        let stats = ProcessingStats::default();
        assert_eq!(stats.processing_rate(), 0.0);

        let stats = ProcessingStats {
            total_raw_content: 4,
            processed_content: 1,
            ..Default::default()
        };
        assert_eq!(stats.processing_rate(), 25.0);
    }
}
