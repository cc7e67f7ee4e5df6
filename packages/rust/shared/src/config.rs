//! Application configuration for aidigest.
//!
//! User config lives at `~/.aidigest/aidigest.toml`.
//! CLI flags override config file values, which override defaults.
//! The loaded [`AppConfig`] is passed down explicitly; nothing reads it globally.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AiDigestError, Result};
use crate::types::{SOCIAL_LIST_PLACEHOLDER, SourceConfig, SourceKind};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "aidigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".aidigest";

/// Retention rate used for any kind without a valid configured rate.
pub const DEFAULT_RETENTION_RATE: f64 = 0.25;

// ---------------------------------------------------------------------------
// Config structs (matching aidigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub adapters: AdaptersConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Seed entries for the source registry.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            classifier: ClassifierConfig::default(),
            adapters: AdaptersConfig::default(),
            filter: FilterConfig::default(),
            processing: ProcessingConfig::default(),
            sources: default_sources(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; a leading `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Inserted rows per commit during ingestion.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Processed rows older than this many days are removed by `cleanup`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            batch_size: default_batch_size(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_db_path() -> String {
    "~/.aidigest/aidigest.db".into()
}
fn default_batch_size() -> usize {
    10
}
fn default_retention_days() -> u32 {
    30
}

/// `[classifier]` section: an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_classifier_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_classifier_timeout() -> u64 {
    60
}

/// `[adapters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptersConfig {
    /// Timeout for every outbound request.
    #[serde(default = "default_adapter_timeout")]
    pub timeout_secs: u64,

    /// Lower bound of the randomized pause between requests.
    #[serde(default = "default_politeness_min")]
    pub politeness_min_ms: u64,

    /// Upper bound of the randomized pause between requests.
    #[serde(default = "default_politeness_max")]
    pub politeness_max_ms: u64,

    /// Most recent entries taken from one source.
    #[serde(default = "default_max_items")]
    pub max_items_per_source: usize,

    /// Detail pages followed per scraped index page.
    #[serde(default = "default_scrape_max_articles")]
    pub scrape_max_articles: usize,

    /// Sources fetched at the same time.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Base URL of the social timeline API.
    #[serde(default = "default_social_api_base")]
    pub social_api_base: String,

    /// Name of the env var holding the social API bearer token.
    #[serde(default = "default_social_bearer_env")]
    pub social_bearer_env: String,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_adapter_timeout(),
            politeness_min_ms: default_politeness_min(),
            politeness_max_ms: default_politeness_max(),
            max_items_per_source: default_max_items(),
            scrape_max_articles: default_scrape_max_articles(),
            fetch_concurrency: default_fetch_concurrency(),
            social_api_base: default_social_api_base(),
            social_bearer_env: default_social_bearer_env(),
        }
    }
}

fn default_adapter_timeout() -> u64 {
    30
}
fn default_politeness_min() -> u64 {
    1000
}
fn default_politeness_max() -> u64 {
    3000
}
fn default_max_items() -> usize {
    20
}
fn default_scrape_max_articles() -> usize {
    10
}
fn default_fetch_concurrency() -> usize {
    4
}
fn default_social_api_base() -> String {
    "https://api.twitter.com".into()
}
fn default_social_bearer_env() -> String {
    "TWITTER_BEARER_TOKEN".into()
}

/// `[filter]` section: importance filter thresholds and scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// When false every fetched item is kept.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Items shown to the classifier per batch.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Body characters shown to the classifier per item.
    #[serde(default = "default_content_prefix_chars")]
    pub content_prefix_chars: usize,

    #[serde(default = "default_classifier_timeout")]
    pub classifier_timeout_secs: u64,

    /// Added per keyword found in the title.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    #[serde(default = "default_high_priority_weight")]
    pub high_priority_weight: f64,

    #[serde(default = "default_medium_priority_weight")]
    pub medium_priority_weight: f64,

    /// Titles longer than this many characters earn the bonus.
    #[serde(default = "default_title_length_threshold")]
    pub title_length_threshold: usize,

    #[serde(default = "default_title_length_bonus")]
    pub title_length_bonus: f64,

    /// Per source kind tables, keyed by [`SourceKind::as_str`].
    #[serde(default)]
    pub kinds: BTreeMap<String, KindFilterConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: default_sample_size(),
            content_prefix_chars: default_content_prefix_chars(),
            classifier_timeout_secs: default_classifier_timeout(),
            keyword_weight: default_keyword_weight(),
            high_priority_weight: default_high_priority_weight(),
            medium_priority_weight: default_medium_priority_weight(),
            title_length_threshold: default_title_length_threshold(),
            title_length_bonus: default_title_length_bonus(),
            kinds: BTreeMap::new(),
        }
    }
}

impl FilterConfig {
    /// Settings for one kind; an absent table yields the documented defaults.
    pub fn for_kind(&self, kind: SourceKind) -> KindFilterConfig {
        let mut cfg = self.kinds.get(kind.as_str()).cloned().unwrap_or_default();
        if !(cfg.retention_rate > 0.0 && cfg.retention_rate <= 1.0) {
            tracing::warn!(
                kind = %kind,
                retention_rate = cfg.retention_rate,
                "invalid retention rate, using default"
            );
            cfg.retention_rate = DEFAULT_RETENTION_RATE;
        }
        cfg
    }
}

fn default_true() -> bool {
    true
}
fn default_sample_size() -> usize {
    20
}
fn default_content_prefix_chars() -> usize {
    200
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_high_priority_weight() -> f64 {
    0.4
}
fn default_medium_priority_weight() -> f64 {
    0.2
}
fn default_title_length_threshold() -> usize {
    20
}
fn default_title_length_bonus() -> f64 {
    0.1
}

/// `[filter.kinds.<kind>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindFilterConfig {
    /// Fraction of the batch to keep, in `(0, 1]`.
    #[serde(default = "default_retention_rate")]
    pub retention_rate: f64,

    /// Title keywords that boost the fallback score.
    #[serde(default)]
    pub keyword_boost: Vec<String>,

    #[serde(default)]
    pub source_priority: SourcePriority,
}

impl Default for KindFilterConfig {
    fn default() -> Self {
        Self {
            retention_rate: DEFAULT_RETENTION_RATE,
            keyword_boost: Vec::new(),
            source_priority: SourcePriority::default(),
        }
    }
}

fn default_retention_rate() -> f64 {
    DEFAULT_RETENTION_RATE
}

/// Source-name fragments per priority tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePriority {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
}

/// `[processing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Classification attempts before a row is marked permanently failed.
    /// Absent means failed rows are retried on every run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Upper bound on one insight generation call.
    #[serde(default = "default_insight_timeout")]
    pub insight_timeout_secs: u64,

    /// Body characters sent for analysis.
    #[serde(default = "default_content_chars")]
    pub content_chars: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            insight_timeout_secs: default_insight_timeout(),
            content_chars: default_content_chars(),
        }
    }
}

fn default_insight_timeout() -> u64 {
    90
}
fn default_content_chars() -> usize {
    4000
}

/// The source list a fresh installation starts with.
pub fn default_sources() -> Vec<SourceConfig> {
    let entry = |kind, name: &str, url: &str, priority| SourceConfig {
        priority,
        ..SourceConfig::new(kind, name, url)
    };
    vec![
        entry(
            SourceKind::Paper,
            "arXiv AI/ML Papers",
            "http://export.arxiv.org/api/query?search_query=cat:cs.AI+OR+cat:cs.LG+OR+cat:cs.CL+OR+cat:cs.CV&sortBy=submittedDate&sortOrder=descending&max_results=50",
            1,
        ),
        entry(
            SourceKind::Model,
            "Hugging Face Trending Models",
            "https://huggingface.co/api/models?sort=trending&limit=50",
            1,
        ),
        entry(
            SourceKind::Repo,
            "GitHub Trending AI/ML",
            "https://github.com/trending?since=daily&language=python",
            2,
        ),
        entry(SourceKind::Social, "AI KOL Timeline List", SOCIAL_LIST_PLACEHOLDER, 1),
        entry(SourceKind::Feed, "OpenAI Blog", "https://openai.com/blog/rss.xml", 1),
        entry(SourceKind::Scrape, "Anthropic News", "https://www.anthropic.com/news", 1),
        entry(SourceKind::Feed, "DeepMind Blog", "https://www.deepmind.com/blog/rss.xml", 1),
        entry(SourceKind::Scrape, "Mistral AI News", "https://mistral.ai/news/", 2),
        entry(SourceKind::Feed, "Replicate Blog", "https://replicate.com/blog/rss.xml", 2),
        entry(SourceKind::Feed, "TechCrunch AI", "https://techcrunch.com/tag/ai/feed/", 2),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.aidigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AiDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.aidigest/aidigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AiDigestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AiDigestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file at `path` (or the default location).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AiDigestError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AiDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AiDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| AiDigestError::config("could not determine home directory"))?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the classifier API key from the env var named in the config.
pub fn classifier_api_key(config: &ClassifierConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(AiDigestError::config(format!(
            "classifier API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("DEEPSEEK_API_KEY"));
        assert!(toml_str.contains("OpenAI Blog"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.storage.batch_size, 10);
        assert_eq!(parsed.storage.retention_days, 30);
        assert_eq!(parsed.classifier.api_key_env, "DEEPSEEK_API_KEY");
        assert_eq!(parsed.sources.len(), default_sources().len());
        assert!(parsed.processing.max_attempts.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").expect("parse empty");
        assert_eq!(config.adapters.politeness_min_ms, 1000);
        assert_eq!(config.adapters.politeness_max_ms, 3000);
        assert_eq!(config.filter.sample_size, 20);
        assert!(!config.sources.is_empty());
    }

    #[test]
    fn filter_kind_defaults_when_absent() {
        let config = FilterConfig::default();
        let feed = config.for_kind(SourceKind::Feed);
        assert_eq!(feed.retention_rate, 0.25);
        assert!(feed.keyword_boost.is_empty());
        assert!(feed.source_priority.high.is_empty());
        assert!(feed.source_priority.medium.is_empty());
    }

    #[test]
    fn filter_kind_tables_parse() {
        let toml_str = r#"
[filter.kinds.paper]
retention_rate = 0.2
keyword_boost = ["llm", "diffusion"]

[filter.kinds.feed]
retention_rate = 1.5

[filter.kinds.feed.source_priority]
high = ["OpenAI"]
medium = ["TechCrunch"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let paper = config.filter.for_kind(SourceKind::Paper);
        assert_eq!(paper.retention_rate, 0.2);
        assert_eq!(paper.keyword_boost, vec!["llm", "diffusion"]);

        // Out-of-range rate falls back to the default.
        let feed = config.filter.for_kind(SourceKind::Feed);
        assert_eq!(feed.retention_rate, DEFAULT_RETENTION_RATE);
        assert_eq!(feed.source_priority.high, vec!["OpenAI"]);
    }

    #[test]
    fn explicit_empty_sources() {
        let config: AppConfig = toml::from_str("sources = []").expect("parse");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn max_attempts_parses() {
        let config: AppConfig =
            toml::from_str("[processing]\nmax_attempts = 3").expect("parse");
        assert_eq!(config.processing.max_attempts, Some(3));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
        let expanded = expand_home("~/.aidigest/a.db").unwrap();
        assert!(expanded.ends_with(".aidigest/a.db"));
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn api_key_validation() {
        let config = ClassifierConfig {
            // Unique name to avoid interfering with other tests
            api_key_env: "AIDIGEST_TEST_NONEXISTENT_KEY_12345".into(),
            ..Default::default()
        };
        let result = classifier_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
