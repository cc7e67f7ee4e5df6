//! Shared types, error model, and configuration for aidigest.
//!
//! This crate is the foundation depended on by all other aidigest crates.
//! It provides:
//! - [`AiDigestError`], the unified error type
//! - Domain types ([`RawItem`], [`StoredContent`], [`Insight`], [`SourceConfig`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdaptersConfig, AppConfig, ClassifierConfig, DEFAULT_RETENTION_RATE, FilterConfig,
    KindFilterConfig, ProcessingConfig, SourcePriority, StorageConfig, classifier_api_key,
    config_dir, config_file_path, default_sources, expand_home, init_config, load_config,
    load_config_from,
};
pub use error::{AiDigestError, Result};
pub use types::{
    ContentId, DEDUP_PREFIX_CHARS, DEFAULT_IMPORTANCE_SCORE, Insight, InsightWithSource,
    NewInsight, ProcessingStats, RawItem, SOCIAL_LIST_PLACEHOLDER, SourceConfig, SourceKind,
    StoredContent, clamp_score,
};
