//! Core processing for aidigest.
//!
//! This crate ties the source adapters and storage together:
//! - [`dedup`], in-batch duplicate removal
//! - [`filter`], the per-kind importance filter
//! - [`classifier`] and [`insight`], the external classifier and the insight
//!   generator built on it
//! - [`pipeline`], the stage machine driving a run
//! - [`digest`], daily insight queries

pub mod classifier;
pub mod dedup;
pub mod digest;
pub mod filter;
pub mod insight;
pub mod pipeline;

pub use classifier::{Classifier, DisabledClassifier, OpenAiCompatibleClassifier};
pub use dedup::dedupe;
pub use filter::{FilterOutcome, FilterTier, ImportanceFilter, target_count};
pub use insight::{CategoryRule, CategoryRules, ClassifierInsightGenerator, InsightGenerator};
pub use pipeline::{
    Pipeline, PipelineOptions, ProgressReporter, RunSummary, SilentProgress, Stage,
    cleanup_older_than,
};
