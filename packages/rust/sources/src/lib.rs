//! Source adapters for aidigest.
//!
//! This crate provides:
//! - [`HttpClient`], the shared client with per-origin politeness delays
//! - [`text`], markup cleaning for item bodies
//! - [`adapters`], one [`SourceAdapter`] per source kind, dispatched through
//!   [`AdapterRegistry`]

pub mod adapters;
pub mod http;
pub mod text;

pub use adapters::{
    AdapterRegistry, FeedAdapter, ModelHubAdapter, PaperAdapter, RepoTrendingAdapter,
    ScrapeAdapter, SocialListAdapter, SourceAdapter,
};
pub use http::{HttpClient, Politeness};
