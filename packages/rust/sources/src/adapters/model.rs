//! Model hub adapter (Hugging Face models API).
//!
//! `source_url` is a JSON listing URL such as
//! `https://huggingface.co/api/models?sort=trending&limit=50`. Each model
//! becomes one item; its url is `{origin}/{model_id}`.

use std::sync::Arc;

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use super::SourceAdapter;
use crate::http::HttpClient;

/// Tags shown in the body.
const MAX_TAGS: usize = 5;

pub struct ModelHubAdapter {
    http: Arc<HttpClient>,
    max_items: usize,
}

impl ModelHubAdapter {
    pub fn new(http: Arc<HttpClient>, max_items: usize) -> Self {
        Self { http, max_items }
    }
}

/// One entry of the models listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubModel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default, rename = "pipeline_tag")]
    pipeline_tag: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl SourceAdapter for ModelHubAdapter {
    fn name(&self) -> &str {
        "model"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let origin = Url::parse(&source.source_url)
            .map_err(|e| AiDigestError::validation(format!("{}: {e}", source.source_url)))?
            .origin()
            .ascii_serialization();
        let models: Vec<HubModel> = self.http.get_json(&source.source_url, None).await?;

        Ok(models
            .into_iter()
            .filter_map(|m| model_to_item(m, &origin, source))
            .take(self.max_items)
            .collect())
    }
}

fn model_to_item(model: HubModel, origin: &str, source: &SourceConfig) -> Option<RawItem> {
    let id = model.id.or(model.model_id).filter(|id| !id.is_empty())?;
    let pipeline = model.pipeline_tag.as_deref().unwrap_or("unspecified");
    let author = model
        .author
        .clone()
        .or_else(|| id.split_once('/').map(|(a, _)| a.to_string()))
        .unwrap_or_else(|| "unknown".into());
    let tags = model
        .tags
        .iter()
        .take(MAX_TAGS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let body = format!(
        "Model: {}\nAuthor: {author}\nPipeline: {pipeline}\nTags: {tags}\nDownloads: {}\nLikes: {}",
        id, model.downloads, model.likes
    );

    Some(
        RawItem::new(
            SourceKind::Model,
            &source.source_name,
            format!("Hugging Face model: {id}"),
            body,
        )
        .with_url(format!("{origin}/{id}"))
        .with_published_at(model.last_modified.or(model.created_at)),
    )
}
