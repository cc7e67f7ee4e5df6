//! Per-kind importance filter.
//!
//! Keeps `max(1, round(n * rate))` items of a batch. The classifier is asked
//! once per batch to pick indices from a bounded sample; if that call fails,
//! times out, or returns anything but a valid index list, the whole batch is
//! scored by deterministic rules instead. The two tiers are never mixed.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aidigest_shared::{
    AiDigestError, DEFAULT_RETENTION_RATE, FilterConfig, KindFilterConfig, RawItem, Result,
    SourceKind,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{Classifier, strip_code_fences};

/// Number of items a batch of `n` is reduced to at `rate`.
///
/// `0` for an empty batch, otherwise `max(1, round(n * rate))` capped at `n`.
pub fn target_count(n: usize, rate: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let target = (n as f64 * rate).round() as usize;
    target.clamp(1, n)
}

/// Which tier produced a [`FilterOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTier {
    Classifier,
    Rules,
    /// Filtering is switched off in configuration; the batch passed through.
    Disabled,
}

impl std::fmt::Display for FilterTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Classifier => "classifier",
            Self::Rules => "rules",
            Self::Disabled => "disabled",
        })
    }
}

#[derive(Debug)]
pub struct FilterOutcome {
    pub items: Vec<RawItem>,
    pub tier: FilterTier,
}

pub struct ImportanceFilter {
    classifier: Arc<dyn Classifier>,
    config: FilterConfig,
}

impl ImportanceFilter {
    pub fn new(classifier: Arc<dyn Classifier>, config: FilterConfig) -> Self {
        Self { classifier, config }
    }

    /// Filter a batch using the retention rate configured for `kind`.
    pub async fn filter_kind(&self, items: Vec<RawItem>, kind: SourceKind) -> FilterOutcome {
        let rate = self.config.for_kind(kind).retention_rate;
        self.filter(items, kind, rate).await
    }

    /// Reduce a single-kind batch to `target_count(items.len(), retention_rate)`.
    #[instrument(skip_all, fields(kind = %kind, count = items.len()))]
    pub async fn filter(
        &self,
        items: Vec<RawItem>,
        kind: SourceKind,
        retention_rate: f64,
    ) -> FilterOutcome {
        if !self.config.enabled {
            return FilterOutcome {
                items,
                tier: FilterTier::Disabled,
            };
        }

        let rate = if retention_rate > 0.0 && retention_rate <= 1.0 {
            retention_rate
        } else {
            warn!(retention_rate, "retention rate outside (0, 1], using default");
            DEFAULT_RETENTION_RATE
        };
        let target = target_count(items.len(), rate);
        if items.is_empty() {
            return FilterOutcome {
                items,
                tier: FilterTier::Rules,
            };
        }

        let kind_config = self.config.for_kind(kind);
        match self.classifier_select(&items, kind, target).await {
            Ok(indices) => {
                info!(kept = indices.len(), target, "classifier selected items");
                let keep: HashSet<usize> = indices.into_iter().collect();
                let items = items
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, item)| keep.contains(&i).then_some(item))
                    .collect();
                FilterOutcome {
                    items,
                    tier: FilterTier::Classifier,
                }
            }
            Err(e) => {
                warn!(error = %e, "classifier selection unusable, falling back to rules");
                FilterOutcome {
                    items: self.rule_select(items, &kind_config, target),
                    tier: FilterTier::Rules,
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Classifier tier
    // -----------------------------------------------------------------------

    async fn classifier_select(
        &self,
        items: &[RawItem],
        kind: SourceKind,
        target: usize,
    ) -> Result<Vec<usize>> {
        // The sample always holds at least `target` items so an exact
        // selection is reachable.
        let sample_len = items.len().min(self.config.sample_size.max(target).max(1));
        let sample = &items[..sample_len];
        let instruction = selection_instruction(kind, target);
        let content = self.format_sample(sample);

        let timeout = Duration::from_secs(self.config.classifier_timeout_secs);
        let reply = tokio::time::timeout(timeout, self.classifier.complete(&instruction, &content))
            .await
            .map_err(|_| {
                AiDigestError::Classifier(format!("selection timed out after {timeout:?}"))
            })??;

        debug!(reply_len = reply.len(), "classifier replied");
        parse_selected_indices(&reply, sample.len(), target)
    }

    fn format_sample(&self, sample: &[RawItem]) -> String {
        sample
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let prefix: String = item.body.chars().take(self.config.content_prefix_chars).collect();
                let mut line = format!("[{i}] {}\n{prefix}", item.title);
                if let Some(url) = &item.url {
                    line.push_str(&format!("\n{url}"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    // -----------------------------------------------------------------------
    // Rule tier
    // -----------------------------------------------------------------------

    /// Deterministic score of one item under `kind_config`.
    pub fn rule_score(&self, item: &RawItem, kind_config: &KindFilterConfig) -> f64 {
        let title = item.title.to_lowercase();
        let source = item.source_name.to_lowercase();
        let mut score = 0.0;

        for keyword in &kind_config.keyword_boost {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && title.contains(&keyword) {
                score += self.config.keyword_weight;
            }
        }

        let in_tier = |tier: &[String]| {
            tier.iter().any(|s| {
                let s = s.trim().to_lowercase();
                !s.is_empty() && source.contains(&s)
            })
        };
        if in_tier(&kind_config.source_priority.high) {
            score += self.config.high_priority_weight;
        } else if in_tier(&kind_config.source_priority.medium) {
            score += self.config.medium_priority_weight;
        }

        if item.title.chars().count() > self.config.title_length_threshold {
            score += self.config.title_length_bonus;
        }
        score
    }

    /// Top `target` items by [`Self::rule_score`], ties in input order.
    pub fn rule_select(
        &self,
        items: Vec<RawItem>,
        kind_config: &KindFilterConfig,
        target: usize,
    ) -> Vec<RawItem> {
        let mut scored: Vec<(f64, RawItem)> = items
            .into_iter()
            .map(|item| (self.rule_score(&item, kind_config), item))
            .collect();
        // `sort_by` is stable, so equal scores keep input order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.into_iter().take(target).map(|(_, item)| item).collect()
    }
}

fn selection_instruction(kind: SourceKind, target: usize) -> String {
    let focus = match kind {
        SourceKind::Paper => "novel methods, strong results, and broad relevance to AI practitioners",
        SourceKind::Social => "substantive announcements and discussion from credible voices",
        SourceKind::Model => "notable new models, strong adoption signals, and open releases",
        SourceKind::Repo => "useful tools with real traction, not tutorials or link lists",
        SourceKind::Feed | SourceKind::Scrape => {
            "major launches, research breakthroughs, and industry-moving news"
        }
    };
    format!(
        "You are curating a daily AI industry digest. Below are numbered {kind} items. \
         Select exactly {target} of the most important ones, prioritising {focus}. \
         Reply with JSON only, in the form {{\"selected_indices\": [0, 3]}}, using the \
         numbers shown in brackets."
    )
}

#[derive(Debug, Deserialize)]
struct Selection {
    selected_indices: Vec<i64>,
}

/// Validate a classifier reply in filter mode.
///
/// The reply must be a JSON object (optionally fenced) whose
/// `selected_indices` is a list of exactly `target` unique in-range
/// integers.
pub fn parse_selected_indices(reply: &str, sample_len: usize, target: usize) -> Result<Vec<usize>> {
    let text = strip_code_fences(reply);
    let selection: Selection = serde_json::from_str(text)
        .or_else(|first| {
            // Tolerate prose around a single JSON object.
            match (text.find('{'), text.rfind('}')) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&text[start..=end]).map_err(|_| first)
                }
                _ => Err(first),
            }
        })
        .map_err(|e| AiDigestError::parse(format!("selection reply is not valid: {e}")))?;

    let raw = selection.selected_indices;
    if raw.is_empty() {
        return Err(AiDigestError::parse("selection is empty"));
    }
    if raw.len() != target {
        return Err(AiDigestError::parse(format!(
            "selection has {} indices, expected {target}",
            raw.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut indices = Vec::with_capacity(raw.len());
    for i in raw {
        let idx = usize::try_from(i)
            .ok()
            .filter(|idx| *idx < sample_len)
            .ok_or_else(|| AiDigestError::parse(format!("index {i} out of range")))?;
        if !seen.insert(idx) {
            return Err(AiDigestError::parse(format!("index {idx} selected twice")));
        }
        indices.push(idx);
    }
    Ok(indices)
}
