//! Pipeline orchestrator: fetch → dedupe → filter → persist → classify.
//!
//! Stages run strictly in sequence. Per-source and per-item failures are
//! absorbed into counts and logs; only a stage-level failure (storage
//! unreachable) ends the run in [`Stage::Failed`]. Every entry point returns
//! a [`RunSummary`] rather than an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aidigest_shared::{AiDigestError, AppConfig, RawItem, Result, SourceConfig, SourceKind};
use aidigest_sources::{AdapterRegistry, HttpClient};
use aidigest_storage::{ClassificationOutcome, Storage};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{Classifier, DisabledClassifier, OpenAiCompatibleClassifier};
use crate::dedup::dedupe;
use crate::filter::ImportanceFilter;
use crate::insight::{ClassifierInsightGenerator, InsightGenerator};

// ---------------------------------------------------------------------------
// Stage and summary
// ---------------------------------------------------------------------------

/// Position of a run in the linear stage machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Fetching,
    Deduping,
    Filtering,
    Persisting,
    Classifying,
    Done,
    /// Absorbing state after an unrecoverable error.
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Deduping => "deduping",
            Self::Filtering => "filtering",
            Self::Persisting => "persisting",
            Self::Classifying => "classifying",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Items returned by all adapters.
    pub fetched: usize,
    /// Items left after dropping empty bodies and in-batch duplicates.
    pub deduped: usize,
    /// Items kept by the importance filter.
    pub filtered: usize,
    /// Newly stored rows.
    pub stored: usize,
    /// Items already in storage.
    pub skipped: usize,
    /// Items whose insert failed.
    pub store_failed: usize,
    /// Rows classified successfully.
    pub processed: usize,
    /// Rows whose classification attempt failed.
    pub failed: usize,
    pub elapsed: Duration,
    /// Final stage: [`Stage::Done`] or [`Stage::Failed`].
    pub stage: Stage,
    /// Stage the run was in when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, stage: Stage);
    /// Called as each source's fetch completes, in registry order.
    fn source_fetched(&self, source: &str, count: usize, current: usize, total: usize);
    /// Called after each stored row is classified.
    fn item_classified(&self, current: usize, total: usize);
    /// Called once with the final summary.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn source_fetched(&self, _source: &str, _count: usize, _current: usize, _total: usize) {}
    fn item_classified(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Tunables threaded into the [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Items per storage transaction.
    pub batch_size: usize,
    /// Classification attempts before a row is given up on; `None` retries forever.
    pub max_attempts: Option<u32>,
    pub insight_timeout: Duration,
    /// Adapters fetching at the same time.
    pub fetch_concurrency: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.storage.batch_size,
            max_attempts: config.processing.max_attempts,
            insight_timeout: Duration::from_secs(config.processing.insight_timeout_secs),
            fetch_concurrency: config.adapters.fetch_concurrency,
        }
    }
}

pub struct Pipeline {
    storage: Arc<Storage>,
    adapters: AdapterRegistry,
    filter: ImportanceFilter,
    insights: Arc<dyn InsightGenerator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        storage: Arc<Storage>,
        adapters: AdapterRegistry,
        filter: ImportanceFilter,
        insights: Arc<dyn InsightGenerator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            storage,
            adapters,
            filter,
            insights,
            options,
        }
    }

    /// Wire the built-in adapters, classifier and generator from config.
    ///
    /// A missing classifier API key is not an error: the filter falls back to
    /// its rules and insights come back degraded.
    pub fn from_config(config: &AppConfig, storage: Arc<Storage>) -> Result<Self> {
        let http = Arc::new(HttpClient::new(&config.adapters)?);
        let adapters = AdapterRegistry::new(http, &config.adapters);

        let classifier: Arc<dyn Classifier> =
            match OpenAiCompatibleClassifier::from_config(&config.classifier) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    warn!(error = %e, "classifier unavailable, continuing without it");
                    Arc::new(DisabledClassifier::new(e.to_string()))
                }
            };

        let filter = ImportanceFilter::new(classifier.clone(), config.filter.clone());
        let insights = Arc::new(ClassifierInsightGenerator::new(
            classifier,
            config.processing.content_chars,
        ));

        Ok(Self::new(
            storage,
            adapters,
            filter,
            insights,
            PipelineOptions::from_config(config),
        ))
    }

    /// Every stage: fetch, dedupe, filter, persist, then classify all
    /// unprocessed rows.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn run_full(
        &self,
        sources: &[SourceConfig],
        progress: &dyn ProgressReporter,
    ) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        info!("starting full run");

        let result: Result<()> = async {
            self.storage.ping().await?;
            self.ingest(sources, &mut summary, progress).await?;
            self.classify(&mut summary, progress).await
        }
        .await;

        finish(summary, started, result, progress)
    }

    /// Fetch, dedupe, filter and persist; no classification.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn fetch_and_store(
        &self,
        sources: &[SourceConfig],
        progress: &dyn ProgressReporter,
    ) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        info!("starting fetch run");

        let result: Result<()> = async {
            self.storage.ping().await?;
            self.ingest(sources, &mut summary, progress).await
        }
        .await;

        finish(summary, started, result, progress)
    }

    /// Classify every unprocessed row already in storage.
    #[instrument(skip_all)]
    pub async fn process_unprocessed(&self, progress: &dyn ProgressReporter) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        info!("starting processing run");

        let result: Result<()> = async {
            self.storage.ping().await?;
            self.classify(&mut summary, progress).await
        }
        .await;

        finish(summary, started, result, progress)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn ingest(
        &self,
        sources: &[SourceConfig],
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        // --- Stage: Fetching ---
        enter(summary, Stage::Fetching, progress);
        let fetched = self.fetch_all(sources, progress).await;
        summary.fetched = fetched.len();
        info!(count = summary.fetched, "fetch complete");

        // --- Stage: Deduping ---
        enter(summary, Stage::Deduping, progress);
        let valid: Vec<RawItem> = fetched.into_iter().filter(RawItem::is_valid).collect();
        let unique = dedupe(valid);
        summary.deduped = unique.len();
        info!(
            count = summary.deduped,
            dropped = summary.fetched - summary.deduped,
            "dedupe complete"
        );

        // --- Stage: Filtering ---
        enter(summary, Stage::Filtering, progress);
        let kept = self.filter_by_kind(unique).await;
        summary.filtered = kept.len();
        info!(count = summary.filtered, "filter complete");

        // --- Stage: Persisting ---
        enter(summary, Stage::Persisting, progress);
        let report = self
            .storage
            .upsert_raw(&kept, self.options.batch_size)
            .await?;
        summary.stored = report.inserted;
        summary.skipped = report.skipped;
        summary.store_failed = report.failed;
        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            failed = report.failed,
            "persist complete"
        );
        Ok(())
    }

    /// Run every runnable source on its own task, bounded by
    /// `fetch_concurrency`, and concatenate the results in input order.
    async fn fetch_all(
        &self,
        sources: &[SourceConfig],
        progress: &dyn ProgressReporter,
    ) -> Vec<RawItem> {
        let runnable: Vec<SourceConfig> = sources
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| {
                let configured = s.is_configured();
                if !configured {
                    debug!(source = %s.source_name, "source not configured, skipping");
                }
                configured
            })
            .cloned()
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.options.fetch_concurrency.max(1)));
        let handles: Vec<_> = runnable
            .iter()
            .map(|source| {
                let adapter = self.adapters.adapter_for(source.source_type);
                let source = source.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    adapter.fetch(&source).await
                })
            })
            .collect();

        let total = handles.len();
        let mut items = Vec::new();
        for (i, (handle, source)) in handles.into_iter().zip(&runnable).enumerate() {
            match handle.await {
                Ok(batch) => {
                    progress.source_fetched(&source.source_name, batch.len(), i + 1, total);
                    items.extend(batch);
                }
                Err(e) => {
                    warn!(source = %source.source_name, error = %e, "fetch task aborted, skipping source");
                    progress.source_fetched(&source.source_name, 0, i + 1, total);
                }
            }
        }
        items
    }

    /// Apply the importance filter to each kind's batch separately.
    async fn filter_by_kind(&self, items: Vec<RawItem>) -> Vec<RawItem> {
        let mut kept = Vec::with_capacity(items.len());
        let mut rest = items;
        for kind in SourceKind::ALL {
            let (batch, others): (Vec<RawItem>, Vec<RawItem>) =
                rest.into_iter().partition(|item| item.source_type == kind);
            rest = others;
            if batch.is_empty() {
                continue;
            }
            let before = batch.len();
            let outcome = self.filter.filter_kind(batch, kind).await;
            info!(kind = %kind, before, after = outcome.items.len(), tier = %outcome.tier, "filtered kind");
            kept.extend(outcome.items);
        }
        kept
    }

    async fn classify(&self, summary: &mut RunSummary, progress: &dyn ProgressReporter) -> Result<()> {
        // --- Stage: Classifying ---
        enter(summary, Stage::Classifying, progress);
        let pending = self.storage.list_unprocessed().await?;
        let total = pending.len();
        info!(count = total, "classifying unprocessed content");

        for (i, row) in pending.iter().enumerate() {
            let content = item_content(&row.item);
            let timeout = self.options.insight_timeout;
            let outcome = match tokio::time::timeout(
                timeout,
                self.insights.generate_insight(&content, row.item.source_type),
            )
            .await
            {
                Ok(Ok(insight)) => ClassificationOutcome::Insight(insight),
                Ok(Err(e)) => ClassificationOutcome::Failed(e.to_string()),
                Err(_) => ClassificationOutcome::Failed(
                    AiDigestError::Classifier(format!("insight generation timed out after {timeout:?}"))
                        .to_string(),
                ),
            };
            let succeeded = matches!(outcome, ClassificationOutcome::Insight(_));

            match self
                .storage
                .mark_processed(&row.id, outcome, self.options.max_attempts)
                .await
            {
                Ok(_) if succeeded => summary.processed += 1,
                Ok(exhausted) => {
                    summary.failed += 1;
                    if exhausted {
                        warn!(id = %row.id, title = %row.item.title, "classification retries exhausted");
                    } else {
                        warn!(id = %row.id, title = %row.item.title, "classification failed, will retry next run");
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(id = %row.id, error = %e, "failed to record classification, skipping");
                }
            }
            progress.item_classified(i + 1, total);
        }

        info!(processed = summary.processed, failed = summary.failed, "classification complete");
        Ok(())
    }
}

/// Delete processed rows older than `days`. Returns the number removed.
pub async fn cleanup_older_than(storage: &Storage, days: u32) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    let removed = storage.cleanup_processed_before(cutoff).await?;
    info!(removed, days, "cleanup complete");
    Ok(removed)
}

fn enter(summary: &mut RunSummary, stage: Stage, progress: &dyn ProgressReporter) {
    debug!(from = %summary.stage, to = %stage, "stage transition");
    summary.stage = stage;
    progress.stage(stage);
}

fn finish(
    mut summary: RunSummary,
    started: Instant,
    result: Result<()>,
    progress: &dyn ProgressReporter,
) -> RunSummary {
    summary.elapsed = started.elapsed();
    match result {
        Ok(()) => {
            summary.stage = Stage::Done;
            summary.success = true;
            info!(elapsed_ms = summary.elapsed.as_millis() as u64, "run complete");
        }
        Err(e) => {
            error!(stage = %summary.stage, error = %e, "run failed");
            summary.failed_stage = Some(summary.stage);
            summary.stage = Stage::Failed;
            summary.success = false;
            summary.error = Some(e.to_string());
        }
    }
    progress.stage(summary.stage);
    progress.done(&summary);
    summary
}

/// Text handed to the insight generator for one stored item.
fn item_content(item: &RawItem) -> String {
    if item.title.is_empty() {
        item.body.clone()
    } else {
        format!("{}\n\n{}", item.title, item.body)
    }
}
