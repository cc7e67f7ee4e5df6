//! libSQL persistence gateway (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding fetched items
//! (`raw_content`), their insights, and the source registry.
//!
//! **Access rules:**
//! - Pipeline runs: read-write, single writer, via [`Storage::open`]
//! - Reporting commands: read-only via [`Storage::open_readonly`]
//!
//! Stored content is never overwritten: re-ingesting an item whose dedup key
//! already exists is a skip.

mod migrations;

use std::path::Path;

use aidigest_shared::{
    AiDigestError, ContentId, Insight, InsightWithSource, NewInsight, ProcessingStats, RawItem,
    Result, SourceConfig, SourceKind, StoredContent, clamp_score,
};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};

const RAW_COLUMNS: &str = "id, source_type, source_name, title, body, url, published_at, \
     fetched_at, created_at, is_processed, processing_error, attempts";

/// Outcome of one classification attempt, as recorded by [`Storage::mark_processed`].
#[derive(Debug, Clone)]
pub enum ClassificationOutcome {
    /// The generator answered; the insight is stored and the row is done.
    Insight(NewInsight),
    /// The attempt failed with this description.
    Failed(String),
}

/// Counts from one [`Storage::upsert_raw`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    /// Items whose dedup key was already stored.
    pub skipped: usize,
    /// Items whose insert failed; the rest of their batch was kept.
    pub failed: usize,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AiDigestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(AiDigestError::storage)?;
        let conn = db.connect().map_err(AiDigestError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AiDigestError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(AiDigestError::storage)?;
        let conn = db.connect().map_err(AiDigestError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    AiDigestError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AiDigestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Cheap round trip proving the database answers.
    pub async fn ping(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT 1", params![])
            .await
            .map_err(AiDigestError::storage)?;
        rows.next().await.map_err(AiDigestError::storage)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw content
    // -----------------------------------------------------------------------

    /// Insert items whose dedup key is not stored yet.
    ///
    /// Commits once per `batch_size` items. A failing item is logged and
    /// counted while the rest of its batch proceeds; only a failure to begin
    /// or commit a batch aborts the call. Batches committed earlier stay.
    pub async fn upsert_raw(&self, items: &[RawItem], batch_size: usize) -> Result<UpsertReport> {
        self.check_writable()?;
        let mut report = UpsertReport::default();

        for batch in items.chunks(batch_size.max(1)) {
            let tx = self
                .conn
                .transaction()
                .await
                .map_err(|e| AiDigestError::Storage(format!("failed to begin batch: {e}")))?;
            let now = timestamp(&Utc::now());

            for item in batch {
                match insert_if_absent(&tx, item, &now).await {
                    Ok(true) => report.inserted += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(
                            source = %item.source_name,
                            title = %item.title,
                            error = %e,
                            "failed to store item"
                        );
                        report.failed += 1;
                    }
                }
            }

            tx.commit()
                .await
                .map_err(|e| AiDigestError::Storage(format!("failed to commit batch: {e}")))?;
            tracing::debug!(size = batch.len(), "committed batch");
        }

        Ok(report)
    }

    /// Look up a stored row by its dedup key.
    pub async fn find_by_dedup_key(&self, key: &str) -> Result<Option<StoredContent>> {
        let sql = format!("SELECT {RAW_COLUMNS} FROM raw_content WHERE dedup_key = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![key])
            .await
            .map_err(AiDigestError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AiDigestError::storage(e)),
        }
    }

    /// Get a stored row by id.
    pub async fn get_content(&self, id: &ContentId) -> Result<Option<StoredContent>> {
        let sql = format!("SELECT {RAW_COLUMNS} FROM raw_content WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(AiDigestError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AiDigestError::storage(e)),
        }
    }

    /// Rows still awaiting classification, oldest first.
    pub async fn list_unprocessed(&self) -> Result<Vec<StoredContent>> {
        let sql = format!(
            "SELECT {RAW_COLUMNS} FROM raw_content WHERE is_processed = 0 ORDER BY created_at, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(AiDigestError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(AiDigestError::storage)? {
            results.push(row_to_stored(&row)?);
        }
        Ok(results)
    }

    /// Record the outcome of a classification attempt.
    ///
    /// A success stores the insight and marks the row processed in one
    /// transaction. A failure bumps `attempts` and records the error; when
    /// `max_attempts` is reached the row becomes processed without an
    /// insight (permanently failed). Returns whether the row is now processed.
    pub async fn mark_processed(
        &self,
        id: &ContentId,
        outcome: ClassificationOutcome,
        max_attempts: Option<u32>,
    ) -> Result<bool> {
        self.check_writable()?;
        let id_str = id.to_string();

        match outcome {
            ClassificationOutcome::Insight(insight) => {
                let tx = self
                    .conn
                    .transaction()
                    .await
                    .map_err(AiDigestError::storage)?;
                let now = timestamp(&Utc::now());

                let changed = tx
                    .execute(
                        "UPDATE raw_content
                         SET is_processed = 1, processing_error = NULL, attempts = attempts + 1
                         WHERE id = ?1 AND is_processed = 0",
                        params![id_str.as_str()],
                    )
                    .await
                    .map_err(AiDigestError::storage)?;
                if changed == 0 {
                    tx.rollback().await.map_err(AiDigestError::storage)?;
                    return Err(AiDigestError::validation(format!(
                        "no unprocessed content with id {id}"
                    )));
                }

                tx.execute(
                    "INSERT INTO insight (id, raw_content_id, summary, analysis, category,
                                          importance_score, error, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        ContentId::new().to_string(),
                        id_str.as_str(),
                        insight.summary.as_str(),
                        insight.analysis.as_str(),
                        insight.category.as_str(),
                        clamp_score(insight.importance_score),
                        insight.error.as_deref(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(AiDigestError::storage)?;

                tx.commit().await.map_err(AiDigestError::storage)?;
                Ok(true)
            }
            ClassificationOutcome::Failed(error) => {
                let cap = max_attempts.map(i64::from);
                let changed = self
                    .conn
                    .execute(
                        "UPDATE raw_content
                         SET attempts = attempts + 1,
                             processing_error = ?2,
                             is_processed = CASE
                                 WHEN ?3 IS NOT NULL AND attempts + 1 >= ?3 THEN 1
                                 ELSE 0
                             END
                         WHERE id = ?1 AND is_processed = 0",
                        params![id_str.as_str(), error.as_str(), cap],
                    )
                    .await
                    .map_err(AiDigestError::storage)?;
                if changed == 0 {
                    return Err(AiDigestError::validation(format!(
                        "no unprocessed content with id {id}"
                    )));
                }

                let stored = self.get_content(id).await?;
                Ok(stored.is_some_and(|s| s.is_processed))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Insights
    // -----------------------------------------------------------------------

    /// The insight attached to a stored row, if any.
    pub async fn insight_for(&self, raw_content_id: &ContentId) -> Result<Option<Insight>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, raw_content_id, summary, analysis, category, importance_score,
                        error, created_at
                 FROM insight WHERE raw_content_id = ?1",
                params![raw_content_id.to_string()],
            )
            .await
            .map_err(AiDigestError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_insight(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AiDigestError::storage(e)),
        }
    }

    /// Insights created in `[start, end)`, joined with their item's metadata,
    /// most important first.
    pub async fn insights_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InsightWithSource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT i.id, i.raw_content_id, i.summary, i.analysis, i.category,
                        i.importance_score, i.error, i.created_at,
                        r.title, r.url, r.source_name, r.source_type
                 FROM insight i
                 JOIN raw_content r ON r.id = i.raw_content_id
                 WHERE i.created_at >= ?1 AND i.created_at < ?2
                 ORDER BY i.importance_score DESC, i.created_at",
                params![timestamp(&start), timestamp(&end)],
            )
            .await
            .map_err(AiDigestError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(AiDigestError::storage)? {
            let insight = row_to_insight(&row)?;
            let source_type: String = row.get(11).map_err(AiDigestError::storage)?;
            results.push(InsightWithSource {
                insight,
                title: row.get::<String>(8).map_err(AiDigestError::storage)?,
                url: row.get::<String>(9).ok(),
                source_name: row.get::<String>(10).map_err(AiDigestError::storage)?,
                source_type: source_type.parse::<SourceKind>()?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Stats and retention
    // -----------------------------------------------------------------------

    /// Counts describing how far processing has progressed.
    pub async fn processing_stats(&self) -> Result<ProcessingStats> {
        let mut stats = ProcessingStats {
            total_raw_content: self.count("SELECT COUNT(*) FROM raw_content").await?,
            processed_content: self
                .count("SELECT COUNT(*) FROM raw_content WHERE is_processed = 1")
                .await?,
            unprocessed_content: self
                .count("SELECT COUNT(*) FROM raw_content WHERE is_processed = 0")
                .await?,
            failed_content: self
                .count(
                    "SELECT COUNT(*) FROM raw_content r
                     WHERE r.is_processed = 1 AND r.processing_error IS NOT NULL
                       AND NOT EXISTS (SELECT 1 FROM insight i WHERE i.raw_content_id = r.id)",
                )
                .await?,
            total_insights: self.count("SELECT COUNT(*) FROM insight").await?,
            ..Default::default()
        };

        let mut rows = self
            .conn
            .query(
                "SELECT source_type, COUNT(*) FROM raw_content GROUP BY source_type ORDER BY source_type",
                params![],
            )
            .await
            .map_err(AiDigestError::storage)?;
        while let Some(row) = rows.next().await.map_err(AiDigestError::storage)? {
            let kind: String = row.get(0).map_err(AiDigestError::storage)?;
            let n: i64 = row.get(1).map_err(AiDigestError::storage)?;
            stats.by_source_type.insert(kind, n.max(0) as u64);
        }

        Ok(stats)
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(AiDigestError::storage)?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(AiDigestError::storage)?.max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(AiDigestError::storage(e)),
        }
    }

    /// Delete processed rows created before `cutoff`, with their insights.
    /// Unprocessed rows are never removed. Returns the number of rows deleted.
    pub async fn cleanup_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_writable()?;
        let cutoff = timestamp(&cutoff);

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(AiDigestError::storage)?;
        tx.execute(
            "DELETE FROM insight WHERE raw_content_id IN
                (SELECT id FROM raw_content WHERE is_processed = 1 AND created_at < ?1)",
            params![cutoff.as_str()],
        )
        .await
        .map_err(AiDigestError::storage)?;
        let deleted = tx
            .execute(
                "DELETE FROM raw_content WHERE is_processed = 1 AND created_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(AiDigestError::storage)?;
        tx.commit().await.map_err(AiDigestError::storage)?;

        tracing::info!(deleted, "removed processed content past retention");
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Source registry
    // -----------------------------------------------------------------------

    /// Insert a registry entry, or refresh type, url and priority of an
    /// existing one. The active flag of an existing entry is preserved so
    /// operator toggles survive a resync.
    pub async fn upsert_source(&self, source: &SourceConfig) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO source_config (source_name, source_type, source_url, is_active, priority, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_name) DO UPDATE SET
                   source_type = excluded.source_type,
                   source_url = excluded.source_url,
                   priority = excluded.priority,
                   updated_at = excluded.updated_at",
                params![
                    source.source_name.as_str(),
                    source.source_type.as_str(),
                    source.source_url.as_str(),
                    i64::from(source.is_active),
                    source.priority,
                    now.as_str(),
                ],
            )
            .await
            .map_err(AiDigestError::storage)?;
        Ok(())
    }

    /// Registry entries ordered by priority, then name.
    pub async fn list_sources(&self, active_only: bool) -> Result<Vec<SourceConfig>> {
        let sql = if active_only {
            "SELECT source_type, source_name, source_url, is_active, priority
             FROM source_config WHERE is_active = 1 ORDER BY priority, source_name"
        } else {
            "SELECT source_type, source_name, source_url, is_active, priority
             FROM source_config ORDER BY priority, source_name"
        };
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(AiDigestError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(AiDigestError::storage)? {
            let kind: String = row.get(0).map_err(AiDigestError::storage)?;
            results.push(SourceConfig {
                source_type: kind.parse()?,
                source_name: row.get::<String>(1).map_err(AiDigestError::storage)?,
                source_url: row.get::<String>(2).map_err(AiDigestError::storage)?,
                is_active: row.get::<i64>(3).map_err(AiDigestError::storage)? != 0,
                priority: row.get::<i64>(4).map_err(AiDigestError::storage)?,
            });
        }
        Ok(results)
    }

    /// Toggle a registry entry. Returns `false` when no entry has that name.
    pub async fn set_source_active(&self, source_name: &str, active: bool) -> Result<bool> {
        self.check_writable()?;
        let now = timestamp(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE source_config SET is_active = ?1, updated_at = ?2 WHERE source_name = ?3",
                params![i64::from(active), now.as_str(), source_name],
            )
            .await
            .map_err(AiDigestError::storage)?;
        Ok(changed > 0)
    }

    pub async fn count_sources(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM source_config").await
    }
}

/// Insert `item` unless its dedup key is already stored. Returns whether a
/// row was written.
async fn insert_if_absent(conn: &Connection, item: &RawItem, now: &str) -> Result<bool> {
    let key = item.dedup_key();
    let exists = {
        let mut rows = conn
            .query(
                "SELECT 1 FROM raw_content WHERE dedup_key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(AiDigestError::storage)?;
        rows.next().await.map_err(AiDigestError::storage)?.is_some()
    };
    if exists {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO raw_content (id, source_type, source_name, title, body, url, dedup_key,
                                  published_at, fetched_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            ContentId::new().to_string(),
            item.source_type.as_str(),
            item.source_name.as_str(),
            item.title.as_str(),
            item.body.as_str(),
            item.url.as_deref(),
            key.as_str(),
            item.published_at.as_ref().map(timestamp),
            timestamp(&item.fetched_at),
            now,
        ],
    )
    .await
    .map_err(AiDigestError::storage)?;
    Ok(true)
}

/// Fixed-width UTC timestamp, so text comparison matches time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AiDigestError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_id(s: &str) -> Result<ContentId> {
    s.parse()
        .map_err(|e| AiDigestError::Storage(format!("invalid id '{s}': {e}")))
}

/// Convert a row selected with [`RAW_COLUMNS`] to a [`StoredContent`].
fn row_to_stored(row: &libsql::Row) -> Result<StoredContent> {
    let id: String = row.get(0).map_err(AiDigestError::storage)?;
    let kind: String = row.get(1).map_err(AiDigestError::storage)?;
    let fetched_at: String = row.get(7).map_err(AiDigestError::storage)?;
    let created_at: String = row.get(8).map_err(AiDigestError::storage)?;

    let item = RawItem {
        source_type: kind.parse()?,
        source_name: row.get::<String>(2).map_err(AiDigestError::storage)?,
        title: row.get::<String>(3).map_err(AiDigestError::storage)?,
        body: row.get::<String>(4).map_err(AiDigestError::storage)?,
        url: row.get::<String>(5).ok(),
        published_at: match row.get::<String>(6).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
        fetched_at: parse_timestamp(&fetched_at)?,
    };

    Ok(StoredContent {
        id: parse_id(&id)?,
        item,
        is_processed: row.get::<i64>(9).map_err(AiDigestError::storage)? != 0,
        processing_error: row.get::<String>(10).ok(),
        attempts: row.get::<i64>(11).map_err(AiDigestError::storage)?.max(0) as u32,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Convert the first eight insight columns of a row to an [`Insight`].
fn row_to_insight(row: &libsql::Row) -> Result<Insight> {
    let id: String = row.get(0).map_err(AiDigestError::storage)?;
    let raw_id: String = row.get(1).map_err(AiDigestError::storage)?;
    let created_at: String = row.get(7).map_err(AiDigestError::storage)?;

    Ok(Insight {
        id: parse_id(&id)?,
        raw_content_id: parse_id(&raw_id)?,
        summary: row.get::<String>(2).map_err(AiDigestError::storage)?,
        analysis: row.get::<String>(3).map_err(AiDigestError::storage)?,
        category: row.get::<String>(4).map_err(AiDigestError::storage)?,
        importance_score: row.get::<f64>(5).map_err(AiDigestError::storage)?,
        error: row.get::<String>(6).ok(),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("aidigest_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn feed_item(title: &str, url: Option<&str>) -> RawItem {
        let item = RawItem::new(SourceKind::Feed, "Test Blog", title, format!("{title} body"));
        match url {
            Some(u) => item.with_url(u),
            None => item,
        }
    }

    async fn backdate(storage: &Storage, id: &ContentId, days: i64) {
        let old = timestamp(&(Utc::now() - Duration::days(days)));
        storage
            .conn
            .execute(
                "UPDATE raw_content SET created_at = ?1 WHERE id = ?2",
                params![old.as_str(), id.to_string()],
            )
            .await
            .expect("backdate row");
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
        storage.ping().await.expect("ping");
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("aidigest_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn fresh_schema_tracks_attempts() {
        let storage = test_storage().await;
        let report = storage
            .upsert_raw(&[feed_item("Attempts", None)], 10)
            .await
            .expect("upsert");
        assert_eq!(report.inserted, 1);
        let pending = storage.list_unprocessed().await.expect("list");
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn unreadable_row_fails_listing() {
        let storage = test_storage().await;
        storage
            .upsert_raw(&[feed_item("Good", None), feed_item("Bad", None)], 10)
            .await
            .expect("upsert");
        storage
            .conn
            .execute(
                "UPDATE raw_content SET source_type = 'carrier-pigeon' WHERE title = 'Bad'",
                params![],
            )
            .await
            .expect("corrupt row");

        assert!(storage.list_unprocessed().await.is_err());
    }

    #[tokio::test]
    async fn same_url_is_stored_once() {
        let storage = test_storage().await;
        let item = feed_item("GPT news", Some("https://blog.test/gpt"));

        let first = storage.upsert_raw(&[item.clone()], 10).await.unwrap();
        assert_eq!(first.inserted, 1);

        let second = storage.upsert_raw(&[item], 10).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 1);

        let stats = storage.processing_stats().await.unwrap();
        assert_eq!(stats.total_raw_content, 1);
    }

    #[tokio::test]
    async fn existing_row_is_not_overwritten() {
        let storage = test_storage().await;
        let original = feed_item("Original", Some("https://blog.test/a"));
        storage.upsert_raw(&[original], 10).await.unwrap();

        let changed = RawItem::new(SourceKind::Feed, "Test Blog", "Changed", "new body")
            .with_url("https://blog.test/a");
        storage.upsert_raw(&[changed], 10).await.unwrap();

        let stored = storage
            .find_by_dedup_key("https://blog.test/a")
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(stored.item.title, "Original");
    }

    #[tokio::test]
    async fn url_less_items_dedup_by_content_key() {
        let storage = test_storage().await;
        let item = feed_item("No link", None);
        storage.upsert_raw(&[item.clone(), item.clone()], 10).await.unwrap();
        let report = storage.upsert_raw(&[item], 10).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(storage.processing_stats().await.unwrap().total_raw_content, 1);
    }

    #[tokio::test]
    async fn failing_item_does_not_abort_batch() {
        let storage = test_storage().await;
        let mut bad = feed_item("Bad", Some("https://blog.test/bad"));
        bad.body = "   ".into();

        let items = vec![
            feed_item("One", Some("https://blog.test/1")),
            bad,
            feed_item("Two", Some("https://blog.test/2")),
            feed_item("Three", Some("https://blog.test/3")),
        ];
        let report = storage.upsert_raw(&items, 2).await.unwrap();
        assert_eq!(
            report,
            UpsertReport {
                inserted: 3,
                skipped: 0,
                failed: 1
            }
        );
        assert_eq!(storage.list_unprocessed().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn successful_classification_sets_flag_and_one_insight() {
        let storage = test_storage().await;
        storage
            .upsert_raw(&[feed_item("Item", Some("https://blog.test/i"))], 10)
            .await
            .unwrap();
        let row = storage.list_unprocessed().await.unwrap().remove(0);

        // An earlier failure is cleared by a later success.
        storage
            .mark_processed(&row.id, ClassificationOutcome::Failed("timeout".into()), None)
            .await
            .unwrap();

        let insight = NewInsight::new("sum", "analysis", "Research", 1.7);
        let done = storage
            .mark_processed(&row.id, ClassificationOutcome::Insight(insight), None)
            .await
            .unwrap();
        assert!(done);

        let stored = storage.get_content(&row.id).await.unwrap().unwrap();
        assert!(stored.is_processed);
        assert!(stored.processing_error.is_none());
        assert_eq!(stored.attempts, 2);

        let insight = storage.insight_for(&row.id).await.unwrap().expect("insight");
        assert_eq!(insight.importance_score, 1.0);
        assert_eq!(storage.processing_stats().await.unwrap().total_insights, 1);

        // A processed row cannot receive a second insight.
        let again = storage
            .mark_processed(
                &row.id,
                ClassificationOutcome::Insight(NewInsight::new("s", "a", "c", 0.5)),
                None,
            )
            .await;
        assert!(again.is_err());
        assert_eq!(storage.processing_stats().await.unwrap().total_insights, 1);
    }

    #[tokio::test]
    async fn failure_without_cap_stays_unprocessed() {
        let storage = test_storage().await;
        storage
            .upsert_raw(&[feed_item("Item", Some("https://blog.test/i"))], 10)
            .await
            .unwrap();
        let row = storage.list_unprocessed().await.unwrap().remove(0);

        for _ in 0..3 {
            let done = storage
                .mark_processed(&row.id, ClassificationOutcome::Failed("boom".into()), None)
                .await
                .unwrap();
            assert!(!done);
        }

        let stored = storage.get_content(&row.id).await.unwrap().unwrap();
        assert!(!stored.is_processed);
        assert_eq!(stored.processing_error.as_deref(), Some("boom"));
        assert_eq!(stored.attempts, 3);
        assert_eq!(storage.list_unprocessed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_cap_marks_permanent_failure() {
        let storage = test_storage().await;
        storage
            .upsert_raw(&[feed_item("Item", Some("https://blog.test/i"))], 10)
            .await
            .unwrap();
        let row = storage.list_unprocessed().await.unwrap().remove(0);

        let first = storage
            .mark_processed(&row.id, ClassificationOutcome::Failed("e1".into()), Some(2))
            .await
            .unwrap();
        assert!(!first);
        let second = storage
            .mark_processed(&row.id, ClassificationOutcome::Failed("e2".into()), Some(2))
            .await
            .unwrap();
        assert!(second);

        let stored = storage.get_content(&row.id).await.unwrap().unwrap();
        assert!(stored.is_permanently_failed());
        assert_eq!(stored.processing_error.as_deref(), Some("e2"));
        assert!(storage.insight_for(&row.id).await.unwrap().is_none());
        assert!(storage.list_unprocessed().await.unwrap().is_empty());

        let stats = storage.processing_stats().await.unwrap();
        assert_eq!(stats.failed_content, 1);
        assert_eq!(stats.processed_content, 1);
    }

    #[tokio::test]
    async fn mark_unknown_id_is_error() {
        let storage = test_storage().await;
        let result = storage
            .mark_processed(&ContentId::new(), ClassificationOutcome::Failed("x".into()), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn insights_between_filters_by_creation_time() {
        let storage = test_storage().await;
        storage
            .upsert_raw(
                &[
                    feed_item("Low", Some("https://blog.test/low")),
                    feed_item("High", Some("https://blog.test/high")),
                ],
                10,
            )
            .await
            .unwrap();
        for row in storage.list_unprocessed().await.unwrap() {
            let score = if row.item.title == "High" { 0.9 } else { 0.2 };
            storage
                .mark_processed(
                    &row.id,
                    ClassificationOutcome::Insight(NewInsight::new("s", "a", "AI Update", score)),
                    None,
                )
                .await
                .unwrap();
        }

        let now = Utc::now();
        let found = storage
            .insights_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "High");
        assert_eq!(found[0].source_type, SourceKind::Feed);
        assert_eq!(found[0].url.as_deref(), Some("https://blog.test/high"));

        let yesterday = storage
            .insights_between(now - Duration::days(2), now - Duration::days(1))
            .await
            .unwrap();
        assert!(yesterday.is_empty());
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_processed_rows() {
        let storage = test_storage().await;
        storage
            .upsert_raw(
                &[
                    feed_item("Old done", Some("https://blog.test/1")),
                    feed_item("Old pending", Some("https://blog.test/2")),
                    feed_item("New done", Some("https://blog.test/3")),
                ],
                10,
            )
            .await
            .unwrap();

        for row in storage.list_unprocessed().await.unwrap() {
            match row.item.title.as_str() {
                "Old done" => {
                    storage
                        .mark_processed(
                            &row.id,
                            ClassificationOutcome::Insight(NewInsight::new("s", "a", "c", 0.5)),
                            None,
                        )
                        .await
                        .unwrap();
                    backdate(&storage, &row.id, 40).await;
                }
                "Old pending" => backdate(&storage, &row.id, 40).await,
                _ => {
                    storage
                        .mark_processed(
                            &row.id,
                            ClassificationOutcome::Insight(NewInsight::new("s", "a", "c", 0.5)),
                            None,
                        )
                        .await
                        .unwrap();
                }
            }
        }

        let deleted = storage
            .cleanup_processed_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let stats = storage.processing_stats().await.unwrap();
        assert_eq!(stats.total_raw_content, 2);
        assert_eq!(stats.total_insights, 1);
        assert_eq!(stats.unprocessed_content, 1);
    }

    #[tokio::test]
    async fn stats_count_by_source_type() {
        let storage = test_storage().await;
        let paper = RawItem::new(SourceKind::Paper, "arXiv", "A paper", "abstract")
            .with_url("https://arxiv.org/abs/1");
        storage
            .upsert_raw(&[feed_item("Post", Some("https://blog.test/p")), paper], 10)
            .await
            .unwrap();

        let stats = storage.processing_stats().await.unwrap();
        assert_eq!(stats.by_source_type.get("feed"), Some(&1));
        assert_eq!(stats.by_source_type.get("paper"), Some(&1));
        assert_eq!(stats.processing_rate(), 0.0);
    }

    #[tokio::test]
    async fn source_registry_roundtrip() {
        let storage = test_storage().await;
        assert_eq!(storage.count_sources().await.unwrap(), 0);

        let mut blog = SourceConfig::new(SourceKind::Feed, "Blog", "https://blog.test/rss");
        blog.priority = 2;
        let papers = SourceConfig::new(SourceKind::Paper, "Papers", "https://arxiv.test/q");
        storage.upsert_source(&blog).await.unwrap();
        storage.upsert_source(&papers).await.unwrap();

        let all = storage.list_sources(false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source_name, "Papers");

        assert!(storage.set_source_active("Papers", false).await.unwrap());
        assert!(!storage.set_source_active("Missing", false).await.unwrap());
        let active = storage.list_sources(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].source_name, "Blog");

        // Resync keeps the operator's toggle but refreshes the url.
        let moved = SourceConfig::new(SourceKind::Paper, "Papers", "https://arxiv.test/q2");
        storage.upsert_source(&moved).await.unwrap();
        let all = storage.list_sources(false).await.unwrap();
        let papers = all.iter().find(|s| s.source_name == "Papers").unwrap();
        assert!(!papers.is_active);
        assert_eq!(papers.source_url, "https://arxiv.test/q2");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("aidigest_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_raw(&[feed_item("Item", Some("https://blog.test/i"))], 10)
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.processing_stats().await.unwrap().total_raw_content, 1);
        let result = ro
            .upsert_raw(&[feed_item("Other", Some("https://blog.test/o"))], 10)
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("aidigest_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
