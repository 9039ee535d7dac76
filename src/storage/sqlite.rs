//! SQLite-backed sighting store
//!
//! Three tables:
//! - `outcomes`: one row per processed item, keyed by `(source, source_id)`
//! - `fleet`: known vehicles, keyed by `(plate, provider)`
//! - `submissions`: moderation queue; `pending` rows block duplicates
//!
//! # Example
//!
//! ```no_run
//! use avspotter::storage::SqliteStore;
//! use avspotter::models::Provider;
//!
//! # fn example() -> Result<(), avspotter::utils::error::StoreError> {
//! let store = SqliteStore::new("data/avspotter.db")?;
//! store.add_fleet_vehicle("ABC1234", Provider::Waymo)?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    ItemKey, OutcomeRecord, OutcomeStatus, Provider, Source, SubmissionRequest, SubmissionResult,
};
use crate::services::SightingStore;
use crate::utils::error::StoreError;

/// Submission moderation status
pub const STATUS_PENDING: &str = "pending";

/// SQLite implementation of `SightingStore`
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection. The lock is
/// never held across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS outcomes (
                    source TEXT NOT NULL,
                    source_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    submission_id TEXT,
                    error_message TEXT,
                    processed_at TEXT NOT NULL,
                    PRIMARY KEY (source, source_id)
                );

                CREATE INDEX IF NOT EXISTS idx_outcomes_status
                    ON outcomes(status);

                CREATE TABLE IF NOT EXISTS fleet (
                    plate TEXT NOT NULL,
                    provider TEXT NOT NULL,
                    added_at TEXT NOT NULL,
                    PRIMARY KEY (plate, provider)
                );

                CREATE TABLE IF NOT EXISTS submissions (
                    id TEXT PRIMARY KEY,
                    plate TEXT NOT NULL,
                    provider TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    source TEXT NOT NULL,
                    source_id TEXT NOT NULL,
                    source_url TEXT NOT NULL,
                    provenance TEXT NOT NULL,
                    plate_confidence REAL NOT NULL,
                    detection_confidence REAL NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_submissions_plate
                    ON submissions(plate, provider, status);
                "#,
        )?;

        Ok(())
    }

    /// Add a known vehicle; returns `false` if it was already present
    pub fn add_fleet_vehicle(&self, plate: &str, provider: Provider) -> Result<bool, StoreError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO fleet (plate, provider, added_at) VALUES (?1, ?2, ?3)",
            params![plate, provider.as_str(), Utc::now().to_rfc3339()],
        )?;

        Ok(inserted > 0)
    }

    /// Change a submission's moderation status
    pub fn set_submission_status(&self, id: &str, status: &str) -> Result<bool, StoreError> {
        let updated = self.conn()?.execute(
            "UPDATE submissions SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;

        Ok(updated > 0)
    }

    /// Stored outcome for an item
    pub fn outcome(&self, source: Source, source_id: &str) -> Result<Option<OutcomeRecord>, StoreError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT status, submission_id, error_message, processed_at
                 FROM outcomes WHERE source = ?1 AND source_id = ?2",
                params![source.as_str(), source_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, submission_id, error, processed_at)) = row else {
            return Ok(None);
        };

        let status: OutcomeStatus = status.parse().map_err(StoreError::Corrupt)?;
        let processed_at = DateTime::parse_from_rfc3339(&processed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Some(OutcomeRecord {
            key: ItemKey::new(source, source_id),
            status,
            submission_id,
            error,
            processed_at,
        }))
    }

    /// Outcome counts per status
    pub fn outcome_counts(&self) -> Result<Vec<(OutcomeStatus, u64)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM outcomes GROUP BY status")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(status, count)| {
                let status: OutcomeStatus = status.parse().map_err(StoreError::Corrupt)?;
                Ok((status, count as u64))
            })
            .collect()
    }
}

#[async_trait]
impl SightingStore for SqliteStore {
    async fn is_processed(&self, source: Source, source_id: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM outcomes WHERE source = ?1 AND source_id = ?2)",
            params![source.as_str(), source_id],
            |row| row.get(0),
        )?;

        Ok(exists)
    }

    async fn mark_processed(&self, record: &OutcomeRecord) -> Result<(), StoreError> {
        self.conn()?.execute(
            r#"
                INSERT OR REPLACE INTO outcomes (source, source_id, status, submission_id, error_message, processed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            params![
                record.key.source.as_str(),
                record.key.source_id,
                record.status.as_str(),
                record.submission_id,
                record.error,
                record.processed_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    async fn plate_exists_in_fleet(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM fleet WHERE plate = ?1 AND provider = ?2)",
            params![plate, provider.as_str()],
            |row| row.get(0),
        )?;

        Ok(exists)
    }

    async fn pending_submission_exists(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM submissions WHERE plate = ?1 AND provider = ?2 AND status = ?3)",
            params![plate, provider.as_str(), STATUS_PENDING],
            |row| row.get(0),
        )?;

        Ok(exists)
    }

    async fn create_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();

        self.conn()?.execute(
            r#"
                INSERT INTO submissions (
                    id, plate, provider, image_url, source, source_id, source_url,
                    provenance, plate_confidence, detection_confidence, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            params![
                id,
                request.plate,
                request.provider.as_str(),
                request.image_url,
                request.source.as_str(),
                request.source_id,
                request.source_url,
                request.provenance,
                f64::from(request.plate_confidence),
                f64::from(request.detection_confidence),
                STATUS_PENDING,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::info!(
            submission_id = %id,
            plate = %request.plate,
            provider = %request.provider,
            "Submission created"
        );
        Ok(SubmissionResult::created(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_stores() -> (Vec<SqliteStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let file_store = SqliteStore::new(temp_dir.path().join("nested/test.db")).unwrap();
        let memory_store = SqliteStore::in_memory().unwrap();
        (vec![file_store, memory_store], temp_dir)
    }

    fn request(plate: &str) -> SubmissionRequest {
        SubmissionRequest {
            plate: plate.to_string(),
            provider: Provider::Zoox,
            image_url: "http://localhost/images/abc.jpg".into(),
            source: Source::X,
            source_id: "42".into(),
            source_url: "https://x.com/a/status/42".into(),
            provenance: "x post".into(),
            plate_confidence: 81.0,
            detection_confidence: 90.0,
        }
    }

    #[tokio::test]
    async fn test_outcome_roundtrip() {
        let (stores, _dir) = create_test_stores();
        for store in stores {
            assert!(!store.is_processed(Source::Reddit, "abc").await.unwrap());

            let record = OutcomeRecord::submitted(ItemKey::new(Source::Reddit, "abc"), "sub-1");
            store.mark_processed(&record).await.unwrap();

            assert!(store.is_processed(Source::Reddit, "abc").await.unwrap());
            assert!(!store.is_processed(Source::X, "abc").await.unwrap());

            let stored = store.outcome(Source::Reddit, "abc").unwrap().unwrap();
            assert_eq!(stored.status, OutcomeStatus::Submitted);
            assert_eq!(stored.submission_id.as_deref(), Some("sub-1"));
        }
    }

    #[tokio::test]
    async fn test_mark_processed_upserts() {
        let store = SqliteStore::in_memory().unwrap();
        let key = ItemKey::new(Source::X, "1");

        store
            .mark_processed(&OutcomeRecord::error(key.clone(), "upload failed"))
            .await
            .unwrap();
        store
            .mark_processed(&OutcomeRecord::new(key, OutcomeStatus::Duplicate))
            .await
            .unwrap();

        let counts = store.outcome_counts().unwrap();
        assert_eq!(counts, vec![(OutcomeStatus::Duplicate, 1)]);
    }

    #[tokio::test]
    async fn test_fleet() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.add_fleet_vehicle("ABC1234", Provider::Waymo).unwrap());
        assert!(!store.add_fleet_vehicle("ABC1234", Provider::Waymo).unwrap());

        assert!(store.plate_exists_in_fleet("ABC1234", Provider::Waymo).await.unwrap());
        assert!(!store.plate_exists_in_fleet("ABC1234", Provider::Tesla).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_submissions() {
        let store = SqliteStore::in_memory().unwrap();

        let result = store.create_submission(&request("ZX9")).await.unwrap();
        assert!(result.success);
        let id = result.id.unwrap();

        assert!(store.pending_submission_exists("ZX9", Provider::Zoox).await.unwrap());
        assert!(!store.pending_submission_exists("ZX9", Provider::Waymo).await.unwrap());

        assert!(store.set_submission_status(&id, "approved").unwrap());
        assert!(!store.pending_submission_exists("ZX9", Provider::Zoox).await.unwrap());

        assert!(!store.set_submission_status("no-such-id", "rejected").unwrap());
    }
}
