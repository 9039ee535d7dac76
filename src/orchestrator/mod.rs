//! Scrape cycle orchestration
//!
//! A cycle asks the registry for every item in the lookback window, then walks
//! the items one at a time through a small state machine:
//!
//! ```text
//!            ┌─────────────┐
//!  item ────▶│ processed?  │── yes ──▶ skipped (no side effects)
//!            └──────┬──────┘
//!                   ▼
//!            ┌─────────────┐
//!            │  evaluate   │── no match ──────▶ not_a_match
//!            │   images    │── no candidate ──▶ no_plate_found
//!            └──────┬──────┘
//!                   ▼
//!            ┌─────────────┐
//!            │ fleet or    │── known ─────────▶ duplicate
//!            │ pending?    │
//!            └──────┬──────┘
//!                   ▼
//!            upload ─▶ submit ─────────────────▶ submitted | error
//! ```
//!
//! Exactly one outcome record is written per processed item.

pub mod evaluate;
pub mod pacing;

pub use evaluate::{evaluate_images, Evaluation, EvaluationStrategy, Thresholds};
pub use pacing::Pacer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collectors::registry_from_config;
use crate::config::{Config, PipelineConfig};
use crate::error::Error;
use crate::metrics;
use crate::models::{Candidate, Item, OutcomeRecord, OutcomeStatus, SubmissionRequest};
use crate::registry::SourceRegistry;
use crate::services::{ImageStorage, SightingStore, VisionService};
use crate::storage::{LocalImageStorage, SqliteStore};
use crate::transport::TransportClient;
use crate::vision::OpenAiVision;

// ============================================================================
// Reports
// ============================================================================

/// What happened to one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDisposition {
    /// An outcome already existed; nothing was done
    Skipped,
    /// The idempotency check itself failed; the item is retried next cycle
    CheckFailed(String),
    /// The item reached a terminal outcome
    Processed {
        outcome: OutcomeRecord,
        /// Whether the outcome record was persisted
        persisted: bool,
    },
}

/// Summary of one scrape cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Items returned by the collectors
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    /// Items whose idempotency check failed
    pub check_failures: usize,
    /// Outcomes that could not be persisted
    pub write_failures: usize,
    /// Processed items per outcome
    pub outcomes: BTreeMap<&'static str, usize>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Number of processed items with the given outcome
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.get(status.as_str()).copied().unwrap_or(0)
    }

    fn record(&mut self, disposition: &ItemDisposition) {
        match disposition {
            ItemDisposition::Skipped => self.skipped += 1,
            ItemDisposition::CheckFailed(_) => self.check_failures += 1,
            ItemDisposition::Processed { outcome, persisted } => {
                self.processed += 1;
                if !persisted {
                    self.write_failures += 1;
                }
                *self.outcomes.entry(outcome.status.as_str()).or_insert(0) += 1;
            }
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives collectors, vision, storage and the store through a cycle
pub struct Orchestrator {
    registry: SourceRegistry,
    vision: Arc<dyn VisionService>,
    store: Arc<dyn SightingStore>,
    images: Arc<dyn ImageStorage>,
    thresholds: Thresholds,
    strategy: EvaluationStrategy,
    pacer: Pacer,
}

impl Orchestrator {
    pub fn new(
        registry: SourceRegistry,
        vision: Arc<dyn VisionService>,
        store: Arc<dyn SightingStore>,
        images: Arc<dyn ImageStorage>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            registry,
            vision,
            store,
            images,
            thresholds: Thresholds {
                detection: config.detection_threshold,
                plate: config.plate_threshold,
            },
            strategy: config.strategy,
            pacer: Pacer::from_config(config),
        }
    }

    /// Wire the production adapters from a validated configuration
    ///
    /// Builds the command collectors, the OpenAI vision client, the SQLite
    /// store and local image storage, all sharing one transport client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration, and transport or
    /// store errors if the HTTP client or database cannot be opened
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let transport = TransportClient::from_config(&config.transport)?;
        let store = SqliteStore::new(&config.store.sqlite_path)?;

        Ok(Self::new(
            registry_from_config(&config.registry),
            Arc::new(OpenAiVision::new(transport.clone(), config.vision.clone())),
            Arc::new(store),
            Arc::new(LocalImageStorage::from_config(transport, &config.store)),
            &config.pipeline,
        ))
    }

    /// Replace the pacing delays
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run one full cycle over the last `lookback`
    ///
    /// Collector and item failures are absorbed into the report. A lookback
    /// reaching past the earliest representable time starts the window there.
    pub async fn run_cycle(&self, lookback: chrono::Duration, concurrency: usize) -> CycleReport {
        let started = Instant::now();
        let _timer = metrics::start_cycle_timer();
        let window_start = window_start(Utc::now(), lookback);

        tracing::info!(window_start = %window_start, concurrency, "Starting scrape cycle");

        let items = self.registry.run_all(window_start, concurrency).await;
        let mut report = CycleReport {
            discovered: items.len(),
            ..Default::default()
        };

        for (index, item) in items.iter().enumerate() {
            let disposition = self.process_item(item).await;
            report.record(&disposition);

            let is_last = index + 1 == items.len();
            if !is_last && matches!(disposition, ItemDisposition::Processed { .. }) {
                self.pacer.between_items().await;
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            discovered = report.discovered,
            processed = report.processed,
            skipped = report.skipped,
            submitted = report.count(OutcomeStatus::Submitted),
            check_failures = report.check_failures,
            write_failures = report.write_failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Scrape cycle complete"
        );

        report
    }

    /// Take one item to a terminal outcome, unless it already has one
    pub async fn process_item(&self, item: &Item) -> ItemDisposition {
        let key = item.key();

        match self.store.is_processed(item.source, &item.source_id).await {
            Ok(true) => {
                tracing::debug!(item = %key, "Already processed, skipping");
                metrics::record_skipped();
                return ItemDisposition::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(item = %key, error = %e, "Idempotency check failed, skipping");
                return ItemDisposition::CheckFailed(e.to_string());
            }
        }

        tracing::info!(item = %key, images = item.image_urls.len(), "Processing item");

        let outcome = self.decide(item).await;
        metrics::record_outcome(outcome.status);

        let persisted = match self.store.mark_processed(&outcome).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(item = %key, status = %outcome.status, error = %e, "Failed to record outcome");
                false
            }
        };

        tracing::info!(
            item = %key,
            status = %outcome.status,
            submission_id = outcome.submission_id.as_deref(),
            error = outcome.error.as_deref(),
            "Item processed"
        );

        ItemDisposition::Processed { outcome, persisted }
    }

    async fn decide(&self, item: &Item) -> OutcomeRecord {
        let key = item.key();

        let evaluation = evaluate_images(
            self.vision.as_ref(),
            item,
            self.thresholds,
            self.strategy,
            &self.pacer,
        )
        .await;

        if !evaluation.matched {
            return OutcomeRecord::new(key, OutcomeStatus::NotAMatch);
        }
        let Some(best) = evaluation.best else {
            return OutcomeRecord::new(key, OutcomeStatus::NoPlateFound);
        };

        match self.is_duplicate(&best).await {
            Ok(true) => return OutcomeRecord::new(key, OutcomeStatus::Duplicate),
            Ok(false) => {}
            Err(message) => return OutcomeRecord::error(key, message),
        }

        let key_hint = format!("{}-{}", item.source, item.source_id);
        let upload = self.images.upload_image(&best.image_url, &key_hint).await;
        let public_url = match upload.public_url {
            Some(url) if upload.success => url,
            _ => {
                let message = upload.error.unwrap_or_else(|| "image upload failed".into());
                return OutcomeRecord::error(key, message);
            }
        };

        let request = SubmissionRequest {
            plate: best.plate.clone(),
            provider: best.provider,
            image_url: public_url,
            source: item.source,
            source_id: item.source_id.clone(),
            source_url: item.url.clone(),
            provenance: provenance(item),
            plate_confidence: best.plate_confidence,
            detection_confidence: best.detection_confidence,
        };

        match self.store.create_submission(&request).await {
            Ok(result) if result.success => match result.id {
                Some(id) => OutcomeRecord::submitted(key, id),
                None => OutcomeRecord::error(key, "submission created without id"),
            },
            Ok(result) => OutcomeRecord::error(
                key,
                result.error.unwrap_or_else(|| "submission rejected".into()),
            ),
            Err(e) => OutcomeRecord::error(key, e.to_string()),
        }
    }

    async fn is_duplicate(&self, best: &Candidate) -> Result<bool, String> {
        let in_fleet = self
            .store
            .plate_exists_in_fleet(&best.plate, best.provider)
            .await
            .map_err(|e| e.to_string())?;
        if in_fleet {
            return Ok(true);
        }

        self.store
            .pending_submission_exists(&best.plate, best.provider)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Start of the collection window, clamped to the earliest representable time
fn window_start(now: DateTime<Utc>, lookback: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Human-readable origin of a sighting
fn provenance(item: &Item) -> String {
    match &item.author {
        Some(author) => format!("{} post by {}", item.source, author),
        None => format!("{} post", item.source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKey, Source};

    #[test]
    fn test_report_tally() {
        let mut report = CycleReport::default();
        let key = ItemKey::new(Source::X, "1");

        report.record(&ItemDisposition::Skipped);
        report.record(&ItemDisposition::CheckFailed("locked".into()));
        report.record(&ItemDisposition::Processed {
            outcome: OutcomeRecord::new(key.clone(), OutcomeStatus::NotAMatch),
            persisted: true,
        });
        report.record(&ItemDisposition::Processed {
            outcome: OutcomeRecord::new(key, OutcomeStatus::NotAMatch),
            persisted: false,
        });

        assert_eq!(report.skipped, 1);
        assert_eq!(report.check_failures, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.count(OutcomeStatus::NotAMatch), 2);
        assert_eq!(report.count(OutcomeStatus::Submitted), 0);
    }

    #[test]
    fn test_provenance() {
        let mut item = Item {
            source: Source::Reddit,
            source_id: "abc".into(),
            url: "https://reddit.com/abc".into(),
            image_urls: vec![],
            created_at: Utc::now(),
            title: String::new(),
            body: String::new(),
            author: Some("u/spotter".into()),
        };
        assert_eq!(provenance(&item), "reddit post by u/spotter");
        item.author = None;
        assert_eq!(provenance(&item), "reddit post");
    }

    #[test]
    fn test_window_start() {
        let now = Utc::now();
        assert_eq!(
            window_start(now, chrono::Duration::hours(24)),
            now - chrono::Duration::hours(24)
        );
        assert_eq!(
            window_start(now, chrono::Duration::hours(3_000_000_000)),
            DateTime::<Utc>::MIN_UTC
        );
    }
}
