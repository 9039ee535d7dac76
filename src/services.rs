//! Capability traits for the pipeline's external collaborators
//!
//! The registry and orchestrator depend only on these traits, so production
//! adapters and in-memory fakes are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Detection, Item, OutcomeRecord, PlateReading, Provider, Source, SubmissionRequest,
    SubmissionResult, UploadResult,
};
use crate::utils::error::{CollectorError, StoreError, VisionError};

/// A named data source producing items for a lookback window
#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique collector name
    fn name(&self) -> &str;

    /// Fetch items created at or after `window_start`
    async fn scrape(&self, window_start: DateTime<Utc>) -> Result<Vec<Item>, CollectorError>;
}

/// Vehicle detection and plate extraction
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Does the image show a tracked vehicle, and whose?
    async fn detect(&self, image_url: &str) -> Result<Detection, VisionError>;

    /// Read the license plate of a vehicle of `provider`
    async fn extract_plate(
        &self,
        image_url: &str,
        provider: Provider,
    ) -> Result<PlateReading, VisionError>;
}

/// Persistent store of outcomes, the tracked fleet and submissions
#[async_trait]
pub trait SightingStore: Send + Sync {
    /// Whether an outcome record exists for the item
    async fn is_processed(&self, source: Source, source_id: &str) -> Result<bool, StoreError>;

    /// Upsert an outcome record
    async fn mark_processed(&self, record: &OutcomeRecord) -> Result<(), StoreError>;

    async fn plate_exists_in_fleet(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError>;

    async fn pending_submission_exists(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError>;

    /// Create a moderation submission
    ///
    /// Rejections are reported through `SubmissionResult`; `Err` is reserved
    /// for store failures.
    async fn create_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, StoreError>;
}

/// Object storage for evidence images
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Copy the image at `source_url` into storage
    async fn upload_image(&self, source_url: &str, key_hint: &str) -> UploadResult;
}
