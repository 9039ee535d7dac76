//! Common test utilities
//!
//! In-memory fakes for every pipeline capability. Each fake counts the calls it
//! receives so tests can assert on side effects.
#![allow(dead_code)]

use async_trait::async_trait;
use avspotter::models::{
    Detection, Item, OutcomeRecord, PlateReading, Provider, Source, SubmissionRequest,
    SubmissionResult, UploadResult,
};
use avspotter::services::{Collector, ImageStorage, SightingStore, VisionService};
use avspotter::utils::error::{CollectorError, StoreError, VisionError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Create a test item with the given images
pub fn create_test_item(source_id: &str, images: &[&str]) -> Item {
    Item {
        source: Source::Reddit,
        source_id: source_id.to_string(),
        url: format!("https://www.reddit.com/r/waymo/comments/{source_id}"),
        image_urls: images.iter().map(|s| s.to_string()).collect(),
        created_at: Utc::now(),
        title: "Spotted one downtown".to_string(),
        body: String::new(),
        author: Some("spotter".to_string()),
    }
}

// ============================================================================
// Collectors
// ============================================================================

/// Collector with a scripted sequence of results
///
/// Once the script runs out the last entry repeats.
pub struct ScriptedCollector {
    name: String,
    script: Mutex<Vec<Result<Vec<Item>, String>>>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedCollector {
    pub fn ok(name: &str, items: Vec<Item>) -> Self {
        Self::new(name, vec![Ok(items)])
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, vec![Err("scraper exited with status 1".to_string())])
    }

    pub fn new(name: &str, script: Vec<Result<Vec<Item>, String>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self, _window_start: DateTime<Utc>) -> Result<Vec<Item>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        };

        next.map_err(CollectorError::Command)
    }
}

/// Collector that panics inside `scrape`
pub struct PanickingCollector;

#[async_trait]
impl Collector for PanickingCollector {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn scrape(&self, _window_start: DateTime<Utc>) -> Result<Vec<Item>, CollectorError> {
        panic!("scraper blew up");
    }
}

// ============================================================================
// Vision
// ============================================================================

/// Canned vision answer for one image
#[derive(Debug, Clone, Copy)]
pub enum Verdict {
    /// Not a tracked vehicle
    NoMatch,
    /// Tracked vehicle with detection confidence, plate not readable
    NoPlate(f32),
    /// Tracked vehicle with (detection, plate) confidences
    Plate(f32, f32),
    /// Vision call fails
    Fail,
}

/// Vision fake keyed by image URL; plates are read as `plate_for(url)`
pub struct FakeVision {
    provider: Provider,
    verdicts: HashMap<String, Verdict>,
    pub detect_calls: AtomicUsize,
    pub plate_calls: AtomicUsize,
}

impl FakeVision {
    pub fn new(provider: Provider, verdicts: &[(&str, Verdict)]) -> Self {
        Self {
            provider,
            verdicts: verdicts
                .iter()
                .map(|(url, v)| (url.to_string(), *v))
                .collect(),
            detect_calls: AtomicUsize::new(0),
            plate_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst) + self.plate_calls.load(Ordering::SeqCst)
    }

    fn verdict(&self, image_url: &str) -> Verdict {
        self.verdicts
            .get(image_url)
            .copied()
            .unwrap_or(Verdict::NoMatch)
    }
}

/// Plate the fake reads from an image
pub fn plate_for(image_url: &str) -> String {
    let suffix: String = image_url
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();
    format!("AV{}", &suffix[suffix.len().saturating_sub(4)..])
}

#[async_trait]
impl VisionService for FakeVision {
    async fn detect(&self, image_url: &str) -> Result<Detection, VisionError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);

        let (is_match, confidence) = match self.verdict(image_url) {
            Verdict::NoMatch => (false, 10.0),
            Verdict::NoPlate(c) | Verdict::Plate(c, _) => (true, c),
            Verdict::Fail => return Err(VisionError::EmptyResponse),
        };

        Ok(Detection {
            is_match,
            provider: is_match.then_some(self.provider),
            confidence,
            reasoning: "fake".to_string(),
        })
    }

    async fn extract_plate(
        &self,
        image_url: &str,
        _provider: Provider,
    ) -> Result<PlateReading, VisionError> {
        self.plate_calls.fetch_add(1, Ordering::SeqCst);

        Ok(match self.verdict(image_url) {
            Verdict::Plate(_, confidence) => PlateReading {
                found: true,
                plate: Some(plate_for(image_url)),
                confidence,
                reasoning: "fake".to_string(),
            },
            _ => PlateReading {
                found: false,
                plate: None,
                confidence: 0.0,
                reasoning: "fake".to_string(),
            },
        })
    }
}

// ============================================================================
// Store
// ============================================================================

/// In-memory sighting store
#[derive(Default)]
pub struct MemoryStore {
    pub outcomes: Mutex<HashMap<(Source, String), OutcomeRecord>>,
    pub fleet: Mutex<HashSet<(String, Provider)>>,
    pub pending: Mutex<HashSet<(String, Provider)>>,
    pub submissions: Mutex<Vec<SubmissionRequest>>,
    pub reject_submissions: bool,
    pub fail_checks: bool,
    pub fail_writes: bool,
    pub calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fleet(self, plate: &str, provider: Provider) -> Self {
        self.fleet
            .lock()
            .unwrap()
            .insert((plate.to_string(), provider));
        self
    }

    pub fn with_pending(self, plate: &str, provider: Provider) -> Self {
        self.pending
            .lock()
            .unwrap()
            .insert((plate.to_string(), provider));
        self
    }

    pub fn outcome(&self, source: Source, source_id: &str) -> Option<OutcomeRecord> {
        self.outcomes
            .lock()
            .unwrap()
            .get(&(source, source_id.to_string()))
            .cloned()
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn unavailable() -> StoreError {
        StoreError::Io(std::io::Error::other("store unavailable"))
    }
}

#[async_trait]
impl SightingStore for MemoryStore {
    async fn is_processed(&self, source: Source, source_id: &str) -> Result<bool, StoreError> {
        if self.fail_checks {
            return Err(Self::unavailable());
        }
        Ok(self.outcome(source, source_id).is_some())
    }

    async fn mark_processed(&self, record: &OutcomeRecord) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Self::unavailable());
        }
        self.outcomes.lock().unwrap().insert(
            (record.key.source, record.key.source_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn plate_exists_in_fleet(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .fleet
            .lock()
            .unwrap()
            .contains(&(plate.to_string(), provider)))
    }

    async fn pending_submission_exists(
        &self,
        plate: &str,
        provider: Provider,
    ) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pending
            .lock()
            .unwrap()
            .contains(&(plate.to_string(), provider)))
    }

    async fn create_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_submissions {
            return Ok(SubmissionResult::failed("moderation queue full"));
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(request.clone());
        self.pending
            .lock()
            .unwrap()
            .insert((request.plate.clone(), request.provider));
        Ok(SubmissionResult::created(format!("sub-{}", submissions.len())))
    }
}

// ============================================================================
// Image storage
// ============================================================================

/// Image storage fake that records uploads
#[derive(Default)]
pub struct FakeImageStorage {
    pub fail: bool,
    pub uploads: Mutex<Vec<String>>,
}

impl FakeImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageStorage for FakeImageStorage {
    async fn upload_image(&self, source_url: &str, key_hint: &str) -> UploadResult {
        self.uploads.lock().unwrap().push(source_url.to_string());
        if self.fail {
            UploadResult::failed("bucket unavailable")
        } else {
            UploadResult::uploaded(format!("https://cdn.example.com/{key_hint}.jpg"))
        }
    }
}
