// Core data structures for the sighting pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data source that produced an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Reddit,
    X,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reddit => "reddit",
            Source::X => "x",
        }
    }

    pub fn all() -> [Source; 2] {
        [Source::Reddit, Source::X]
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reddit" => Ok(Source::Reddit),
            "x" | "twitter" => Ok(Source::X),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Operator of a tracked autonomous vehicle fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Tesla,
    Waymo,
    Zoox,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tesla => "tesla",
            Provider::Waymo => "waymo",
            Provider::Zoox => "zoox",
        }
    }

    pub fn all() -> [Provider; 3] {
        [Provider::Tesla, Provider::Waymo, Provider::Zoox]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesla" => Ok(Provider::Tesla),
            "waymo" => Ok(Provider::Waymo),
            "zoox" => Ok(Provider::Zoox),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Idempotency key of an item: `(source, source_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: Source,
    pub source_id: String,
}

impl ItemKey {
    pub fn new(source: Source, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// A discovered post awaiting evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub source: Source,
    pub source_id: String, // Unique within `source`
    pub url: String,
    pub image_urls: Vec<String>, // Evaluated in order
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
}

impl Item {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.source_id.clone())
    }
}

/// Provisional match formed while evaluating one item's images
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub image_url: String,
    pub plate: String,
    pub provider: Provider,
    pub plate_confidence: f32,
    pub detection_confidence: f32,
}

impl Candidate {
    /// Whether `self` should replace `current` as the best candidate.
    ///
    /// Higher plate confidence wins; equal plate confidence falls back to
    /// detection confidence. Full ties keep `current`.
    pub fn outranks(&self, current: &Candidate) -> bool {
        if self.plate_confidence > current.plate_confidence {
            return true;
        }
        self.plate_confidence == current.plate_confidence
            && self.detection_confidence > current.detection_confidence
    }
}

/// Terminal classification of a processed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Submitted,
    NotAMatch,
    NoPlateFound,
    Duplicate,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Submitted => "submitted",
            OutcomeStatus::NotAMatch => "not_a_match",
            OutcomeStatus::NoPlateFound => "no_plate_found",
            OutcomeStatus::Duplicate => "duplicate",
            OutcomeStatus::Error => "error",
        }
    }

    pub fn all() -> [OutcomeStatus; 5] {
        [
            OutcomeStatus::Submitted,
            OutcomeStatus::NotAMatch,
            OutcomeStatus::NoPlateFound,
            OutcomeStatus::Duplicate,
            OutcomeStatus::Error,
        ]
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(OutcomeStatus::Submitted),
            "not_a_match" => Ok(OutcomeStatus::NotAMatch),
            "no_plate_found" => Ok(OutcomeStatus::NoPlateFound),
            "duplicate" => Ok(OutcomeStatus::Duplicate),
            "error" => Ok(OutcomeStatus::Error),
            other => Err(format!("unknown outcome status: {other}")),
        }
    }
}

/// Durable result of processing one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub key: ItemKey,
    pub status: OutcomeStatus,
    pub submission_id: Option<String>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(key: ItemKey, status: OutcomeStatus) -> Self {
        Self {
            key,
            status,
            submission_id: None,
            error: None,
            processed_at: Utc::now(),
        }
    }

    pub fn submitted(key: ItemKey, submission_id: impl Into<String>) -> Self {
        Self {
            submission_id: Some(submission_id.into()),
            ..Self::new(key, OutcomeStatus::Submitted)
        }
    }

    pub fn error(key: ItemKey, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(key, OutcomeStatus::Error)
        }
    }
}

/// Vision verdict on whether an image shows a tracked vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub is_match: bool,
    pub provider: Option<Provider>,
    pub confidence: f32, // 0-100
    #[serde(default)]
    pub reasoning: String,
}

/// Vision verdict on the license plate visible in an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateReading {
    pub found: bool,
    pub plate: Option<String>,
    pub confidence: f32, // 0-100
    #[serde(default)]
    pub reasoning: String,
}

/// Moderation submission created for the best candidate of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub plate: String,
    pub provider: Provider,
    pub image_url: String,
    pub source: Source,
    pub source_id: String,
    pub source_url: String,
    pub provenance: String,
    pub plate_confidence: f32,
    pub detection_confidence: f32,
}

/// Store response to a submission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

impl SubmissionResult {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

/// Image storage response to an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub public_url: Option<String>,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn uploaded(public_url: impl Into<String>) -> Self {
        Self {
            success: true,
            public_url: Some(public_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            public_url: None,
            error: Some(error.into()),
        }
    }
}
