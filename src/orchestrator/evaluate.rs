//! Image evaluation for one item
//!
//! Every image passes through detection and, if the detector is confident
//! enough, plate extraction. Usable readings become candidates; the strategy
//! decides whether the scan stops at the first one or keeps the best.

use serde::{Deserialize, Serialize};

use super::pacing::Pacer;
use crate::error::AvspotterErrorTrait;
use crate::models::{Candidate, Item};
use crate::services::VisionService;
use crate::utils::error::VisionError;

/// How an item's images are scanned for a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    /// Evaluate every image and keep the best candidate
    #[default]
    BestOfAll,
    /// Stop at the first image that yields a candidate
    FirstMatch,
}

/// Confidence thresholds on the 0-100 scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub detection: f32,
    pub plate: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            detection: 70.0,
            plate: 60.0,
        }
    }
}

/// Result of scanning an item's images
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// At least one image cleared the detection threshold
    pub matched: bool,
    /// Highest-ranked candidate, if any
    pub best: Option<Candidate>,
    /// Images that were actually evaluated
    pub images_evaluated: usize,
}

/// Scan the item's images in order
///
/// Vision failures on one image are logged and the image is treated as having
/// produced nothing.
pub async fn evaluate_images(
    vision: &dyn VisionService,
    item: &Item,
    thresholds: Thresholds,
    strategy: EvaluationStrategy,
    pacer: &Pacer,
) -> Evaluation {
    let mut evaluation = Evaluation::default();
    let total = item.image_urls.len();

    for (index, image_url) in item.image_urls.iter().enumerate() {
        evaluation.images_evaluated += 1;

        match evaluate_image(vision, image_url, thresholds).await {
            Ok(ImageVerdict::NoMatch) => {}
            Ok(ImageVerdict::MatchWithoutPlate) => evaluation.matched = true,
            Ok(ImageVerdict::Candidate(candidate)) => {
                evaluation.matched = true;
                tracing::debug!(
                    item = %item.key(),
                    image = index,
                    plate = %candidate.plate,
                    provider = %candidate.provider,
                    plate_confidence = candidate.plate_confidence,
                    detection_confidence = candidate.detection_confidence,
                    "Candidate found"
                );

                let replace = match &evaluation.best {
                    Some(current) => candidate.outranks(current),
                    None => true,
                };
                if replace {
                    evaluation.best = Some(candidate);
                }

                if strategy == EvaluationStrategy::FirstMatch {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(
                    item = %item.key(),
                    image = index,
                    image_url = %image_url,
                    error = %e,
                    category = e.category().as_str(),
                    "Image evaluation failed"
                );
            }
        }

        if index + 1 < total {
            pacer.between_images().await;
        }
    }

    evaluation
}

enum ImageVerdict {
    NoMatch,
    MatchWithoutPlate,
    Candidate(Candidate),
}

async fn evaluate_image(
    vision: &dyn VisionService,
    image_url: &str,
    thresholds: Thresholds,
) -> Result<ImageVerdict, VisionError> {
    let detection = vision.detect(image_url).await?;

    let provider = match detection.provider {
        Some(provider) if detection.is_match && detection.confidence >= thresholds.detection => {
            provider
        }
        _ => return Ok(ImageVerdict::NoMatch),
    };

    let reading = vision.extract_plate(image_url, provider).await?;

    match reading.plate {
        Some(plate) if reading.found && reading.confidence >= thresholds.plate => {
            Ok(ImageVerdict::Candidate(Candidate {
                image_url: image_url.to_string(),
                plate,
                provider,
                plate_confidence: reading.confidence,
                detection_confidence: detection.confidence,
            }))
        }
        _ => Ok(ImageVerdict::MatchWithoutPlate),
    }
}
