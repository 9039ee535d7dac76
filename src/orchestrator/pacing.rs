//! Fixed delays between images and between items
//!
//! Pauses are fixed sleeps, not a token-bucket limiter; items and their images
//! are processed one at a time, so a steady gap is all that is required.

use std::time::Duration;

use crate::config::PipelineConfig;

/// Pacing delays applied by the orchestrator
///
/// A zero delay disables that pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    pub image_delay: Duration,
    pub item_delay: Duration,
}

impl Default for Pacer {
    fn default() -> Self {
        Self {
            image_delay: Duration::from_millis(1000),
            item_delay: Duration::from_millis(2000),
        }
    }
}

impl Pacer {
    pub fn new(image_delay: Duration, item_delay: Duration) -> Self {
        Self {
            image_delay,
            item_delay,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Duration::from_millis(config.image_delay_ms),
            Duration::from_millis(config.item_delay_ms),
        )
    }

    /// No pauses at all
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pause between two images of the same item
    pub async fn between_images(&self) {
        pause(self.image_delay).await;
    }

    /// Pause between a processed item and the next one
    pub async fn between_items(&self) {
        pause(self.item_delay).await;
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
