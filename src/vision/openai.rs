//! OpenAI-compatible chat-completions vision client

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::extract_json;
use crate::config::VisionConfig;
use crate::models::{Detection, PlateReading, Provider};
use crate::services::VisionService;
use crate::transport::{ensure_success, FetchOptions, TransportClient};
use crate::utils::error::VisionError;
use crate::utils::{normalize_plate, truncate_text};

const DETECTION_PROMPT: &str = r#"You are reviewing a photo posted on social media.
Decide whether it shows an autonomous test or robotaxi vehicle operated by Tesla, Waymo or Zoox.
Answer with JSON only, no prose:
{"is_match": true|false, "provider": "tesla"|"waymo"|"zoox"|null, "confidence": 0-100, "reasoning": "short explanation"}"#;

/// Chat completion response, trimmed to what is read
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Detection verdict as the model writes it
#[derive(Debug, Deserialize, Serialize)]
struct RawDetection {
    #[serde(default)]
    is_match: bool,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Plate verdict as the model writes it
#[derive(Debug, Deserialize, Serialize)]
struct RawPlate {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    plate: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Vision service backed by a chat-completions endpoint
pub struct OpenAiVision {
    transport: TransportClient,
    config: VisionConfig,
}

impl OpenAiVision {
    pub fn new(transport: TransportClient, config: VisionConfig) -> Self {
        Self { transport, config }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    /// Ask the model about one image and return its raw text answer
    async fn ask(&self, prompt: &str, image_url: &str) -> Result<String, VisionError> {
        let request = json!({
            "model": self.config.model,
            "temperature": 0,
            "max_tokens": 300,
            "response_format": {"type": "json_object"},
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": image_url}}
                ]
            }]
        });

        let mut options = self
            .transport
            .options()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .post_json(&request)?;

        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| VisionError::InvalidResponse(format!("invalid api key: {e}")))?;
            options = options.header(AUTHORIZATION, value);
        }

        let url = self.completions_url();
        let response = self.transport.fetch(&url, &options).await?;
        let response = ensure_success(&url, response)?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)
    }
}

#[async_trait]
impl VisionService for OpenAiVision {
    async fn detect(&self, image_url: &str) -> Result<Detection, VisionError> {
        let answer = self.ask(DETECTION_PROMPT, image_url).await?;
        let detection = parse_detection(&answer)?;

        tracing::debug!(
            image_url,
            is_match = detection.is_match,
            provider = ?detection.provider,
            confidence = detection.confidence,
            "Detection verdict"
        );
        Ok(detection)
    }

    async fn extract_plate(
        &self,
        image_url: &str,
        provider: Provider,
    ) -> Result<PlateReading, VisionError> {
        let answer = self.ask(&plate_prompt(provider), image_url).await?;
        let reading = parse_plate(&answer)?;

        tracing::debug!(
            image_url,
            %provider,
            found = reading.found,
            plate = reading.plate.as_deref(),
            confidence = reading.confidence,
            "Plate verdict"
        );
        Ok(reading)
    }
}

fn plate_prompt(provider: Provider) -> String {
    format!(
        r#"This photo shows a {provider} autonomous vehicle.
Read its license plate exactly as printed. If no plate is legible, say so.
Answer with JSON only, no prose:
{{"found": true|false, "plate": "ABC1234"|null, "confidence": 0-100, "reasoning": "short explanation"}}"#
    )
}

fn decode<T: for<'de> Deserialize<'de>>(answer: &str) -> Result<T, VisionError> {
    let json = extract_json(answer);
    serde_json::from_str(&json).map_err(|e| {
        VisionError::InvalidResponse(format!("{e}: {}", truncate_text(answer, 200)))
    })
}

/// Interpret a detection answer
///
/// Unknown providers are treated as no provider, which never clears detection.
fn parse_detection(answer: &str) -> Result<Detection, VisionError> {
    let raw: RawDetection = decode(answer)?;
    let provider = raw.provider.as_deref().and_then(|p| p.parse().ok());

    Ok(Detection {
        is_match: raw.is_match && provider.is_some(),
        provider,
        confidence: raw.confidence.clamp(0.0, 100.0),
        reasoning: raw.reasoning,
    })
}

/// Interpret a plate answer; plates that normalise to nothing count as not found
fn parse_plate(answer: &str) -> Result<PlateReading, VisionError> {
    let raw: RawPlate = decode(answer)?;
    let plate = if raw.found {
        raw.plate.as_deref().and_then(normalize_plate)
    } else {
        None
    };

    Ok(PlateReading {
        found: plate.is_some(),
        plate,
        confidence: raw.confidence.clamp(0.0, 100.0),
        reasoning: raw.reasoning,
    })
}
