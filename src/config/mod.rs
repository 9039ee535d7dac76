//! Configuration management for avspotter
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Source;
use crate::orchestrator::EvaluationStrategy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound request configuration
    pub transport: TransportConfig,

    /// Collector registry configuration
    pub registry: RegistryConfig,

    /// Per-item pipeline configuration
    pub pipeline: PipelineConfig,

    /// Vision model configuration
    pub vision: VisionConfig,

    /// Store and image storage configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Transport client defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total attempts per request
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub backoff_ms: u64,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum in-flight requests per destination host
    pub per_host_concurrency: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 2000,
            timeout_ms: 15_000,
            per_host_concurrency: 4,
        }
    }
}

/// Collector registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum collectors running at once
    pub concurrency: usize,

    /// Every Nth run re-admits failed collectors
    pub recovery_interval: u64,

    /// Default lookback window in hours
    pub lookback_hours: i64,

    /// Configured external scraper collectors
    pub collectors: Vec<CollectorConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            recovery_interval: 10,
            lookback_hours: 24,
            collectors: Vec::new(),
        }
    }
}

/// One external scraper command registered as a collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Unique collector name
    pub name: String,

    /// Source the scraper reports for
    pub source: Source,

    /// Program to execute
    pub command: String,

    /// Arguments placed before `--since`
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower runs first
    #[serde(default)]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

/// Per-item pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum detection confidence (0-100)
    pub detection_threshold: f32,

    /// Minimum plate confidence (0-100)
    pub plate_threshold: f32,

    /// Pause between images of one item in milliseconds
    pub image_delay_ms: u64,

    /// Pause between items in milliseconds
    pub item_delay_ms: u64,

    /// Image evaluation strategy
    pub strategy: EvaluationStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 70.0,
            plate_threshold: 60.0,
            image_delay_ms: 1000,
            item_delay_ms: 2000,
            strategy: EvaluationStrategy::BestOfAll,
        }
    }
}

/// Vision model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// OpenAI-compatible API base URL
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// API key (optional for local endpoints)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://api.openai.com/v1"),
            model: String::from("gpt-4o-mini"),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Directory for uploaded evidence images
    pub image_dir: PathBuf,

    /// Base URL under which `image_dir` is served
    pub public_base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/avspotter.db"),
            image_dir: PathBuf::from("data/images"),
            public_base_url: String::from("http://localhost:8080/images"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("AVSPOTTER_MAX_RETRIES") {
            self.transport.max_retries = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_BACKOFF_MS") {
            self.transport.backoff_ms = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_REQUEST_TIMEOUT_MS") {
            self.transport.timeout_ms = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_PER_HOST_CONCURRENCY") {
            self.transport.per_host_concurrency = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_CONCURRENCY") {
            self.registry.concurrency = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_LOOKBACK_HOURS") {
            self.registry.lookback_hours = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_DETECTION_THRESHOLD") {
            self.pipeline.detection_threshold = v;
        }
        if let Some(v) = env_parse("AVSPOTTER_PLATE_THRESHOLD") {
            self.pipeline.plate_threshold = v;
        }
        if let Ok(v) = std::env::var("AVSPOTTER_VISION_ENDPOINT") {
            self.vision.endpoint = v;
        }
        if let Ok(v) = std::env::var("AVSPOTTER_VISION_MODEL") {
            self.vision.model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.vision.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("AVSPOTTER_SQLITE_PATH") {
            self.store.sqlite_path = v.into();
        }
        if let Ok(v) = std::env::var("AVSPOTTER_IMAGE_DIR") {
            self.store.image_dir = v.into();
        }
        if let Ok(v) = std::env::var("AVSPOTTER_PUBLIC_BASE_URL") {
            self.store.public_base_url = v;
        }
        if let Ok(v) = std::env::var("AVSPOTTER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("AVSPOTTER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.transport.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }

        if self.transport.per_host_concurrency == 0 {
            anyhow::bail!("per_host_concurrency must be greater than 0");
        }

        if self.registry.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }

        if self.registry.recovery_interval == 0 {
            anyhow::bail!("recovery_interval must be greater than 0");
        }

        if self.registry.lookback_hours <= 0 {
            anyhow::bail!("lookback_hours must be positive");
        }

        for (name, value) in [
            ("detection_threshold", self.pipeline.detection_threshold),
            ("plate_threshold", self.pipeline.plate_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                anyhow::bail!("{name} must be within 0..=100, got {value}");
            }
        }

        let mut names = std::collections::HashSet::new();
        for collector in &self.registry.collectors {
            if collector.command.trim().is_empty() {
                anyhow::bail!("collector {} has an empty command", collector.name);
            }
            if !names.insert(collector.name.as_str()) {
                anyhow::bail!("duplicate collector name: {}", collector.name);
            }
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.timeout_ms)
    }
}
