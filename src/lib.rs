//! avspotter - Autonomous vehicle sighting pipeline
//!
//! Scrapes social media for photos of autonomous test vehicles, reads their
//! license plates with a vision model and files moderation submissions for
//! vehicles not yet in the tracked fleet.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`transport`] - Resilient HTTP client with retry and per-host limits
//! - [`registry`] - Collector registry with health tracking and bounded dispatch
//! - [`orchestrator`] - Per-item state machine and scrape cycles
//! - [`services`] - Capability traits for collectors, vision, store and storage
//! - [`collectors`] - External scraper command collectors
//! - [`vision`] - OpenAI-compatible vision client
//! - [`storage`] - SQLite store and local image storage
//! - [`models`] - Core data structures and types
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use avspotter::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!
//!     let report = orchestrator.run_cycle(chrono::Duration::hours(24), 3).await;
//!     println!("Processed {} items", report.processed);
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;
pub mod vision;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{AvspotterErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{
        Candidate, Item, ItemKey, OutcomeRecord, OutcomeStatus, Provider, Source,
    };
    pub use crate::orchestrator::{CycleReport, EvaluationStrategy, Orchestrator, Pacer};
    pub use crate::registry::{HealthStatus, SourceRegistry};
    pub use crate::services::{Collector, ImageStorage, SightingStore, VisionService};
    pub use crate::storage::{LocalImageStorage, SqliteStore};
    pub use crate::transport::{FetchOptions, TransportClient};
    pub use crate::vision::OpenAiVision;
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{Item, OutcomeStatus, Provider, Source};
