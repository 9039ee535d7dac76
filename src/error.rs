//! Unified error handling for the avspotter crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`AvspotterErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use thiserror::Error;

pub use crate::utils::error::{CollectorError, StoreError, TransportError, VisionError};

/// Common trait for all avspotter error types
pub trait AvspotterErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Collector and scraper output errors
    Collector,
    /// Vision model errors
    Vision,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Collector => "collector",
            Self::Vision => "vision",
            Self::Storage => "storage",
            Self::Config => "config",
        }
    }
}

impl AvspotterErrorTrait for TransportError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout | Self::RetriesExhausted { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

impl AvspotterErrorTrait for CollectorError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Command(_) | Self::Aborted(_) => true,
            Self::InvalidOutput(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Network,
            _ => ErrorCategory::Collector,
        }
    }
}

impl AvspotterErrorTrait for VisionError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::InvalidResponse(_) | Self::EmptyResponse => true,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Network,
            _ => ErrorCategory::Vision,
        }
    }
}

impl AvspotterErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Corrupt(_) | Self::Poisoned => false,
            Self::Io(_) => true,
            Self::Transport(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Network,
            _ => ErrorCategory::Storage,
        }
    }
}

/// Unified error type for the avspotter crate
///
/// Returned by entry points that wire several subsystems together.
#[derive(Error, Debug)]
pub enum Error {
    /// Outbound request errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Collector errors
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Vision capability errors
    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    /// Store and image storage errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl AvspotterErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Collector(e) => e.is_recoverable(),
            Self::Vision(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(e) => e.category(),
            Self::Collector(e) => e.category(),
            Self::Vision(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
