//! Error types for the sighting pipeline
//!
//! This module defines the domain-specific error types used throughout the application.

use thiserror::Error;

/// Errors that can occur during outbound HTTP requests
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request error that was not retried
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Non-success response returned by a helper that requires 2xx
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Retry budget exhausted
    #[error("Retries exhausted after {attempts} attempts for {url}: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised by a collector run
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Transport failure while scraping
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// External scraper process could not be started or failed
    #[error("Scraper command failed: {0}")]
    Command(String),

    /// Scraper output was not valid
    #[error("Invalid scraper output: {0}")]
    InvalidOutput(String),

    /// Collector task panicked or was cancelled
    #[error("Collector task aborted: {0}")]
    Aborted(String),
}

/// Errors raised by the vision capability
#[derive(Error, Debug)]
pub enum VisionError {
    /// Transport failure talking to the model endpoint
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Model answer could not be interpreted
    #[error("Unparseable model response: {0}")]
    InvalidResponse(String),

    /// Model endpoint returned no choices
    #[error("Empty model response")]
    EmptyResponse,
}

/// Errors raised by the store or image storage capabilities
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection lock poisoned by a panicking writer
    #[error("Store connection poisoned")]
    Poisoned,

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure while downloading an image
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
