//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::utils::error::TransportError;

/// Extract the host (with port, if any) from a URL
pub fn extract_host(url: &str) -> Result<String, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{url}: no host")))?;

    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Normalize a license plate to uppercase alphanumerics
///
/// Returns `None` when nothing usable remains.
pub fn normalize_plate(raw: &str) -> Option<String> {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();

    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^A-Za-z0-9]").expect("Invalid regex pattern"));

    let plate = re.replace_all(raw.trim(), "").to_uppercase();
    if plate.is_empty() {
        None
    } else {
        Some(plate)
    }
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
