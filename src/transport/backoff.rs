//! Retry delay policy
//!
//! Delays grow linearly with the attempt number and never undercut an explicit
//! `Retry-After` hint from the server.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

/// How the client reacts to a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the response back to the caller
    Return,
    /// 429 Too Many Requests
    RateLimited,
    /// 5xx
    ServerError,
}

impl Disposition {
    pub fn of(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status.is_server_error() {
            Self::ServerError
        } else {
            Self::Return
        }
    }
}

/// Delay before the attempt following a 429: `max(retry_after, backoff × attempt × 2)`
pub fn rate_limited_delay(backoff: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let computed = backoff.saturating_mul(attempt.saturating_mul(2));
    retry_after.map_or(computed, |hint| hint.max(computed))
}

/// Delay before the attempt following a 5xx: `max(retry_after, backoff × attempt)`
pub fn server_error_delay(backoff: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let computed = backoff.saturating_mul(attempt);
    retry_after.map_or(computed, |hint| hint.max(computed))
}

/// Delay before the attempt following a timeout or connection error
pub fn network_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(attempt)
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP-date
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    parse_retry_after(value, Utc::now())
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    // A date in the past means "retry now"
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
