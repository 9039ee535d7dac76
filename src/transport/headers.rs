//! Identification header rotation
//!
//! Each attempt carries the next `User-Agent` from a fixed pool, round-robin, to
//! avoid tripping naive anti-bot heuristics on scraped endpoints.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pool of realistic User-Agent strings for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Round-robin cursor over [`USER_AGENTS`], shared between clones
#[derive(Debug, Clone, Default)]
pub struct UserAgentRotation {
    cursor: Arc<AtomicUsize>,
}

impl UserAgentRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next user agent in the pool
    pub fn next_agent(&self) -> &'static str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[idx % USER_AGENTS.len()]
    }

    /// Build the base headers for one attempt
    pub fn attempt_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.next_agent()));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/html;q=0.9, image/*;q=0.8, */*;q=0.5"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }
}
