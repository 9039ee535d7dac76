//! Collector backed by an external scraper process
//!
//! The scraper is invoked as `<command> <args..> --since <RFC3339>` and must
//! print a JSON array of posts on stdout:
//!
//! ```json
//! [{"source": "reddit", "sourceId": "1abc", "sourceUrl": "https://...",
//!   "authorUsername": "spotter", "title": "", "text": "...",
//!   "imageUrls": ["https://i.redd.it/x.jpg"], "createdAt": "2024-05-01T12:00:00Z"}]
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::CollectorConfig;
use crate::models::{Item, Source};
use crate::services::Collector;
use crate::utils::error::CollectorError;
use crate::utils::truncate_text;

/// Default wall-clock limit for one scraper run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Post as printed by the scraper
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapedPost {
    #[serde(default)]
    source: Option<String>,
    source_id: String,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    author_username: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
    created_at: String,
}

/// Runs a scraper executable for one source
#[derive(Debug, Clone)]
pub struct CommandCollector {
    name: String,
    source: Source,
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCollector {
    pub fn new(
        name: impl Into<String>,
        source: Source,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            command: command.into(),
            args,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.source,
            config.command.clone(),
            config.args.clone(),
        )
    }

    /// Override the wall-clock limit for one run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn execute(&self, window_start: DateTime<Utc>) -> Result<Vec<u8>, CollectorError> {
        let since = window_start.to_rfc3339_opts(SecondsFormat::Secs, true);

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg("--since")
            .arg(&since)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollectorError::Command(format!("{}: {}", self.command, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                CollectorError::Command(format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| CollectorError::Command(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectorError::Command(format!(
                "{}: {}",
                output.status,
                truncate_text(stderr.trim(), 500)
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Collector for CommandCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self, window_start: DateTime<Utc>) -> Result<Vec<Item>, CollectorError> {
        let stdout = self.execute(window_start).await?;
        let items = parse_posts(&stdout, self.source, window_start)?;

        tracing::debug!(collector = %self.name, items = items.len(), "Scraper output parsed");
        Ok(items)
    }
}

/// Decode scraper output into items inside the window
///
/// Posts without images or created before `window_start` are dropped.
pub fn parse_posts(
    stdout: &[u8],
    default_source: Source,
    window_start: DateTime<Utc>,
) -> Result<Vec<Item>, CollectorError> {
    let posts: Vec<ScrapedPost> =
        serde_json::from_slice(stdout).map_err(|e| CollectorError::InvalidOutput(e.to_string()))?;

    let mut items = Vec::with_capacity(posts.len());
    for post in posts {
        if post.image_urls.is_empty() {
            continue;
        }

        let Some(created_at) = parse_timestamp(&post.created_at) else {
            tracing::debug!(source_id = %post.source_id, created_at = %post.created_at, "Unparseable timestamp, dropping post");
            continue;
        };
        if created_at < window_start {
            continue;
        }

        let source = post
            .source
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_source);

        items.push(Item {
            source,
            source_id: post.source_id,
            url: post.source_url,
            image_urls: post.image_urls,
            created_at,
            title: post.title.unwrap_or_default(),
            body: post.text.unwrap_or_default(),
            author: post.author_username.filter(|a| !a.is_empty() && a != "unknown"),
        });
    }

    Ok(items)
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Offset-aware timestamps suffixed with a stray "Z"
    let trimmed = raw.trim_end_matches('Z');
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_posts_filters() {
        let stdout = br#"[
            {"source": "reddit", "sourceId": "new", "sourceUrl": "https://reddit.com/r/waymo/new",
             "authorUsername": "spotter", "title": "Waymo", "text": "look",
             "imageUrls": ["https://i.redd.it/a.jpg"], "createdAt": "2024-05-01T12:00:00.123456Z"},
            {"source": "reddit", "sourceId": "old", "sourceUrl": "",
             "imageUrls": ["https://i.redd.it/b.jpg"], "createdAt": "2024-04-30T12:00:00Z"},
            {"source": "reddit", "sourceId": "textonly", "sourceUrl": "",
             "imageUrls": [], "createdAt": "2024-05-01T12:00:00Z"}
        ]"#;

        let items = parse_posts(stdout, Source::X, window()).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.source, Source::Reddit);
        assert_eq!(item.source_id, "new");
        assert_eq!(item.author.as_deref(), Some("spotter"));
        assert_eq!(item.body, "look");
    }

    #[test]
    fn test_parse_posts_defaults_source_and_drops_unknown_author() {
        let stdout = br#"[{"sourceId": "9", "authorUsername": "unknown",
            "imageUrls": ["https://pbs.twimg.com/x.jpg"], "createdAt": "2024-05-02T00:00:00"}]"#;

        let items = parse_posts(stdout, Source::X, window()).unwrap();
        assert_eq!(items[0].source, Source::X);
        assert!(items[0].author.is_none());
    }

    #[test]
    fn test_parse_posts_rejects_garbage() {
        let result = parse_posts(b"{\"error\": \"boom\"}", Source::Reddit, window());
        assert!(matches!(result, Err(CollectorError::InvalidOutput(_))));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scrape_runs_command() {
        let script = r#"echo '[{"sourceId":"1","imageUrls":["https://i.redd.it/a.jpg"],"createdAt":"2099-01-01T00:00:00Z"}]'"#;
        let collector = CommandCollector::new(
            "reddit",
            Source::Reddit,
            "sh",
            vec!["-c".into(), script.into(), "scraper".into()],
        );

        let items = collector.scrape(window()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, Source::Reddit);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scrape_nonzero_exit_fails() {
        let collector = CommandCollector::new(
            "x",
            Source::X,
            "sh",
            vec!["-c".into(), "echo rate limited >&2; exit 3".into(), "scraper".into()],
        );

        let err = collector.scrape(window()).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_scrape_missing_program_fails() {
        let collector = CommandCollector::new(
            "missing",
            Source::X,
            "/nonexistent/avspotter-scraper",
            vec![],
        );
        assert!(matches!(
            collector.scrape(window()).await,
            Err(CollectorError::Command(_))
        ));
    }
}
