//! Domain models for exported Gemini conversations.
//!
//! These models represent the records kept in the content cache and written
//! into export archives, plus the messages exchanged while an export runs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status prefix marking a successful export.
pub const DONE_PREFIX: &str = "Done!";

/// Status prefix marking a failed export.
pub const ERROR_PREFIX: &str = "Error";

/// Default number of sidebar entries to reveal when auto-scrolling.
pub const DEFAULT_SCROLL_LIMIT: usize = 100;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Message typed by the human.
    #[serde(rename = "user", alias = "requester")]
    Requester,
    /// Message generated by the model.
    #[serde(rename = "model", alias = "responder")]
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requester => write!(f, "User"),
            Self::Responder => write!(f, "Gemini"),
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn requester(content: impl Into<String>) -> Self {
        Self {
            role: Role::Requester,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn responder(content: impl Into<String>) -> Self {
        Self {
            role: Role::Responder,
            content: content.into(),
        }
    }
}

/// One exported conversation, keyed by `id` in the content cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Opaque conversation identifier, stable across sessions.
    pub id: String,
    /// Display title from the sidebar. Not unique.
    #[serde(default)]
    pub title: String,
    /// Canonical link to the conversation.
    pub url: String,
    /// Creation time, when the network side-channel observed one.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Time of the most recent successful extraction.
    pub exported_at: DateTime<Utc>,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    /// Get total message count.
    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// A conversation entry discovered in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Output document formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured JSON documents plus the aggregate `_all_chats.json`.
    #[default]
    Json,
    /// Human-readable Markdown documents.
    #[serde(rename = "md", alias = "markdown")]
    Markdown,
    /// Both of the above.
    Both,
}

impl ExportFormat {
    /// Whether structured documents are written.
    #[must_use]
    pub const fn structured(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    /// Whether readable documents are written.
    #[must_use]
    pub const fn readable(self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "structured" => Ok(Self::Json),
            "md" | "markdown" | "readable" => Ok(Self::Markdown),
            "both" => Ok(Self::Both),
            _ => Err(format!("Unknown format: {s}. Use: json, md, both")),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "md"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Options for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Re-extract every listed conversation, ignoring the cache.
    pub force_refresh: bool,
    /// Scroll the sidebar to reveal more conversations before fetching.
    pub auto_scroll: bool,
    /// Stop scrolling once this many entries are visible.
    pub scroll_limit: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            force_refresh: false,
            auto_scroll: false,
            scroll_limit: DEFAULT_SCROLL_LIMIT,
        }
    }
}

/// Instructions handed to the scrape agent.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub force_refresh: bool,
    /// Conversations already cached; these are listed but not fetched.
    pub known_ids: HashSet<String>,
    pub auto_scroll: bool,
    pub scroll_limit: usize,
}

/// What the scrape agent returns on success.
#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    /// Newly extracted records, in discovery order.
    pub fetched: Vec<ConversationRecord>,
    /// Every discovered id, in discovery order.
    pub all_ids: Vec<String>,
}

/// Snapshot of the running export, broadcast to listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub status: String,
}

impl ExportProgress {
    #[must_use]
    pub fn new(current: usize, total: usize, status: impl Into<String>) -> Self {
        Self {
            current,
            total,
            status: status.into(),
        }
    }

    /// Progress with only a status line (0/0 = indeterminate).
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self::new(0, 0, status)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status.starts_with(DONE_PREFIX)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.starts_with(ERROR_PREFIX)
    }

    /// Whether this is the last update of an export.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.is_error()
    }

    /// Completed fraction, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.current.min(self.total) as f64) / (self.total as f64))
    }
}

/// Reply to `startExport`. The result arrives through progress broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartAck {
    pub started: bool,
}

/// Reply to `getCacheStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
}

/// Reply to `clearCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearAck {
    pub cleared: bool,
}

/// Reply to `cacheChat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheAck {
    pub cached: bool,
}

/// Totals of a completed export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub total: usize,
    pub fetched: usize,
    pub from_cache: usize,
    /// Where the archive was saved.
    pub saved_to: String,
}

impl ExportSummary {
    /// Terminal status line for a successful export.
    #[must_use]
    pub fn status_line(&self) -> String {
        format!(
            "{DONE_PREFIX} {} chats ({} fetched, {} from cache)",
            self.total, self.fetched, self.from_cache
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_uses_camel_case() {
        let record = ConversationRecord {
            id: "abc1234567".into(),
            title: "Plan".into(),
            url: "https://gemini.google.com/app/abc1234567".into(),
            created_at: None,
            exported_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            messages: vec![Message::requester("hi"), Message::responder("hello")],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("exportedAt").is_some());
        assert!(json.get("createdAt").unwrap().is_null());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "model");
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("json".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("readable".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("BOTH".parse::<ExportFormat>(), Ok(ExportFormat::Both));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_progress_prefixes() {
        assert!(ExportProgress::status("Done! 2 chats").is_terminal());
        assert!(ExportProgress::status("Error: boom").is_error());
        assert!(!ExportProgress::status("Creating ZIP...").is_terminal());
        assert_eq!(ExportProgress::default().fraction(), None);
        assert_eq!(ExportProgress::new(1, 4, "").fraction(), Some(0.25));
    }

    #[test]
    fn test_summary_status_line() {
        let summary = ExportSummary {
            total: 5,
            fetched: 2,
            from_cache: 3,
            saved_to: String::new(),
        };
        assert_eq!(
            summary.status_line(),
            "Done! 5 chats (2 fetched, 3 from cache)"
        );
    }
}
