//! Page surface backed by a saved snapshot of the Gemini web app.
//!
//! The snapshot holds what the live page would show: the sidebar links in
//! page order, how many of them load per scroll, each conversation's turns
//! and the network responses the page received while it was open.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::domain::{
    AppError, ChatEntry, Message, NetworkObserver, PageSurface, Result, SurfaceConnector,
};

use super::network_observer::{TimestampInterceptor, TimestampRegistry};

/// Host the snapshot must come from.
const GEMINI_HOST: &str = "gemini.google.com";

/// Suffix the sidebar appends to pinned conversations.
const PINNED_MARKER: &str = "Pinned chat";

#[allow(clippy::expect_used)]
static CHAT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/app/([a-f0-9]{10,})").expect("valid chat link pattern"));

/// Raw snapshot file contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub page_url: String,
    /// Sidebar entries revealed per scroll; 0 shows everything at once.
    #[serde(default)]
    pub batch_size: usize,
    #[serde(default)]
    pub sidebar: Vec<RawLink>,
    #[serde(default)]
    pub conversations: HashMap<String, RawConversation>,
}

impl PageSnapshot {
    /// Parse a snapshot from JSON.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(AppError::json_parse)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLink {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub turns: Vec<RawTurn>,
    #[serde(default)]
    pub traffic: Vec<RawResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTurn {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub url: String,
    pub body: String,
}

/// Turn a sidebar link into an entry. Non-conversation links yield `None`.
#[must_use]
pub fn parse_chat_link(href: &str, text: &str) -> Option<ChatEntry> {
    let id = CHAT_LINK.captures(href)?.get(1)?.as_str().to_string();

    let folded = text.replace('\n', " ");
    let folded = folded.trim();
    let title = folded
        .strip_suffix(PINNED_MARKER)
        .unwrap_or(folded)
        .trim()
        .to_string();

    Some(ChatEntry {
        id,
        title,
        url: href.to_string(),
    })
}

/// A `PageSurface` that replays a `PageSnapshot`.
pub struct SnapshotPage {
    snapshot: PageSnapshot,
    revealed: usize,
    current_url: String,
    active: Option<String>,
    observer: Arc<dyn NetworkObserver>,
    timestamps: TimestampRegistry,
}

impl SnapshotPage {
    /// Build a page with the timestamp interceptor attached.
    #[must_use]
    pub fn new(snapshot: PageSnapshot) -> Self {
        let timestamps = TimestampRegistry::new();
        let observer = Arc::new(TimestampInterceptor::new(timestamps.clone()));
        let revealed = if snapshot.batch_size == 0 {
            snapshot.sidebar.len()
        } else {
            snapshot.batch_size
        };

        Self {
            current_url: snapshot.page_url.clone(),
            snapshot,
            revealed,
            active: None,
            observer,
            timestamps,
        }
    }
}

#[async_trait]
impl PageSurface for SnapshotPage {
    async fn list_entries(&mut self) -> Result<Vec<ChatEntry>> {
        Ok(self
            .snapshot
            .sidebar
            .iter()
            .take(self.revealed)
            .filter_map(|link| parse_chat_link(&link.href, &link.text))
            .collect())
    }

    async fn reveal_more(&mut self) -> Result<()> {
        self.revealed = self.revealed.saturating_add(self.snapshot.batch_size);
        Ok(())
    }

    async fn activate(&mut self, entry: &ChatEntry) -> Result<()> {
        let listed = self
            .snapshot
            .sidebar
            .iter()
            .take(self.revealed)
            .filter_map(|link| parse_chat_link(&link.href, &link.text))
            .any(|e| e.id == entry.id);
        if !listed {
            return Err(AppError::surface(format!(
                "Chat link not on page: {}",
                entry.id
            )));
        }

        self.current_url.clone_from(&entry.url);
        self.active = Some(entry.id.clone());

        if let Some(conversation) = self.snapshot.conversations.get(&entry.id) {
            for response in &conversation.traffic {
                self.observer
                    .observe(&self.current_url, &response.url, &response.body);
            }
        }

        Ok(())
    }

    async fn extract_messages(&mut self) -> Result<Vec<Message>> {
        let Some(conversation) = self
            .active
            .as_ref()
            .and_then(|id| self.snapshot.conversations.get(id))
        else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        for turn in &conversation.turns {
            let query = turn.query.trim();
            if query.chars().count() < 2 {
                continue;
            }
            messages.push(Message::requester(query));

            if let Some(response) = turn.response.as_deref().map(str::trim) {
                if !response.is_empty() {
                    messages.push(Message::responder(response));
                }
            }
        }

        Ok(messages)
    }

    fn creation_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.timestamps.get(id)
    }
}

/// Opens a snapshot file as the scrape agent's page.
#[derive(Debug, Clone)]
pub struct SnapshotConnector {
    path: PathBuf,
}

impl SnapshotConnector {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SurfaceConnector for SnapshotConnector {
    async fn connect(&self) -> Result<Box<dyn PageSurface>> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::dispatch(format!(
                "Cannot open page snapshot {}: {e}",
                self.path.display()
            ))
        })?;

        let snapshot = PageSnapshot::from_json(&json)
            .map_err(|e| AppError::dispatch(format!("Unreadable page snapshot: {e}")))?;

        if !snapshot.page_url.contains(GEMINI_HOST) {
            return Err(AppError::dispatch("Open Gemini first"));
        }

        tracing::debug!(
            path = %self.path.display(),
            links = snapshot.sidebar.len(),
            "Connected to page snapshot"
        );

        Ok(Box::new(SnapshotPage::new(snapshot)))
    }
}
