//! Creation-time capture from the page's network traffic.
//!
//! The chat list never shows when a conversation was started, but the
//! page's RPC responses carry `[seconds, nanos]` pairs. The earliest past
//! one is taken as the conversation's creation time.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::domain::NetworkObserver;

/// RPC endpoints whose responses carry conversation timestamps.
const WATCHED_ENDPOINTS: &[&str] = &["batchexecute", "BardFrontendService", "_/BardChat"];

/// Plausible range for conversation timestamps (2020-01-01 .. 2030-01-01).
const MIN_EPOCH_SECS: i64 = 1_577_836_800;
const MAX_EPOCH_SECS: i64 = 1_893_456_000;

#[allow(clippy::expect_used)]
static TIMESTAMP_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{10}),\s*(\d+)\]").expect("valid timestamp pattern"));

#[allow(clippy::expect_used)]
static CHAT_ID_IN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/app/([a-f0-9]+)").expect("valid chat id pattern"));

/// Conversation id from a page URL such as `https://gemini.google.com/app/<id>`.
#[must_use]
pub fn chat_id_from_url(url: &str) -> Option<&str> {
    CHAT_ID_IN_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Shared map of conversation id to captured creation time.
#[derive(Debug, Clone, Default)]
pub struct TimestampRegistry {
    inner: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl TimestampRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a creation time, keeping the earliest one seen per id.
    pub fn publish(&self, chat_id: &str, at: DateTime<Utc>) {
        if let Ok(mut map) = self.inner.lock() {
            map.entry(chat_id.to_string())
                .and_modify(|existing| {
                    if at < *existing {
                        *existing = at;
                    }
                })
                .or_insert(at);
        }
    }

    #[must_use]
    pub fn get(&self, chat_id: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().ok()?.get(chat_id).copied()
    }
}

/// Watches RPC responses and publishes creation times to a registry.
#[derive(Debug, Clone)]
pub struct TimestampInterceptor {
    registry: TimestampRegistry,
}

impl TimestampInterceptor {
    #[must_use]
    pub const fn new(registry: TimestampRegistry) -> Self {
        Self { registry }
    }

    /// Same as `observe`, with an explicit notion of "now".
    pub fn observe_at(&self, page_url: &str, body: &str, now: DateTime<Utc>) {
        let Some(chat_id) = chat_id_from_url(page_url) else {
            return;
        };

        if let Some(earliest) = earliest_past_timestamp(body, now) {
            tracing::debug!(chat_id, created_at = %earliest, "Captured creation time");
            self.registry.publish(chat_id, earliest);
        }
    }
}

impl NetworkObserver for TimestampInterceptor {
    fn matches(&self, url: &str) -> bool {
        WATCHED_ENDPOINTS.iter().any(|endpoint| url.contains(endpoint))
    }

    fn observe(&self, page_url: &str, url: &str, body: &str) {
        if self.matches(url) {
            self.observe_at(page_url, body, Utc::now());
        }
    }
}

/// Earliest in-range timestamp in `body` that lies before `now`.
fn earliest_past_timestamp(body: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TIMESTAMP_PAIR
        .captures_iter(body)
        .filter_map(|c| c.get(1)?.as_str().parse::<i64>().ok())
        .filter(|secs| *secs > MIN_EPOCH_SECS && *secs < MAX_EPOCH_SECS)
        .filter_map(|secs| DateTime::from_timestamp(secs, 0))
        .filter(|ts| *ts < now)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://gemini.google.com/app/0123456789abcdef";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_chat_id_from_url() {
        assert_eq!(chat_id_from_url(PAGE), Some("0123456789abcdef"));
        assert_eq!(chat_id_from_url("https://gemini.google.com/app"), None);
    }

    #[test]
    fn test_picks_earliest_past_in_range() {
        let body = r#"[["x",[1700000500,12]],[1700000100, 999],[1500000000,0],[1880000000,5]]"#;
        let now = at(1_800_000_000);

        assert_eq!(earliest_past_timestamp(body, now), Some(at(1_700_000_100)));
    }

    #[test]
    fn test_future_only_yields_nothing() {
        let body = "[1750000000,0]";
        assert_eq!(earliest_past_timestamp(body, at(1_700_000_000)), None);
    }

    #[test]
    fn test_interceptor_publishes_for_page_conversation() {
        let registry = TimestampRegistry::new();
        let interceptor = TimestampInterceptor::new(registry.clone());

        interceptor.observe_at(PAGE, "[1700000000,1]", at(1_800_000_000));
        interceptor.observe_at(PAGE, "[1710000000,1]", at(1_800_000_000));

        assert_eq!(registry.get("0123456789abcdef"), Some(at(1_700_000_000)));
    }

    #[test]
    fn test_only_watched_endpoints_match() {
        let interceptor = TimestampInterceptor::new(TimestampRegistry::new());
        assert!(interceptor
            .matches("https://gemini.google.com/_/BardChatUi/data/batchexecute?rpcids=x"));
        assert!(!interceptor.matches("https://gemini.google.com/static/app.js"));
    }
}
