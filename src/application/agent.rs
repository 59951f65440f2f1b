//! Scrape agent.
//!
//! Drives the live page: discovers sidebar entries, then opens each
//! conversation that is not cached yet, one at a time, and extracts its
//! messages. The page can only show one conversation at a time, so the
//! fetch loop is strictly sequential.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    AppError, ChatEntry, CollectOptions, CollectOutcome, ConversationRecord, ExportProgress,
    PageSurface, Result, TimingConfig,
};

/// Consecutive scrolls without new entries before discovery gives up.
const STALL_PROBES: usize = 3;

/// Characters of the title shown in per-item progress.
const PROGRESS_TITLE_CHARS: usize = 30;

/// Where the agent sends progress and freshly fetched records.
#[async_trait]
pub trait AgentEvents: Send + Sync {
    /// Report progress. Best effort.
    async fn progress(&self, progress: ExportProgress);

    /// Persist a record as soon as it is fetched. Best effort.
    async fn cache_chat(&self, record: ConversationRecord);
}

/// Extracts conversations from a page surface.
pub struct ScrapeAgent {
    surface: Box<dyn PageSurface>,
    events: Arc<dyn AgentEvents>,
    timing: TimingConfig,
}

impl ScrapeAgent {
    #[must_use]
    pub fn new(
        surface: Box<dyn PageSurface>,
        events: Arc<dyn AgentEvents>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            surface,
            events,
            timing,
        }
    }

    /// Discover every conversation and fetch the ones not in `known_ids`.
    ///
    /// # Errors
    /// Returns `AppError::Discovery` if no conversation can be discovered.
    pub async fn collect(mut self, options: &CollectOptions) -> Result<CollectOutcome> {
        self.report(0, 0, "Finding chats...").await;

        let entries = self.discover(options).await?;
        if entries.is_empty() {
            return Err(AppError::Discovery {
                message: "No chats found. Make sure sidebar is visible.".into(),
            });
        }

        let all_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let to_fetch: Vec<&ChatEntry> = entries
            .iter()
            .filter(|e| options.force_refresh || !options.known_ids.contains(&e.id))
            .collect();
        let total = to_fetch.len();

        self.report(
            0,
            total,
            format!(
                "Found {} chats ({} to fetch, {} cached)",
                entries.len(),
                total,
                entries.len() - total
            ),
        )
        .await;

        if to_fetch.is_empty() {
            return Ok(CollectOutcome {
                fetched: Vec::new(),
                all_ids,
            });
        }

        let mut fetched = Vec::with_capacity(total);
        for (i, entry) in to_fetch.into_iter().enumerate() {
            let short_title: String = entry.title.chars().take(PROGRESS_TITLE_CHARS).collect();
            let current = i + 1;
            self.report(current, total, format!("Fetching {current}/{total}: {short_title}..."))
                .await;

            let record = self.fetch(entry).await;
            self.events.cache_chat(record.clone()).await;
            fetched.push(record);

            tokio::time::sleep(self.timing.item_delay()).await;
        }

        self.report(total, total, "Processing...").await;

        Ok(CollectOutcome { fetched, all_ids })
    }

    /// Entries visible now, scrolling for more when asked to.
    async fn discover(&mut self, options: &CollectOptions) -> Result<Vec<ChatEntry>> {
        let mut entries = self.list_unique().await?;
        if !options.auto_scroll {
            return Ok(entries);
        }

        let mut seen: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut stalls = 0;

        while entries.len() < options.scroll_limit && stalls < STALL_PROBES {
            if let Err(e) = self.surface.reveal_more().await {
                tracing::warn!(error = %e, "Scrolling the chat list failed");
                break;
            }
            tokio::time::sleep(self.timing.scroll_settle()).await;

            let before = entries.len();
            for entry in self.list_unique().await? {
                if seen.insert(entry.id.clone()) {
                    entries.push(entry);
                }
            }

            if entries.len() > before {
                stalls = 0;
            } else {
                stalls += 1;
            }

            tracing::debug!(found = entries.len(), stalls, "Scrolled chat list");
            self.report(
                0,
                0,
                format!("Loading more chats... ({} found)", entries.len()),
            )
            .await;
        }

        Ok(entries)
    }

    /// Visible entries with duplicate ids removed (first one wins).
    async fn list_unique(&mut self) -> Result<Vec<ChatEntry>> {
        let listed = self
            .surface
            .list_entries()
            .await
            .map_err(|e| AppError::Discovery {
                message: format!("Could not read chat list: {e}"),
            })?;

        Ok(dedupe_entries(listed))
    }

    /// Open one conversation and turn it into a record. Never fails: a
    /// conversation that cannot be read is kept with no messages.
    async fn fetch(&mut self, entry: &ChatEntry) -> ConversationRecord {
        if let Err(e) = self.surface.activate(entry).await {
            tracing::warn!(id = %entry.id, error = %e, "Failed to open conversation");
        }

        tokio::time::sleep(self.timing.settle()).await;

        let messages = match self.surface.extract_messages().await {
            Ok(messages) => messages
                .into_iter()
                .filter(|m| !m.content.trim().is_empty())
                .collect(),
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "Failed to extract messages");
                Vec::new()
            }
        };

        tracing::debug!(id = %entry.id, messages = messages.len(), "Fetched conversation");

        ConversationRecord {
            id: entry.id.clone(),
            title: entry.title.clone(),
            url: entry.url.clone(),
            created_at: self.surface.creation_time(&entry.id),
            exported_at: Utc::now(),
            messages,
        }
    }

    async fn report(&mut self, current: usize, total: usize, status: impl Into<String>) {
        self.events
            .progress(ExportProgress::new(current, total, status))
            .await;
    }
}

/// Drop repeated ids, keeping the first occurrence and page order.
#[must_use]
pub fn dedupe_entries(entries: Vec<ChatEntry>) -> Vec<ChatEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{entry, FakeSurface, RecordingEvents};
    use crate::domain::Message;

    fn agent(surface: FakeSurface, events: &Arc<RecordingEvents>) -> ScrapeAgent {
        ScrapeAgent::new(
            Box::new(surface),
            Arc::clone(events) as Arc<dyn AgentEvents>,
            TimingConfig::default(),
        )
    }

    fn known(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let deduped = dedupe_entries(vec![
            entry("aaaaaaaaaa", "First"),
            entry("bbbbbbbbbb", "Other"),
            entry("aaaaaaaaaa", "Second"),
        ]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "First");
        assert_eq!(deduped[1].id, "bbbbbbbbbb");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_known_ids_but_lists_them() {
        let surface = FakeSurface::new(vec![
            entry("aaaaaaaaaa", "Cached"),
            entry("bbbbbbbbbb", "New"),
            entry("aaaaaaaaaa", "Cached again"),
        ])
        .with_page("bbbbbbbbbb", vec![Message::requester("hi"), Message::responder("hello")]);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions {
                known_ids: known(&["aaaaaaaaaa"]),
                ..CollectOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.all_ids, vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
        assert_eq!(outcome.fetched.len(), 1);
        assert_eq!(outcome.fetched[0].messages.len(), 2);
        assert_eq!(log.activated(), vec!["bbbbbbbbbb"]);
        assert_eq!(events.cached_ids(), vec!["bbbbbbbbbb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_fetch_returns_full_listing() {
        let surface = FakeSurface::new(vec![entry("aaaaaaaaaa", "A"), entry("bbbbbbbbbb", "B")]);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions {
                known_ids: known(&["aaaaaaaaaa", "bbbbbbbbbb"]),
                ..CollectOptions::default()
            })
            .await
            .unwrap();

        assert!(outcome.fetched.is_empty());
        assert_eq!(outcome.all_ids.len(), 2);
        assert!(log.activated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_fetches_everything() {
        let surface = FakeSurface::new(vec![entry("aaaaaaaaaa", "A"), entry("bbbbbbbbbb", "B")]);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions {
                force_refresh: true,
                known_ids: known(&["aaaaaaaaaa"]),
                ..CollectOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.fetched.len(), 2);
        assert_eq!(log.activated(), vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_entries_is_discovery_error() {
        let events = Arc::new(RecordingEvents::default());

        let result = agent(FakeSurface::new(Vec::new()), &events)
            .collect(&CollectOptions::default())
            .await;

        assert!(matches!(result, Err(AppError::Discovery { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_stops_after_three_stalled_scrolls() {
        let surface = FakeSurface::new(vec![entry("aaaaaaaaaa", "Only")]).with_paging(1, 0);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions {
                auto_scroll: true,
                scroll_limit: 100,
                ..CollectOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(log.reveals(), 3);
        assert_eq!(outcome.all_ids.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_stops_at_limit() {
        let entries = (0..10)
            .map(|i| entry(&format!("{i:0>10}"), &format!("Chat {i}")))
            .collect();
        let surface = FakeSurface::new(entries).with_paging(2, 2);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions {
                auto_scroll: true,
                scroll_limit: 5,
                ..CollectOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(log.reveals(), 2);
        assert_eq!(outcome.all_ids.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_auto_scroll_only_visible_entries() {
        let surface = FakeSurface::new(vec![
            entry("aaaaaaaaaa", "A"),
            entry("bbbbbbbbbb", "B"),
        ])
        .with_paging(1, 1);
        let log = surface.log();
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions::default())
            .await
            .unwrap();

        assert_eq!(log.reveals(), 0);
        assert_eq!(outcome.all_ids, vec!["aaaaaaaaaa"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_messages_are_dropped_and_empty_items_kept() {
        let surface = FakeSurface::new(vec![
            entry("aaaaaaaaaa", "Blank"),
            entry("bbbbbbbbbb", "Mixed"),
        ])
        .with_page(
            "bbbbbbbbbb",
            vec![Message::requester("question"), Message::responder("   ")],
        );
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.fetched.len(), 2);
        assert!(outcome.fetched[0].messages.is_empty());
        assert_eq!(outcome.fetched[1].messages, vec![Message::requester("question")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_progress_per_item() {
        let surface = FakeSurface::new(vec![
            entry("aaaaaaaaaa", "A very long conversation title that keeps going"),
            entry("bbbbbbbbbb", "B"),
        ]);
        let events = Arc::new(RecordingEvents::default());

        agent(surface, &events)
            .collect(&CollectOptions::default())
            .await
            .unwrap();

        let statuses: Vec<String> = events.updates().into_iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![
                "Finding chats...",
                "Found 2 chats (2 to fetch, 0 cached)",
                "Fetching 1/2: A very long conversation title...",
                "Fetching 2/2: B...",
                "Processing...",
            ]
        );
        let counters: Vec<(usize, usize)> =
            events.updates().iter().map(|p| (p.current, p.total)).collect();
        assert_eq!(counters[2..], [(1, 2), (2, 2), (2, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_time_comes_from_surface() {
        let created = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let surface =
            FakeSurface::new(vec![entry("aaaaaaaaaa", "A")]).with_created("aaaaaaaaaa", created);
        let events = Arc::new(RecordingEvents::default());

        let outcome = agent(surface, &events)
            .collect(&CollectOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.fetched[0].created_at, Some(created));
    }
}
