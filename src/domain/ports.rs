//! Capabilities the host environment provides to the export pipeline.
//!
//! The pipeline only talks to storage, the live page and the file system
//! through these traits, so each can be swapped (or faked in tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::Result;
use super::models::{ChatEntry, ConversationRecord, Message};

/// Persistent conversation store keyed by conversation id.
pub trait ContentCache: Send + Sync {
    /// Insert or replace the record with the same id.
    ///
    /// # Errors
    /// Returns error if the write fails.
    fn put(&self, record: &ConversationRecord) -> Result<()>;

    /// Read every stored record. Order is not significant.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    fn load_all(&self) -> Result<Vec<ConversationRecord>>;

    /// Remove every entry.
    ///
    /// # Errors
    /// Returns error if the store cannot be cleared.
    fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    fn count(&self) -> Result<usize> {
        self.load_all().map(|records| records.len())
    }

    /// Every stored record, or nothing if the store is unavailable.
    fn get_all(&self) -> Vec<ConversationRecord> {
        match self.load_all() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, treating cache as empty");
                Vec::new()
            }
        }
    }
}

/// The live chat page. Only one conversation can be active at a time.
#[async_trait]
pub trait PageSurface: Send {
    /// Sidebar entries currently visible, in page order. May repeat ids.
    async fn list_entries(&mut self) -> Result<Vec<ChatEntry>>;

    /// Scroll the sidebar so more entries load.
    async fn reveal_more(&mut self) -> Result<()>;

    /// Open a conversation.
    async fn activate(&mut self, entry: &ChatEntry) -> Result<()>;

    /// Messages of the active conversation, in order.
    async fn extract_messages(&mut self) -> Result<Vec<Message>>;

    /// Creation time captured for a conversation, if any.
    fn creation_time(&self, id: &str) -> Option<DateTime<Utc>>;
}

/// Establishes the scrape agent's page.
#[async_trait]
pub trait SurfaceConnector: Send + Sync {
    /// # Errors
    /// Returns error if the page cannot be reached.
    async fn connect(&self) -> Result<Box<dyn PageSurface>>;
}

/// Destination for finished archives.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Save the archive and return where it ended up.
    ///
    /// # Errors
    /// Returns error if the archive cannot be written.
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Sees network responses received by the page.
pub trait NetworkObserver: Send + Sync {
    /// Whether responses from `url` are of interest.
    fn matches(&self, url: &str) -> bool;

    /// Handle a matching response received while `page_url` was open.
    fn observe(&self, page_url: &str, url: &str, body: &str);
}
