//! Fakes shared by the application tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::agent::AgentEvents;
use crate::domain::{
    AppError, ArchiveSink, ChatEntry, ConversationRecord, ExportProgress, Message, PageSurface,
    Result, SurfaceConnector,
};

pub fn entry(id: &str, title: &str) -> ChatEntry {
    ChatEntry {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://gemini.google.com/app/{id}"),
    }
}

pub fn record(id: &str, title: &str) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://gemini.google.com/app/{id}"),
        created_at: None,
        exported_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        messages: vec![Message::requester("cached question"), Message::responder("cached answer")],
    }
}

/// What a fake page was asked to do.
#[derive(Clone, Default)]
pub struct PageLog {
    activated: Arc<Mutex<Vec<String>>>,
    reveals: Arc<AtomicUsize>,
}

impl PageLog {
    pub fn activated(&self) -> Vec<String> {
        self.activated.lock().unwrap().clone()
    }

    pub fn reveals(&self) -> usize {
        self.reveals.load(Ordering::SeqCst)
    }
}

/// In-memory page. Shows `visible` entries and `step` more per scroll.
#[derive(Clone)]
pub struct FakeSurface {
    entries: Vec<ChatEntry>,
    visible: usize,
    step: usize,
    pages: HashMap<String, Vec<Message>>,
    created: HashMap<String, DateTime<Utc>>,
    crash_on: Option<String>,
    active: Option<String>,
    log: PageLog,
}

impl FakeSurface {
    pub fn new(entries: Vec<ChatEntry>) -> Self {
        Self {
            visible: entries.len(),
            entries,
            step: 0,
            pages: HashMap::new(),
            created: HashMap::new(),
            crash_on: None,
            active: None,
            log: PageLog::default(),
        }
    }

    pub fn with_paging(mut self, visible: usize, step: usize) -> Self {
        self.visible = visible;
        self.step = step;
        self
    }

    pub fn with_page(mut self, id: &str, messages: Vec<Message>) -> Self {
        self.pages.insert(id.to_string(), messages);
        self
    }

    pub fn with_created(mut self, id: &str, at: DateTime<Utc>) -> Self {
        self.created.insert(id.to_string(), at);
        self
    }

    /// Panic while reading the given chat, like a page that goes away.
    pub fn with_crash_on(mut self, id: &str) -> Self {
        self.crash_on = Some(id.to_string());
        self
    }

    pub fn log(&self) -> PageLog {
        self.log.clone()
    }
}

#[async_trait]
impl PageSurface for FakeSurface {
    async fn list_entries(&mut self) -> Result<Vec<ChatEntry>> {
        Ok(self.entries.iter().take(self.visible).cloned().collect())
    }

    async fn reveal_more(&mut self) -> Result<()> {
        self.log.reveals.fetch_add(1, Ordering::SeqCst);
        self.visible += self.step;
        Ok(())
    }

    async fn activate(&mut self, entry: &ChatEntry) -> Result<()> {
        self.log.activated.lock().unwrap().push(entry.id.clone());
        self.active = Some(entry.id.clone());
        Ok(())
    }

    async fn extract_messages(&mut self) -> Result<Vec<Message>> {
        if self.active.is_some() && self.active == self.crash_on {
            panic!("page went away while reading {:?}", self.active);
        }
        Ok(self
            .active
            .as_ref()
            .and_then(|id| self.pages.get(id))
            .cloned()
            .unwrap_or_default())
    }

    fn creation_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.created.get(id).copied()
    }
}

/// Hands out copies of one fake page, or fails every time.
pub struct FakeConnector {
    surface: Option<FakeSurface>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(surface: FakeSurface) -> Self {
        Self {
            surface: Some(surface),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            surface: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn PageSurface>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.surface {
            Some(surface) => Ok(Box::new(surface.clone())),
            None => Err(AppError::dispatch("Open Gemini first")),
        }
    }
}

/// Keeps saved archives in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn saved_names(&self) -> Vec<String> {
        self.saved.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    /// File names inside the most recent archive.
    pub fn last_archive_entries(&self) -> Vec<String> {
        let saved = self.saved.lock().unwrap();
        let (_, bytes) = saved.last().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        archive.file_names().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl ArchiveSink for MemorySink {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        self.saved
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes));
        Ok(format!("memory://{file_name}"))
    }
}

/// Records every event the agent emits.
#[derive(Default)]
pub struct RecordingEvents {
    progress: Mutex<Vec<ExportProgress>>,
    cached: Mutex<Vec<ConversationRecord>>,
}

impl RecordingEvents {
    pub fn updates(&self) -> Vec<ExportProgress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn cached_ids(&self) -> Vec<String> {
        self.cached.lock().unwrap().iter().map(|r| r.id.clone()).collect()
    }
}

#[async_trait]
impl AgentEvents for RecordingEvents {
    async fn progress(&self, progress: ExportProgress) {
        self.progress.lock().unwrap().push(progress);
    }

    async fn cache_chat(&self, record: ConversationRecord) {
        self.cached.lock().unwrap().push(record);
    }
}
