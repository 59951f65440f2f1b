//! Export orchestrator.
//!
//! A single tokio task owns the [`ExportSession`] and serves every request
//! through one command channel, so session state is never shared. The
//! export pipeline itself runs on a separate task and talks back to the
//! orchestrator with the same commands any other client would send.
//!
//! Progress is pushed to subscribers over a broadcast channel and can also
//! be polled with [`ExportHandle::progress`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::agent::{AgentEvents, ScrapeAgent};
use super::documents::{archive_file_name, render_documents};
use crate::domain::{
    AppError, ArchiveSink, CacheAck, CacheStats, ClearAck, CollectOptions, CollectOutcome,
    ContentCache, ConversationRecord, ExportOptions, ExportProgress, ExportSession,
    ExportSummary, Result, StartAck, SurfaceConnector, TimingConfig,
};
use crate::infrastructure::build_zip;

const COMMAND_BUFFER: usize = 64;
const PROGRESS_BUFFER: usize = 64;

/// Requests understood by the orchestrator.
#[derive(Debug)]
pub enum Command {
    /// Begin an export unless one is already running.
    StartExport {
        options: ExportOptions,
        reply: oneshot::Sender<StartAck>,
    },
    GetProgress {
        reply: oneshot::Sender<ExportProgress>,
    },
    GetCacheStats {
        reply: oneshot::Sender<CacheStats>,
    },
    ClearCache {
        reply: oneshot::Sender<ClearAck>,
    },
    /// Persist one record. The agent sends these without waiting.
    CacheChat {
        record: Box<ConversationRecord>,
        reply: Option<oneshot::Sender<CacheAck>>,
    },
    /// Replace the progress of the running export.
    ProgressUpdate { progress: ExportProgress },
    /// Where the last successful export was saved.
    LastArchive {
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Everything the actor reacts to: client commands plus its own timers.
#[derive(Debug)]
enum Event {
    Command(Command),
    Finished {
        generation: u64,
        result: std::result::Result<ExportSummary, String>,
    },
    Reset {
        generation: u64,
    },
}

/// Capabilities the export pipeline runs against.
///
/// Without a connector the orchestrator still serves cache commands, and
/// exports fail as if no Gemini page were open.
pub struct ExportContext {
    pub cache: Arc<dyn ContentCache>,
    pub connector: Option<Arc<dyn SurfaceConnector>>,
    pub sink: Arc<dyn ArchiveSink>,
    pub timing: TimingConfig,
}

/// Client side of the orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct ExportHandle {
    tx: mpsc::Sender<Event>,
    progress_tx: broadcast::Sender<ExportProgress>,
}

impl ExportHandle {
    /// Ask for an export. The outcome arrives through progress updates.
    ///
    /// # Errors
    /// Returns error if the orchestrator has stopped.
    pub async fn start_export(&self, options: ExportOptions) -> Result<StartAck> {
        self.request(|reply| Command::StartExport { options, reply }).await
    }

    /// Current progress snapshot.
    ///
    /// # Errors
    /// Returns error if the orchestrator has stopped.
    pub async fn progress(&self) -> Result<ExportProgress> {
        self.request(|reply| Command::GetProgress { reply }).await
    }

    /// # Errors
    /// Returns error if the orchestrator has stopped.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.request(|reply| Command::GetCacheStats { reply }).await
    }

    /// # Errors
    /// Returns error if the orchestrator has stopped.
    pub async fn clear_cache(&self) -> Result<ClearAck> {
        self.request(|reply| Command::ClearCache { reply }).await
    }

    /// Where the last successful export was saved, if any.
    ///
    /// # Errors
    /// Returns error if the orchestrator has stopped.
    pub async fn last_archive(&self) -> Result<Option<String>> {
        self.request(|reply| Command::LastArchive { reply }).await
    }

    /// Report progress without waiting for a reply.
    pub async fn progress_update(&self, progress: ExportProgress) {
        self.notify(Command::ProgressUpdate { progress }).await;
    }

    /// Receive every progress change from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExportProgress> {
        self.progress_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Command(make(reply)))
            .await
            .map_err(|_| AppError::dispatch("Export service is not running"))?;
        response
            .await
            .map_err(|_| AppError::dispatch("Export service dropped the request"))
    }

    async fn notify(&self, command: Command) {
        if self.tx.send(Event::Command(command)).await.is_err() {
            tracing::debug!("Export service stopped; notification dropped");
        }
    }
}

#[async_trait]
impl AgentEvents for ExportHandle {
    async fn progress(&self, progress: ExportProgress) {
        self.progress_update(progress).await;
    }

    async fn cache_chat(&self, record: ConversationRecord) {
        self.notify(Command::CacheChat {
            record: Box::new(record),
            reply: None,
        })
        .await;
    }
}

/// The actor owning the export session.
pub struct ExportOrchestrator {
    session: ExportSession,
    ctx: Arc<ExportContext>,
    progress_tx: broadcast::Sender<ExportProgress>,
    events: mpsc::WeakSender<Event>,
}

impl ExportOrchestrator {
    /// Start the orchestrator on the current runtime.
    ///
    /// It runs until every [`ExportHandle`] is dropped and no export or
    /// reset timer is pending.
    #[must_use]
    pub fn spawn(ctx: ExportContext) -> ExportHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (progress_tx, _) = broadcast::channel(PROGRESS_BUFFER);

        let actor = Self {
            session: ExportSession::default(),
            ctx: Arc::new(ctx),
            progress_tx: progress_tx.clone(),
            events: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        ExportHandle { tx, progress_tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        tracing::debug!("Export service started");
        while let Some(event) = rx.recv().await {
            match event {
                Event::Command(command) => self.handle(command),
                Event::Finished { generation, result } => self.on_finished(generation, result),
                Event::Reset { generation } => self.on_reset(generation),
            }
        }
        tracing::debug!("Export service stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::StartExport { options, reply } => {
                self.start_export(options);
                let _ = reply.send(StartAck { started: true });
            }
            Command::GetProgress { reply } => {
                let _ = reply.send(self.session.progress().clone());
            }
            Command::GetCacheStats { reply } => {
                let count = self.ctx.cache.count().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Failed to count cached chats");
                    0
                });
                let _ = reply.send(CacheStats { count });
            }
            Command::ClearCache { reply } => {
                let cleared = match self.ctx.cache.clear() {
                    Ok(()) => {
                        tracing::info!("Cache cleared");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to clear cache");
                        false
                    }
                };
                let _ = reply.send(ClearAck { cleared });
            }
            Command::CacheChat { record, reply } => {
                let cached = match self.ctx.cache.put(&record) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(id = %record.id, error = %e, "Failed to cache chat");
                        false
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(CacheAck { cached });
                }
            }
            Command::ProgressUpdate { progress } => {
                if self.session.update(progress) {
                    self.publish();
                } else {
                    tracing::debug!("Ignoring progress update outside of a running export");
                }
            }
            Command::LastArchive { reply } => {
                let _ = reply.send(self.session.last_archive().map(ToString::to_string));
            }
        }
    }

    fn start_export(&mut self, options: ExportOptions) {
        let Some(tx) = self.events.upgrade() else {
            return;
        };
        if !self.session.begin("Getting cached data...") {
            tracing::debug!("Export already running; start request ignored");
            return;
        }

        tracing::info!(
            format = %options.format,
            force_refresh = options.force_refresh,
            auto_scroll = options.auto_scroll,
            "Export started"
        );
        self.publish();

        let generation = self.session.generation();
        let handle = ExportHandle {
            tx: tx.clone(),
            progress_tx: self.progress_tx.clone(),
        };
        let pipeline = tokio::spawn(run_export(Arc::clone(&self.ctx), options, handle));

        tokio::spawn(async move {
            let result = match pipeline.await {
                Ok(Ok(summary)) => Ok(summary),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("Export task failed: {e}")),
            };
            let _ = tx.send(Event::Finished { generation, result }).await;
        });
    }

    fn on_finished(&mut self, generation: u64, result: std::result::Result<ExportSummary, String>) {
        if generation != self.session.generation() || !self.session.is_running() {
            tracing::debug!(generation, "Ignoring result of a stale export");
            return;
        }

        match result {
            Ok(summary) => {
                tracing::info!(
                    total = summary.total,
                    fetched = summary.fetched,
                    from_cache = summary.from_cache,
                    saved_to = %summary.saved_to,
                    "Export complete"
                );
                self.session.complete(&summary);
            }
            Err(message) => {
                tracing::error!(error = %message, "Export failed");
                self.session.fail(&message);
            }
        }
        self.publish();

        let Some(tx) = self.events.upgrade() else {
            return;
        };
        let delay = self.ctx.timing.reset_after();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Reset { generation }).await;
        });
    }

    fn on_reset(&mut self, generation: u64) {
        if self.session.reset(generation) {
            tracing::debug!(generation, "Progress reset");
        }
    }

    fn publish(&self) {
        // No subscribers is fine.
        let _ = self.progress_tx.send(self.session.progress().clone());
    }
}

/// The export pipeline, from cache read to saved archive.
async fn run_export(
    ctx: Arc<ExportContext>,
    options: ExportOptions,
    events: ExportHandle,
) -> Result<ExportSummary> {
    let cached = ctx.cache.get_all();
    let known_ids: HashSet<String> = if options.force_refresh {
        HashSet::new()
    } else {
        cached.iter().map(|r| r.id.clone()).collect()
    };
    let mut cached_by_id: HashMap<String, ConversationRecord> =
        cached.into_iter().map(|r| (r.id.clone(), r)).collect();
    tracing::debug!(cached = cached_by_id.len(), known = known_ids.len(), "Loaded cache");

    let connector = ctx
        .connector
        .as_ref()
        .ok_or_else(|| AppError::dispatch("Open Gemini first"))?;
    let surface = connector.connect().await.map_err(|e| match e {
        AppError::Dispatch { .. } => e,
        other => AppError::dispatch(other.to_string()),
    })?;
    tokio::time::sleep(ctx.timing.agent_init()).await;

    let agent = ScrapeAgent::new(surface, Arc::new(events.clone()), ctx.timing.clone());
    let outcome = agent
        .collect(&CollectOptions {
            force_refresh: options.force_refresh,
            known_ids,
            auto_scroll: options.auto_scroll,
            scroll_limit: options.scroll_limit,
        })
        .await?;

    for record in &outcome.fetched {
        if let Err(e) = ctx.cache.put(record) {
            tracing::warn!(id = %record.id, error = %e, "Failed to cache chat");
        }
    }

    let fetched = outcome.fetched.len();
    let records = merge_export_set(outcome, &mut cached_by_id);

    events
        .progress_update(ExportProgress::new(fetched, fetched, "Creating ZIP..."))
        .await;

    let now = Utc::now();
    let documents = render_documents(&records, options.format, now)?;
    let bytes = build_zip(&documents)?;
    let saved_to = ctx.sink.save(&archive_file_name(now), bytes).await?;

    Ok(ExportSummary {
        total: records.len(),
        fetched,
        from_cache: records.len() - fetched,
        saved_to,
    })
}

/// Records that go into the archive: everything fetched, then cached
/// records for ids that are still listed but were not fetched.
fn merge_export_set(
    outcome: CollectOutcome,
    cached: &mut HashMap<String, ConversationRecord>,
) -> Vec<ConversationRecord> {
    let fetched_ids: HashSet<String> = outcome.fetched.iter().map(|r| r.id.clone()).collect();
    let mut records = outcome.fetched;

    for id in &outcome.all_ids {
        if fetched_ids.contains(id) {
            continue;
        }
        if let Some(record) = cached.remove(id) {
            records.push(record);
        }
    }

    records
}
