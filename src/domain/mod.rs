//! Domain layer - core types, session state and host capabilities.
//!
//! This layer contains pure domain models and error types
//! without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;
pub mod ports;
pub mod session;

pub use config::{AppConfig, TimingConfig};
pub use error::{AppError, Result};
pub use models::{
    CacheAck, CacheStats, ChatEntry, ClearAck, CollectOptions, CollectOutcome,
    ConversationRecord, ExportFormat, ExportOptions, ExportProgress, ExportSummary, Message, Role,
    StartAck,
};
pub use ports::{ArchiveSink, ContentCache, NetworkObserver, PageSurface, SurfaceConnector};
pub use session::ExportSession;
