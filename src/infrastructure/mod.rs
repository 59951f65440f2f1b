//! Infrastructure layer - external adapters (database, filesystem, page).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod archive;
pub mod config;
pub mod content_cache;
pub mod network_observer;
pub mod page_snapshot;

pub use archive::{build_zip, ArchiveEntry, DirectorySink};
pub use config::{config_file_path, ensure_config_exists, load_config, save_config};
pub use content_cache::SqliteCache;
pub use page_snapshot::SnapshotConnector;
