//! Application layer - use cases and orchestration.
//!
//! This layer contains the export pipeline: the scrape agent, the
//! orchestrator that owns the export session, and document rendering.

pub mod agent;
pub mod documents;
pub mod formatter;
pub mod orchestrator;

#[cfg(test)]
mod test_support;

pub use formatter::{
    format_preferences, format_progress, format_records_json, format_records_table, format_stats,
    OutputFormat,
};
pub use orchestrator::{ExportContext, ExportHandle, ExportOrchestrator};
