//! Terminal output for cached conversations and export progress.
//!
//! Supports a table view and JSON for cached records.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{AppConfig, CacheStats, ConversationRecord, ExportProgress};

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Compact table listing.
    #[default]
    Table,
    /// JSON for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Formats a table listing of cached conversations.
pub fn format_records_table(records: &[ConversationRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Created", "Exported", "Msgs", "Title"]);

    for record in records {
        let created = record.created_at.map_or_else(
            || "-".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
        );

        table.add_row(vec![
            truncate(&record.id, 12),
            created,
            record.exported_at.format("%Y-%m-%d %H:%M").to_string(),
            record.message_count().to_string(),
            truncate(&record.title, 40),
        ]);
    }

    table.to_string()
}

/// Formats cached records as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_records_json(records: &[ConversationRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

/// One progress line, e.g. `[ 4/10]  40% Fetching 4/10: Trip...`.
pub fn format_progress(progress: &ExportProgress) -> String {
    let status = if progress.is_error() {
        progress.status.red().bold().to_string()
    } else if progress.is_done() {
        progress.status.green().bold().to_string()
    } else {
        progress.status.clone()
    };

    match progress.fraction() {
        Some(fraction) => format!(
            "[{:>width$}/{}] {:>3.0}% {status}",
            progress.current,
            progress.total,
            fraction * 100.0,
            width = progress.total.to_string().len()
        ),
        None => format!("{} {status}", "…".dimmed()),
    }
}

/// Formats cache statistics for display.
pub fn format_stats(stats: &CacheStats, records: &[ConversationRecord]) -> String {
    let messages: usize = records.iter().map(ConversationRecord::message_count).sum();
    let dated = records.iter().filter(|r| r.created_at.is_some()).count();

    format!(
        "{}\n  Cached chats: {}\n  Total messages: {}\n  With creation time: {}",
        "📊 Statistics".bold(),
        stats.count.to_string().cyan(),
        messages.to_string().cyan(),
        dated.to_string().yellow()
    )
}

/// Formats the persisted export preferences.
pub fn format_preferences(config: &AppConfig) -> String {
    let export = &config.export;
    format!(
        "{}\n  Format: {}\n  Force refresh: {}\n  Auto scroll: {}\n  Scroll limit: {}",
        "⚙️  Preferences".bold(),
        export.format.to_string().cyan(),
        export.force_refresh,
        export.auto_scroll,
        export.scroll_limit.to_string().cyan()
    )
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(title: &str) -> ConversationRecord {
        ConversationRecord {
            id: "abcdef0123456789".into(),
            title: title.into(),
            url: "https://gemini.google.com/app/abcdef0123456789".into(),
            created_at: None,
            exported_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            messages: Vec::new(),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_table_lists_titles() {
        let table = format_records_table(&[record("Trip to Lisbon")]);
        assert!(table.contains("Trip to Lisbon"));
        assert!(table.contains("abcdef012..."));
    }

    #[test]
    fn test_progress_line() {
        colored::control::set_override(false);
        assert_eq!(
            format_progress(&ExportProgress::new(2, 4, "Fetching 2/4: Trip...")),
            "[2/4]  50% Fetching 2/4: Trip..."
        );
        assert!(format_progress(&ExportProgress::status("Finding chats..."))
            .ends_with("Finding chats..."));
    }
}
