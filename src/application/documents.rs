//! Archive documents for an export.
//!
//! Each conversation becomes a structured (JSON) and/or readable (Markdown)
//! document named after its title. Structured exports also get one
//! aggregate `_all_chats.json`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::{AppError, ConversationRecord, ExportFormat, Result, Role};
use crate::infrastructure::ArchiveEntry;

/// Stem and name of the aggregate document.
const AGGREGATE_STEM: &str = "_all_chats";
pub const AGGREGATE_FILE: &str = "_all_chats.json";

/// Longest file stem produced by `sanitize_filename`, in characters.
const MAX_STEM_CHARS: usize = 80;

/// Characters that are not allowed in file names on common platforms.
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn a title into a safe file stem.
#[must_use]
pub fn sanitize_filename(title: &str) -> String {
    if title.is_empty() {
        return "Untitled".to_string();
    }

    let mut out = String::with_capacity(title.len());
    let mut in_whitespace = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        out.push(if UNSAFE_CHARS.contains(&c) { '_' } else { c });
    }

    out.chars().take(MAX_STEM_CHARS).collect()
}

/// Hands out unique file stems within one export.
///
/// The first use of a stem keeps it bare; later ones get `_2`, `_3`, ...,
/// skipping any suffixed name that is already taken.
#[derive(Debug, Default)]
pub struct UniqueNames {
    issued: HashSet<String>,
    next_suffix: HashMap<String, usize>,
}

impl UniqueNames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a stem as taken without handing it out.
    pub fn reserve(&mut self, stem: &str) {
        self.issued.insert(stem.to_string());
    }

    pub fn claim(&mut self, base: &str) -> String {
        if self.issued.insert(base.to_string()) {
            return base.to_string();
        }

        let mut n = self.next_suffix.get(base).copied().unwrap_or(2);
        let mut candidate = format!("{base}_{n}");
        while self.issued.contains(&candidate) {
            n += 1;
            candidate = format!("{base}_{n}");
        }

        self.next_suffix.insert(base.to_string(), n + 1);
        self.issued.insert(candidate.clone());
        candidate
    }
}

/// Archive file name with a sortable UTC timestamp.
#[must_use]
pub fn archive_file_name(now: DateTime<Utc>) -> String {
    format!("gemini-export-{}.zip", now.format("%Y-%m-%dT%H-%M-%S"))
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats a conversation as Markdown.
#[must_use]
pub fn format_record_markdown(record: &ConversationRecord) -> String {
    let mut out = format!("# {}\n\n", record.title);

    if let Some(created) = record.created_at {
        out.push_str(&format!("> Created: {}\n", iso(created)));
    }
    out.push_str(&format!(
        "> Exported: {}\n> URL: {}\n\n---\n\n",
        iso(record.exported_at),
        record.url
    ));

    for message in &record.messages {
        let heading = match message.role {
            Role::Requester => "## 👤 User",
            Role::Responder => "## 🤖 Gemini",
        };
        out.push_str(&format!("{heading}\n\n{}\n\n---\n\n", message.content));
    }

    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateDocument<'a> {
    exported_at: String,
    total_chats: usize,
    chats: &'a [ConversationRecord],
}

/// Render every document of an export, in archive order.
///
/// # Errors
/// Returns error if a record cannot be serialized.
pub fn render_documents(
    records: &[ConversationRecord],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<Vec<ArchiveEntry>> {
    let mut names = UniqueNames::new();
    if format.structured() {
        names.reserve(AGGREGATE_STEM);
    }
    let mut entries = Vec::new();

    for record in records {
        let stem = names.claim(&sanitize_filename(&record.title));

        if format.structured() {
            let json = serde_json::to_string_pretty(record).map_err(AppError::json_parse)?;
            entries.push(ArchiveEntry::new(format!("{stem}.json"), json));
        }
        if format.readable() {
            entries.push(ArchiveEntry::new(
                format!("{stem}.md"),
                format_record_markdown(record),
            ));
        }
    }

    if format.structured() {
        let aggregate = AggregateDocument {
            exported_at: iso(exported_at),
            total_chats: records.len(),
            chats: records,
        };
        let json = serde_json::to_string_pretty(&aggregate).map_err(AppError::json_parse)?;
        entries.push(ArchiveEntry::new(AGGREGATE_FILE, json));
    }

    Ok(entries)
}
