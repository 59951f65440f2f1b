//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::ExportFormat;

/// Gemini Export - Save Gemini conversations into a ZIP archive.
///
/// Conversations fetched once are cached, so later exports only fetch
/// what is new.
#[derive(Parser, Debug)]
#[command(name = "gemini-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format for listings: table or json.
    #[arg(short, long, default_value = "table")]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every conversation on the page into a ZIP archive.
    Export {
        /// Saved snapshot of the Gemini page to export from.
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Document format: json, md, or both (defaults to saved preference).
        #[arg(long = "format", value_name = "FORMAT")]
        export_format: Option<ExportFormat>,

        /// Re-fetch every conversation, ignoring the cache.
        #[arg(long)]
        force_refresh: bool,

        /// Scroll the sidebar to load older conversations.
        #[arg(long)]
        auto_scroll: bool,

        /// Stop scrolling once this many conversations are visible.
        #[arg(long)]
        scroll_limit: Option<usize>,
    },

    /// Show how many conversations are cached.
    Stats,

    /// List cached conversations.
    Cached {
        /// Maximum number of conversations to show (0 = all).
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Remove every cached conversation.
    ClearCache {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or update saved export preferences.
    Prefs {
        /// Default document format: json, md, or both.
        #[arg(long = "format", value_name = "FORMAT")]
        export_format: Option<ExportFormat>,

        /// Scroll the sidebar by default.
        #[arg(long)]
        auto_scroll: Option<bool>,

        /// Default scroll limit.
        #[arg(long)]
        scroll_limit: Option<usize>,
    },

    /// Show data, config, cache and export locations.
    Paths,
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}
