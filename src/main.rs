//! Gemini Export - Save Gemini chat conversations into a ZIP archive.
//!
//! Conversations are discovered on the page, fetched one at a time, and
//! cached in a local `SQLite` database so later exports only fetch what is
//! new. Each export writes JSON and/or Markdown documents into one archive.
//!
//! QUICK START:
//!   gemini-export export --snapshot page.json          # Export everything
//!   gemini-export export --snapshot page.json --format both --auto-scroll
//!   gemini-export cached                               # See what is cached
//!   gemini-export prefs --format md                    # Change the default format

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_preferences, format_progress, format_records_json, format_records_table, format_stats,
    ExportContext, ExportHandle, ExportOrchestrator, OutputFormat,
};
use cli::{Cli, Commands};
use domain::{AppConfig, AppError, ContentCache, ExportFormat, ExportOptions, SurfaceConnector};
use infrastructure::{
    config_file_path, ensure_config_exists, load_config, save_config, DirectorySink,
    SnapshotConnector, SqliteCache,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;
    let config = load_config()?;

    match cli.command {
        Commands::Export {
            snapshot,
            export_format,
            force_refresh,
            auto_scroll,
            scroll_limit,
        } => {
            let mut options = config.export.to_options();
            if let Some(f) = export_format {
                options.format = f;
            }
            options.force_refresh |= force_refresh;
            options.auto_scroll |= auto_scroll;
            if let Some(limit) = scroll_limit.filter(|l| *l > 0) {
                options.scroll_limit = limit;
            }
            cmd_export(&config, snapshot, options).await?;
        }
        Commands::Stats => {
            cmd_stats(&config).await?;
        }
        Commands::Cached { limit } => {
            cmd_cached(&config, limit, format)?;
        }
        Commands::ClearCache { yes } => {
            cmd_clear_cache(&config, yes).await?;
        }
        Commands::Prefs {
            export_format,
            auto_scroll,
            scroll_limit,
        } => {
            cmd_prefs(config, export_format, auto_scroll, scroll_limit)?;
        }
        Commands::Paths => {
            cmd_paths(&config);
        }
    }

    Ok(())
}

/// Start the export service over the local cache.
fn spawn_service(
    config: &AppConfig,
    cache: Arc<SqliteCache>,
    connector: Option<Arc<dyn SurfaceConnector>>,
) -> ExportHandle {
    ExportOrchestrator::spawn(ExportContext {
        cache,
        connector,
        sink: Arc::new(DirectorySink::new(config.exports_dir())),
        timing: config.timing.clone(),
    })
}

/// Run one export and follow its progress until it ends.
async fn cmd_export(
    config: &AppConfig,
    snapshot: PathBuf,
    options: ExportOptions,
) -> domain::Result<()> {
    let cache = Arc::new(SqliteCache::open(&config.cache_db_path())?);
    let handle = spawn_service(config, cache, Some(Arc::new(SnapshotConnector::new(snapshot))));

    let mut updates = handle.subscribe();
    handle.start_export(options).await?;

    let last = loop {
        match updates.recv().await {
            Ok(progress) if progress.is_terminal() => break progress,
            Ok(progress) => println!("{}", format_progress(&progress)),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress display fell behind");
                let progress = handle.progress().await?;
                if progress.is_terminal() {
                    break progress;
                }
                println!("{}", format_progress(&progress));
            }
            Err(RecvError::Closed) => {
                return Err(AppError::dispatch("Export service stopped unexpectedly"));
            }
        }
    };

    if last.is_error() {
        let message = last
            .status
            .strip_prefix("Error: ")
            .unwrap_or(&last.status)
            .to_string();
        return Err(AppError::Export { message });
    }

    println!("{} {}", "✓".green().bold(), last.status);
    if let Some(path) = handle.last_archive().await? {
        println!("  Saved to {}", path.cyan());
    }

    Ok(())
}

/// Show cache statistics command.
async fn cmd_stats(config: &AppConfig) -> domain::Result<()> {
    let cache = Arc::new(SqliteCache::open(&config.cache_db_path())?);
    let handle = spawn_service(config, Arc::clone(&cache), None);

    let stats = handle.cache_stats().await?;
    let records = cache.get_all();

    println!("{}", format_stats(&stats, &records));
    Ok(())
}

/// List cached conversations, most recently exported first.
fn cmd_cached(config: &AppConfig, limit: usize, format: OutputFormat) -> domain::Result<()> {
    let cache = SqliteCache::open(&config.cache_db_path())?;
    let mut records = cache.load_all()?;
    records.sort_by(|a, b| b.exported_at.cmp(&a.exported_at));
    if limit > 0 {
        records.truncate(limit);
    }

    let output = match format {
        OutputFormat::Table => format_records_table(&records),
        OutputFormat::Json => format_records_json(&records).map_err(AppError::json_parse)?,
    };

    println!("{output}");
    Ok(())
}

/// Clear cache command.
async fn cmd_clear_cache(config: &AppConfig, yes: bool) -> domain::Result<()> {
    let cache = Arc::new(SqliteCache::open(&config.cache_db_path())?);
    let handle = spawn_service(config, cache, None);
    let count = handle.cache_stats().await?.count;

    if count == 0 {
        println!("Cache is already empty.");
        return Ok(());
    }

    if !yes && !confirm(&format!("Remove {count} cached chats?"))? {
        println!("Aborted.");
        return Ok(());
    }

    if !handle.clear_cache().await?.cleared {
        return Err(AppError::Database {
            message: "Failed to clear cache".into(),
            source: None,
        });
    }
    println!("{} Removed {} cached chats", "✓".green().bold(), count);
    Ok(())
}

/// Show or update preferences command.
fn cmd_prefs(
    mut config: AppConfig,
    export_format: Option<ExportFormat>,
    auto_scroll: Option<bool>,
    scroll_limit: Option<usize>,
) -> domain::Result<()> {
    let changed = export_format.is_some() || auto_scroll.is_some() || scroll_limit.is_some();

    if let Some(f) = export_format {
        config.export.format = f;
    }
    if let Some(a) = auto_scroll {
        config.export.auto_scroll = a;
    }
    if let Some(limit) = scroll_limit {
        config.export.scroll_limit = limit;
    }

    if changed {
        save_config(&config)?;
        println!("{} Preferences saved", "✓".green().bold());
        println!();
    } else {
        ensure_config_exists()?;
    }

    println!("{}", format_preferences(&config));
    Ok(())
}

/// Show storage paths command.
fn cmd_paths(config: &AppConfig) {
    println!("{}", "📂 Gemini Export Paths".bold());
    println!();
    println!("  Data:    {}", config.data_dir().display());
    println!("  Config:  {}", config_file_path().display());
    println!("  Cache:   {}", config.cache_db_path().display());
    println!("  Exports: {}", config.exports_dir().display());
}

/// Ask a yes/no question on stdin. Defaults to no.
fn confirm(question: &str) -> domain::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::io("Failed to write prompt", e))?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| AppError::io("Failed to read answer", e))?;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
