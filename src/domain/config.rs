//! Configuration types: persisted export preferences and timing.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::models::{ExportFormat, ExportOptions, DEFAULT_SCROLL_LIMIT};

/// Persisted export preferences (the settings panel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format: json, md, or both.
    #[serde(default)]
    pub format: ExportFormat,

    /// Re-fetch everything instead of reusing the cache.
    #[serde(default)]
    pub force_refresh: bool,

    /// Scroll the sidebar to reveal older conversations.
    #[serde(default)]
    pub auto_scroll: bool,

    /// Stop scrolling once this many conversations are visible.
    #[serde(default = "default_scroll_limit")]
    pub scroll_limit: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            force_refresh: false,
            auto_scroll: false,
            scroll_limit: default_scroll_limit(),
        }
    }
}

impl ExportConfig {
    /// Export options built from the saved preferences.
    #[must_use]
    pub fn to_options(&self) -> ExportOptions {
        ExportOptions {
            format: self.format,
            force_refresh: self.force_refresh,
            auto_scroll: self.auto_scroll,
            scroll_limit: if self.scroll_limit == 0 {
                DEFAULT_SCROLL_LIMIT
            } else {
                self.scroll_limit
            },
        }
    }
}

const fn default_scroll_limit() -> usize {
    DEFAULT_SCROLL_LIMIT
}

/// Delays used while driving the page and the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after opening a conversation for its content to render.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Pause between two conversations.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Wait after each sidebar scroll.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,

    /// Wait after establishing the scrape agent.
    #[serde(default = "default_agent_init_ms")]
    pub agent_init_ms: u64,

    /// How long a terminal status stays visible.
    #[serde(default = "default_reset_secs")]
    pub reset_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            item_delay_ms: default_item_delay_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            agent_init_ms: default_agent_init_ms(),
            reset_secs: default_reset_secs(),
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub const fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    #[must_use]
    pub const fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    #[must_use]
    pub const fn agent_init(&self) -> Duration {
        Duration::from_millis(self.agent_init_ms)
    }

    #[must_use]
    pub const fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_secs)
    }
}

const fn default_settle_ms() -> u64 {
    2000
}

const fn default_item_delay_ms() -> u64 {
    400
}

const fn default_scroll_settle_ms() -> u64 {
    1000
}

const fn default_agent_init_ms() -> u64 {
    500
}

const fn default_reset_secs() -> u64 {
    5
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Export preferences.
    #[serde(default)]
    pub export: ExportConfig,

    /// Page and session delays.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gemini-export")
    }

    /// Get the content cache database path.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir().join("cache.db")
    }

    /// Get the exports directory path.
    #[must_use]
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir().join("exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.scroll_limit, 100);
        assert_eq!(config.timing.settle_ms, 2000);
        assert_eq!(config.timing.reset_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_scroll_limit_falls_back() {
        let config = ExportConfig {
            scroll_limit: 0,
            ..ExportConfig::default()
        };
        assert_eq!(config.to_options().scroll_limit, DEFAULT_SCROLL_LIMIT);
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = AppConfig {
            paths: PathConfig {
                data_dir: Some(PathBuf::from("/tmp/ge")),
            },
            ..AppConfig::default()
        };
        assert_eq!(config.cache_db_path(), PathBuf::from("/tmp/ge/cache.db"));
        assert_eq!(config.exports_dir(), PathBuf::from("/tmp/ge/exports"));
    }
}
