//! Watcher configuration — `{data_dir}/config.json`.
//!
//! Every section defaults independently, so a partial file is valid.
//! Missing or invalid files fall back to defaults with a warning; optional
//! credentials that are absent disable their adapter, never startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{WatchError, WatchResult};
use crate::storage::path_utils;

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Channel status endpoint; `/{username}` is appended.
    pub api_base: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_base: constants::STREAM_API_BASE.to_string(),
            timeout_secs: constants::STREAM_TIMEOUT_SECS,
            user_agent: constants::STREAM_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub timeout_secs: u64,
    /// Concurrent feed fetches per cycle.
    pub max_parallel: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: constants::FEED_TIMEOUT_SECS,
            max_parallel: constants::FEED_MAX_PARALLEL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub api_base: String,
    /// App-only bearer token. Absent: timeline subscriptions are not polled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
    pub max_parallel: usize,
    pub max_results: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            api_base: constants::TIMELINE_API_BASE.to_string(),
            bearer_token: None,
            timeout_secs: constants::TIMELINE_TIMEOUT_SECS,
            max_parallel: constants::TIMELINE_MAX_PARALLEL,
            max_results: constants::TIMELINE_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierMode {
    /// Write notifications to the log only.
    #[default]
    Log,
    /// POST to the subscription's destination, which must be a webhook URL.
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub mode: NotifierMode,
    /// Prefix for go-live messages, e.g. "@everyone".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            mode: NotifierMode::default(),
            mention: None,
            timeout_secs: constants::NOTIFY_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// ROOT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Store location. Default: `{data_dir}/subscriptions.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    pub stream: StreamConfig,
    pub feed: FeedConfig,
    pub timeline: TimelineConfig,
    pub notifier: NotifierConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: constants::POLL_INTERVAL_SECS,
            store_path: None,
            stream: StreamConfig::default(),
            feed: FeedConfig::default(),
            timeline: TimelineConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Load from `{data_dir}/config.json`, then apply env overrides.
    pub fn load() -> Self {
        Self::load_from(&path_utils::config_path())
    }

    /// Returns defaults if the file is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid config, using defaults"
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate();
        config
    }

    pub fn save(&self) -> WatchResult<()> {
        self.save_to(&path_utils::config_path())
    }

    pub fn save_to(&self, path: &Path) -> WatchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WatchError::Config(format!("Failed to create config dir: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| WatchError::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(constants::TIMELINE_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.timeline.bearer_token = Some(token.trim().to_string());
            }
        }
    }

    /// Clamp values that would stall or spin the scheduler.
    pub fn validate(&mut self) {
        if self.poll_interval_secs < constants::MIN_POLL_INTERVAL_SECS {
            tracing::warn!(
                value = self.poll_interval_secs,
                min = constants::MIN_POLL_INTERVAL_SECS,
                "poll_interval_secs too small, clamping"
            );
            self.poll_interval_secs = constants::MIN_POLL_INTERVAL_SECS;
        }
        self.stream.timeout_secs = self.stream.timeout_secs.max(1);
        self.feed.timeout_secs = self.feed.timeout_secs.max(1);
        self.timeline.timeout_secs = self.timeline.timeout_secs.max(1);
        self.notifier.timeout_secs = self.notifier.timeout_secs.max(1);
        self.feed.max_parallel = self.feed.max_parallel.clamp(1, 64);
        self.timeline.max_parallel = self.timeline.max_parallel.clamp(1, 64);
        self.timeline.max_results = self.timeline.max_results.clamp(5, 100);
    }

    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(p) if !p.trim().is_empty() => PathBuf::from(path_utils::expand_tilde(p)),
            _ => path_utils::default_store_path(),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeline_enabled(&self) -> bool {
        self.timeline.bearer_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = WatcherConfig::default();
        assert_eq!(c.poll_interval_secs, 180);
        assert_eq!(c.feed.timeout_secs, 10);
        assert_eq!(c.notifier.mode, NotifierMode::Log);
        assert!(c.timeline.bearer_token.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"poll_interval_secs": 60, "feed": {"max_parallel": 2}}"#).unwrap();
        let c = WatcherConfig::load_from(&path);
        assert_eq!(c.poll_interval_secs, 60);
        assert_eq!(c.feed.max_parallel, 2);
        assert_eq!(c.feed.timeout_secs, 10);
        assert_eq!(c.stream.timeout_secs, 5);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "poll_interval_secs = 60").unwrap();
        assert_eq!(WatcherConfig::load_from(&path).poll_interval_secs, 180);
    }

    #[test]
    fn test_validate_clamps() {
        let mut c = WatcherConfig::default();
        c.poll_interval_secs = 0;
        c.feed.max_parallel = 0;
        c.timeline.max_results = 500;
        c.validate();
        assert_eq!(c.poll_interval_secs, 5);
        assert_eq!(c.feed.max_parallel, 1);
        assert_eq!(c.timeline.max_results, 100);
    }

    #[test]
    fn test_save_roundtrip_and_store_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut c = WatcherConfig::default();
        c.store_path = Some(dir.path().join("subs.json").to_string_lossy().to_string());
        c.notifier.mode = NotifierMode::Webhook;
        c.save_to(&path).unwrap();

        let loaded = WatcherConfig::load_from(&path);
        assert_eq!(loaded.notifier.mode, NotifierMode::Webhook);
        assert_eq!(loaded.store_path(), dir.path().join("subs.json"));
    }
}
