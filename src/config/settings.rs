// src/config/settings.rs
// =============================================================================
// The configuration types and their defaults.
//
// Config files use camelCase keys:
//
//   startUrl: https://example.com/
//   crawl:
//     maxDepth: 3
//     stallTimeoutMs: 10000
//
// Every key under `crawl` is optional and falls back to the defaults below.
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Absolute URL the crawl starts from
    #[serde(default)]
    pub start_url: String,

    #[serde(default)]
    pub crawl: CrawlSettings,
}

// Knobs for the engine, the fetcher and the watchdog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSettings {
    /// Links deeper than this are not followed (the seed is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// How much SIGUSR1 raises max_depth
    #[serde(default = "default_depth_increment")]
    pub depth_increment: usize,

    #[serde(default = "default_title_timeout_ms")]
    pub title_timeout_ms: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Hard cap for any single HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of the result channel
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,

    /// How often the watchdog checks for a stall
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Maximum number of pages being fetched at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Cancel the crawl after this many failed URLs (never, when unset)
    #[serde(default)]
    pub max_errors: Option<usize>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            depth_increment: default_depth_increment(),
            title_timeout_ms: default_title_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            result_buffer: default_result_buffer(),
            tick_ms: default_tick_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            max_errors: None,
            user_agent: default_user_agent(),
        }
    }
}

impl CrawlSettings {
    pub fn title_timeout(&self) -> Duration {
        Duration::from_millis(self.title_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Both sizes become tokio semaphore permits (the result channel is
        // built on one too), which refuse more than MAX_PERMITS
        let permits = [
            ("resultBuffer", self.result_buffer),
            ("maxConcurrency", self.max_concurrency),
        ];
        for (key, value) in permits {
            if !(1..=Semaphore::MAX_PERMITS).contains(&value) {
                return Err(ConfigError::InvalidSetting {
                    key,
                    value: format!("{} (must be between 1 and {})", value, Semaphore::MAX_PERMITS),
                });
            }
        }

        let positive = [
            ("tickMs", self.tick_ms),
            ("stallTimeoutMs", self.stall_timeout_ms),
            ("requestTimeoutSecs", self.request_timeout_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    key,
                    value: value.to_string(),
                });
            }
        }

        // The title is read after the fetch, under a deadline started at the
        // same instant, so it needs less time than the fetch
        if self.fetch_timeout_ms <= self.title_timeout_ms {
            return Err(ConfigError::InvalidSetting {
                key: "fetchTimeoutMs",
                value: format!(
                    "{} (must be greater than titleTimeoutMs {})",
                    self.fetch_timeout_ms, self.title_timeout_ms
                ),
            });
        }

        Ok(())
    }
}

impl Config {
    // Checks the start URL and the crawl settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_url.is_empty() {
            return Err(ConfigError::MissingStartUrl);
        }

        if !is_url(&self.start_url) {
            return Err(ConfigError::InvalidStartUrl(self.start_url.clone()));
        }

        self.crawl.validate()
    }
}

// An absolute URL needs both a scheme and a host
fn is_url(candidate: &str) -> bool {
    Url::parse(candidate).map(|url| url.has_host()).unwrap_or(false)
}

fn default_max_depth() -> usize {
    2
}

fn default_depth_increment() -> usize {
    2
}

fn default_title_timeout_ms() -> u64 {
    2_000
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_result_buffer() -> usize {
    100
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_stall_timeout_ms() -> u64 {
    7_000
}

fn default_max_concurrency() -> usize {
    64
}

fn default_user_agent() -> String {
    format!("site-crawler/{}", env!("CARGO_PKG_VERSION"))
}
