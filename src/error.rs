// src/error.rs
// =============================================================================
// Error types shared across the crawler.
//
// Per-URL failures (FetchError, CrawlError) never cross a task boundary as
// a panic or an early return: they are stored on the CrawlResult and handed
// to the result sink like any other outcome.
//
// ConfigError is the only fatal one. It is raised before crawling starts.
// =============================================================================

use thiserror::Error;

// Why fetching a page failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch deadline expired before a page was parsed
    #[error("waiting too long response from {0}")]
    Timeout(String),
    /// The crawl was cancelled while the request was in flight
    #[error("request to {0} cancelled")]
    Cancelled(String),
    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    /// Could not connect (DNS, refused, TLS handshake...)
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    /// Anything else reqwest reports (bad body, invalid URL, ...)
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

// Why a title could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleFailure {
    /// The page has no <title> or it is blank
    Missing,
    /// The title deadline expired (or the crawl was cancelled) first
    TimedOut,
}

// The error attached to a CrawlResult
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Both failure kinds share one message; match on the payload to tell
    /// them apart
    #[error("title unavailable")]
    TitleUnavailable(TitleFailure),
}

// Problems with the configuration, fatal to the process
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid format of configuration file: {0}")]
    UnsupportedFormat(String),
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot parse environment file: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error("a start URL is required (use --external-url or a config file)")]
    MissingStartUrl,
    #[error("a valid absolute URL is required, got '{0}'")]
    InvalidStartUrl(String),
}
