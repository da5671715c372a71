// src/config/loader.rs
// =============================================================================
// This module reads a Config from disk.
//
// The file format is picked from the extension:
// - .json        -> serde_json
// - .yaml / .yml -> serde_yaml
// - .env         -> dotenvy, KEY=value lines:
//                     EXTERNAL_URL=https://example.com/
//                     CRAWLER_MAX_DEPTH=3
//
// Command-line values are applied on top of whatever the file said, then the
// result is validated. Any problem here is fatal: nothing has been crawled yet.
// =============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use super::{Config, CrawlSettings};
use crate::error::ConfigError;

// Values given on the command line, they win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub start_url: Option<String>,
    pub max_depth: Option<usize>,
}

// Loads, overrides and validates the configuration
//
// Without a file, the defaults are used and the start URL must come from
// the overrides.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => Config::default(),
    };

    if let Some(url) = &overrides.start_url {
        config.start_url = url.clone();
    }
    if let Some(depth) = overrides.max_depth {
        config.crawl.max_depth = depth;
    }

    config.validate()?;
    debug!("configuration loaded: {:?}", config);

    Ok(config)
}

// Reads a config file without validating it
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => Ok(serde_json::from_str(&read(path)?)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&read(path)?)?),
        "env" => load_env_file(path),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

// .env files only know flat keys, see the module header
//
// The file is parsed without touching the process environment. EXTERNAL_URL
// falls back to the process environment when the file does not set it.
fn load_env_file(path: &Path) -> Result<Config, ConfigError> {
    let vars = dotenvy::from_path_iter(path)?.collect::<Result<HashMap<String, String>, _>>()?;

    let start_url = vars
        .get("EXTERNAL_URL")
        .cloned()
        .or_else(|| std::env::var("EXTERNAL_URL").ok())
        .unwrap_or_default();

    let mut crawl = CrawlSettings::default();
    if let Some(depth) = parse_var(&vars, "CRAWLER_MAX_DEPTH")? {
        crawl.max_depth = depth;
    }
    if let Some(increment) = parse_var(&vars, "CRAWLER_DEPTH_INCREMENT")? {
        crawl.depth_increment = increment;
    }
    if let Some(concurrency) = parse_var(&vars, "CRAWLER_MAX_CONCURRENCY")? {
        crawl.max_concurrency = concurrency;
    }
    if let Some(stall) = parse_var(&vars, "CRAWLER_STALL_TIMEOUT_MS")? {
        crawl.stall_timeout_ms = stall;
    }
    if let Some(errors) = parse_var(&vars, "CRAWLER_MAX_ERRORS")? {
        crawl.max_errors = Some(errors);
    }

    Ok(Config { start_url, crawl })
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match vars.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting {
                key,
                value: raw.clone(),
            }),
    }
}
