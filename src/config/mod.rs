// src/config/mod.rs
// =============================================================================
// This module produces the crawler's configuration.
//
// Submodules:
// - settings: Config and CrawlSettings, their defaults and validation
// - loader:   Reads JSON / YAML / .env files and applies CLI overrides
//
// A Config that comes out of `load` always has a valid absolute start URL.
// =============================================================================

mod loader;
mod settings;

pub use loader::{load, Overrides};
pub use settings::{Config, CrawlSettings};
