// src/crawl/mod.rs
// =============================================================================
// This module holds the crawl engine and the result sink that watches it.
//
// Submodules:
// - engine:   Crawler, the recursive concurrent traversal
// - result:   CrawlResult, one per visited URL
// - watchdog: Watchdog, drains results and cancels a stalled crawl
//
// The two halves only share the result channel and the cancellation token.
// =============================================================================

mod engine;
mod result;
mod watchdog;

pub use engine::Crawler;
pub use result::CrawlResult;
pub use watchdog::{CrawlOutcome, CrawlSummary, Watchdog};
