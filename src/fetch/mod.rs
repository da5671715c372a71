// src/fetch/mod.rs
// =============================================================================
// This module is the crawler's window onto the web.
//
// Submodules:
// - http: Downloads pages with reqwest (the real Fetcher)
// - html: Parses a downloaded page and pulls out its title and links
//
// The crawl engine never talks to reqwest or scraper directly. It only sees
// the two traits below, which keeps it easy to test with an in-memory fake.
// =============================================================================

mod html;
mod http;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::FetchError;

pub use html::HtmlPage;
pub use http::HttpFetcher;

// Something that can turn a URL into a parsed page
//
// Implementations must give up once `deadline` has passed and report
// FetchError::Timeout instead of hanging. The engine also enforces the
// deadline on its side.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Box<dyn Page>, FetchError>;
}

// A page that has been fetched and parsed
#[async_trait]
pub trait Page: Send + Sync {
    /// The page title, or None when it is missing or blank
    ///
    /// Async so slow implementations can be raced against the title deadline.
    async fn title(&self) -> Option<String>;

    /// Absolute URLs of every outbound link (never suspends)
    fn links(&self) -> Vec<String>;
}
