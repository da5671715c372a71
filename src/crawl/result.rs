// src/crawl/result.rs
// =============================================================================
// The unit of output of the crawl engine.
//
// Exactly one CrawlResult is produced for every URL the engine attempts to
// visit, whether the visit worked or not. Results are moved through the
// result channel, so the sink owns them once received.
// =============================================================================

use serde::{Serialize, Serializer};

use crate::error::CrawlError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    /// The URL that was visited
    pub url: String,
    /// Page title, empty when the visit failed
    pub title: String,
    /// Why the visit failed, if it did
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<CrawlError>,
}

impl CrawlResult {
    pub fn success(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            error: None,
        }
    }

    pub fn failure(url: impl Into<String>, error: impl Into<CrawlError>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// Errors go out as their display message
fn serialize_error<S>(error: &Option<CrawlError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
