// src/fetch/html.rs
// =============================================================================
// This module turns downloaded HTML into a Page.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Is built on html5ever (Mozilla's HTML parser)
//
// scraper's Html type is not Send, so the document is parsed once, up front,
// and only the title and the resolved links are kept. The resulting HtmlPage
// can then travel between tokio tasks freely.
//
// Link resolution rules (relative to the page's own URL):
//   "#top"                    -> dropped (fragment only)
//   "https://other.com/x"     -> kept as written
//   "mailto:a@b.c"            -> dropped (not http/https)
//   "//cdn.example.com/x"     -> "https://cdn.example.com/x"
//   "/docs"                   -> "https://example.com/docs"
//   "about"                   -> "<page url>about" (concatenated verbatim)
//   "http://[broken"          -> dropped (malformed)
// =============================================================================

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use super::Page;

// A parsed HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPage {
    title: Option<String>,
    links: Vec<String>,
}

impl HtmlPage {
    // Parses `html` fetched from `page_url`
    pub fn parse(html: &str, page_url: &str) -> Self {
        let document = Html::parse_document(html);

        Self {
            title: extract_title(&document),
            links: extract_links(&document, page_url),
        }
    }
}

#[async_trait]
impl Page for HtmlPage {
    async fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn links(&self) -> Vec<String> {
        self.links.clone()
    }
}

// Text of the first <title> element, trimmed; None when missing or blank
fn extract_title(document: &Html) -> Option<String> {
    let Ok(selector) = Selector::parse("title") else {
        return None;
    };

    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

// Every <a href> on the page, resolved to an absolute URL
fn extract_links(document: &Html, page_url: &str) -> Vec<String> {
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    // Parse the page URL once, we need its scheme and host for "/..." links
    let base = match Url::parse(page_url) {
        Ok(url) => url,
        Err(e) => {
            warn!("invalid page URL {}: {}", page_url, e);
            return links;
        }
    };

    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_link(&base, page_url, href) {
                links.push(absolute_url);
            }
        }
    }

    links
}

// Resolves a possibly-relative href found on `page_url`
//
// Returns None for links the crawler should not follow.
fn resolve_link(base: &Url, page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    match Url::parse(href) {
        // Already absolute: keep it as written when it is crawlable
        Ok(url) => is_crawlable(&url).then(|| href.to_string()),

        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if href.starts_with("//") {
                // Protocol-relative, borrow the page's scheme
                base.join(href)
                    .ok()
                    .filter(is_crawlable)
                    .map(|url| url.to_string())
            } else if href.starts_with('/') {
                Some(format!("{}{}", base.origin().ascii_serialization(), href))
            } else {
                Some(format!("{}{}", page_url, href))
            }
        }

        Err(e) => {
            warn!("error parse URL: {} ({})", href, e);
            None
        }
    }
}

// Only http(s) URLs with a host can be fetched
fn is_crawlable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.has_host()
}
