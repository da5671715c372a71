// src/fetch/http.rs
// =============================================================================
// This module downloads pages over HTTP.
//
// Key functionality:
// - Makes HTTP GET requests with a shared, pooled reqwest client
// - Applies the caller's deadline as the per-request timeout
// - Treats any non-2xx status as a failure
// - Sorts reqwest errors into timeout / connect / other
// - Hands the body to HtmlPage for parsing
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;
use tracing::debug;

use super::{Fetcher, HtmlPage, Page};
use crate::error::FetchError;

// Fetches pages with reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    // Builds the client once, it is reused for every request
    //
    // `request_timeout` is an upper bound for any single request, on top of
    // the per-fetch deadline.
    pub fn new(request_timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Box<dyn Page>, FetchError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(FetchError::Timeout(url.to_string()));
        }

        debug!("GET {} (deadline in {:?})", url, remaining);

        let response = self
            .client
            .get(url)
            .timeout(remaining)
            .send()
            .await
            .map_err(|e| categorize_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| categorize_error(url, e))?;

        Ok(Box::new(HtmlPage::parse(&body, url)))
    }
}

// Maps a reqwest error onto our FetchError
fn categorize_error(url: &str, error: reqwest::Error) -> FetchError {
    let url = url.to_string();

    if error.is_timeout() {
        FetchError::Timeout(url)
    } else if error.is_connect() {
        FetchError::Connect {
            url,
            reason: error.to_string(),
        }
    } else {
        FetchError::Transport {
            url,
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(10), "site-crawler-test").unwrap()
    }

    fn in_secs(secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn test_fetch_parses_title_and_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Home</title></head>
                   <body><a href="/a">A</a><a href="b">B</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let url = format!("{}/", server.uri());
        let page = fetcher().fetch(&url, in_secs(5)).await.unwrap();

        assert_eq!(page.title().await, Some("Home".to_string()));
        assert_eq!(
            page.links(),
            vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())]
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        let err = fetcher().fetch(&url, in_secs(5)).await.err().unwrap();

        assert_eq!(err, FetchError::Status { url, status: 404 });
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Slow</title>")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let url = format!("{}/", server.uri());
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = fetcher().fetch(&url, deadline).await.err().unwrap();

        assert_eq!(err, FetchError::Timeout(url));
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let url = format!("{}/", server.uri());
        let err = fetcher().fetch(&url, Instant::now()).await.err().unwrap();

        assert_eq!(err, FetchError::Timeout(url));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 9 (discard) is closed on test machines
        let url = "http://127.0.0.1:9/";
        let err = fetcher().fetch(url, in_secs(5)).await.err().unwrap();

        assert!(matches!(err, FetchError::Connect { .. }), "got {:?}", err);
    }
}
