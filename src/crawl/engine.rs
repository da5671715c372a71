// src/crawl/engine.rs
// =============================================================================
// The crawl engine: a recursive, concurrent, depth-limited traversal.
//
// How a single branch (one URL at one depth) runs:
// 1. Bail out if the crawl is cancelled
// 2. Bail out if the URL was already visited
// 3. Bail out if depth >= max depth (the URL is NOT marked visited, so a
//    later depth increase can still reach it)
// 4. Wait for a concurrency permit, then claim the URL in the visited set
// 5. Fetch the page (5s deadline) and read its title (2s deadline)
// 6. Emit exactly one CrawlResult for the URL
// 7. Spawn one new branch per outbound link at depth + 1
//
// Branches are tokio tasks spawned on a TaskTracker, so the engine knows
// when every branch has returned ("natural completion"). Parents never wait
// for their children.
//
// Shared state:
// - visited:   RwLock<HashSet>, shared reads for the fast check, one
//              exclusive insert-if-absent to claim a URL
// - max_depth: AtomicUsize, only ever increased
// - results:   bounded mpsc channel, the only backpressure point
//
// Rust concepts used:
// - Arc<Self>: Every branch task owns a clone of the crawler, so the crawler
//   lives as long as its last branch
// - Atomics: The depth limit is read on every scan and raised from a signal
//   handler, without taking a lock
// - tokio::select!: Races a future against cancellation, whichever finishes
//   first wins and the other one is dropped
// - Trait objects (Arc<dyn Fetcher>): Tests plug in an in-memory site
// =============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::CrawlResult;
use crate::config::CrawlSettings;
use crate::error::{CrawlError, FetchError, TitleFailure};
use crate::fetch::{Fetcher, Page};

// One crawl session
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    visited: RwLock<HashSet<String>>,
    max_depth: AtomicUsize,
    results: mpsc::Sender<CrawlResult>,
    permits: Semaphore,
    tracker: TaskTracker,
    cancel: CancellationToken,
    title_timeout: Duration,
    fetch_timeout: Duration,
}

impl Crawler {
    // Creates a crawler and the receiving end of its result channel
    //
    // The receiver is the only way to observe what the crawler does; hand it
    // to a Watchdog (or drain it yourself).
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        settings: &CrawlSettings,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<CrawlResult>) {
        // Bounded: when the watchdog falls behind, branches wait in `send`
        let (results, rx) = mpsc::channel(settings.result_buffer);

        let crawler = Arc::new(Self {
            fetcher,
            visited: RwLock::new(HashSet::new()),
            max_depth: AtomicUsize::new(settings.max_depth),
            results,
            permits: Semaphore::new(settings.max_concurrency),
            tracker: TaskTracker::new(),
            cancel,
            title_timeout: settings.title_timeout(),
            fetch_timeout: settings.fetch_timeout(),
        });

        (crawler, rx)
    }

    // Starts crawling from the seed URL at depth 0
    //
    // After this, `finished()` resolves once every branch has returned.
    pub fn start(self: &Arc<Self>, seed: impl Into<String>) {
        self.spawn_scan(seed.into(), 0);

        // A closed tracker still accepts new tasks, but `wait()` can now
        // resolve as soon as the task count drops to zero
        self.tracker.close();
    }

    // Resolves when no branch is running anymore (only after `start`)
    pub async fn finished(&self) {
        self.tracker.wait().await;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Acquire)
    }

    // Raises the depth limit by `delta` and returns the new limit
    //
    // URLs already visited are not revisited. URLs that were rejected for
    // being too deep can be reached again if another branch rediscovers them.
    pub fn increase_depth(&self, delta: usize) -> usize {
        // fetch_update retries until no other thread raced us
        // saturating_add keeps a huge increment from wrapping around to 0
        let updated = self
            .max_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                Some(depth.saturating_add(delta))
            });

        // The closure never refuses, both arms hold the previous value
        let previous = match updated {
            Ok(depth) | Err(depth) => depth,
        };
        previous.saturating_add(delta)
    }

    // Raises the shared cancellation token
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub async fn is_visited(&self, url: &str) -> bool {
        self.visited.read().await.contains(url)
    }

    pub async fn visited_count(&self) -> usize {
        self.visited.read().await.len()
    }

    // Crawls `url` at `depth`, then fans out to its links in new tasks
    //
    // Returns once this URL is done; its children keep running on their own.
    pub async fn scan(self: Arc<Self>, url: String, depth: usize) {
        // Step 1: nothing new starts once the crawl is cancelled
        if self.cancel.is_cancelled() {
            return;
        }

        // Step 2: cheap check under a shared read lock
        // The read guard is a temporary, it is dropped at the end of the line
        if self.visited.read().await.contains(&url) {
            return;
        }

        // Step 3: too deep for now, but leave the URL unmarked
        if depth >= self.max_depth() {
            debug!("depth limit reached for {} (depth {})", url, depth);
            return;
        }

        // Step 4: wait for a free slot, unless the crawl is cancelled first
        // acquire() only fails if the semaphore is closed, which we never do
        let permit = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = self.cancel.cancelled() => return,
        };

        // Two branches may have passed the read check for the same URL,
        // only the one that inserts it goes on
        if !self.visited.write().await.insert(url.clone()) {
            debug!("{} already claimed by another branch", url);
            return;
        }

        debug!("scanning {} at depth {}", url, depth);

        // Both deadlines hang off a child of the crawl token, released when
        // this function returns
        let scope = self.cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();
        let started = Instant::now();
        let title_deadline = started + self.title_timeout;
        let fetch_deadline = started + self.fetch_timeout;

        // Step 5a: fetch under the fetch deadline
        // timeout_at turns an overdue fetch into Err(Elapsed)
        let fetched = tokio::select! {
            fetched = timeout_at(fetch_deadline, self.fetcher.fetch(&url, fetch_deadline)) => {
                fetched.unwrap_or_else(|_| Err(FetchError::Timeout(url.clone())))
            }
            _ = scope.cancelled() => Err(FetchError::Cancelled(url.clone())),
        };

        // A failed fetch is still a result, the branch just ends there
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                self.emit(CrawlResult::failure(url, e)).await;
                return;
            }
        };

        // Step 5b: read the title under the (shorter) title deadline
        // An empty title is treated the same as a missing one
        let title = tokio::select! {
            title = timeout_at(title_deadline, page.title()) => match title {
                Ok(Some(title)) if !title.is_empty() => Ok(title),
                Ok(_) => Err(TitleFailure::Missing),
                Err(_) => Err(TitleFailure::TimedOut),
            },
            _ = scope.cancelled() => Err(TitleFailure::TimedOut),
        };

        // Step 6: exactly one result per URL
        // Without a title the page is reported but its links are not followed
        let emitted = match title {
            Ok(title) => self.emit(CrawlResult::success(url.as_str(), title)).await,
            Err(failure) => {
                self.emit(CrawlResult::failure(url, CrawlError::TitleUnavailable(failure)))
                    .await;
                return;
            }
        };

        // Give the slot back before fanning out, the children need permits too
        drop(permit);

        // Nobody is reading results anymore, so there is no point going deeper
        if !emitted {
            return;
        }

        // Step 7: one new branch per link
        // Duplicates and too-deep links are filtered by the child itself
        for link in page.links() {
            self.spawn_scan(link, depth + 1);
        }
    }

    // Spawns a branch on the tracker so `finished()` can wait for it
    fn spawn_scan(self: &Arc<Self>, url: String, depth: usize) {
        // The task needs its own handle to the crawler ('static future)
        let crawler = Arc::clone(self);
        self.tracker.spawn(async move { crawler.scan(url, depth).await });
    }

    // Sends a result, returns false once nobody is listening anymore
    async fn emit(&self, result: CrawlResult) -> bool {
        // send() only fails once the receiver is dropped, and hands the
        // unsent value back inside the error
        match self.results.send(result).await {
            Ok(()) => true,
            Err(e) => {
                debug!("result channel closed, dropping result for {}", e.0.url);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SEED: &str = "https://example.com/";
    const A: &str = "https://example.com/a";
    const B: &str = "https://example.com/b";

    // A page served by FakeFetcher
    #[derive(Clone, Default)]
    struct FakePage {
        title: Option<String>,
        links: Vec<String>,
        title_delay: Option<Duration>,
        fetch_delay: Option<Duration>,
        error: Option<FetchError>,
    }

    impl FakePage {
        fn titled(title: &str, links: &[&str]) -> Self {
            Self {
                title: Some(title.to_string()),
                links: links.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            }
        }

        fn failing(error: FetchError) -> Self {
            Self {
                error: Some(error),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Page for FakePage {
        async fn title(&self) -> Option<String> {
            if let Some(delay) = self.title_delay {
                tokio::time::sleep(delay).await;
            }
            self.title.clone()
        }

        fn links(&self) -> Vec<String> {
            self.links.clone()
        }
    }

    // In-memory site that counts fetches and tracks concurrency
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, FakePage>,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(pages: Vec<(&str, FakePage)>) -> Arc<Self> {
            Arc::new(Self {
                pages: pages.into_iter().map(|(url, page)| (url.to_string(), page)).collect(),
                ..Default::default()
            })
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _deadline: Instant) -> Result<Box<dyn Page>, FetchError> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let page = self.pages.get(url).cloned().unwrap_or_else(|| {
                FakePage::failing(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            });
            if let Some(delay) = page.fetch_delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match page.error.clone() {
                Some(e) => Err(e),
                None => Ok(Box::new(page)),
            }
        }
    }

    fn settings(max_depth: usize) -> CrawlSettings {
        CrawlSettings {
            max_depth,
            ..Default::default()
        }
    }

    fn crawler(
        fetcher: &Arc<FakeFetcher>,
        settings: &CrawlSettings,
    ) -> (Arc<Crawler>, mpsc::Receiver<CrawlResult>) {
        let fetcher: Arc<dyn Fetcher> = fetcher.clone();
        Crawler::new(fetcher, settings, CancellationToken::new())
    }

    fn drain(rx: &mut mpsc::Receiver<CrawlResult>) -> Vec<CrawlResult> {
        let mut results = Vec::new();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn test_depth_one_only_visits_seed() {
        let fetcher = FakeFetcher::new(vec![
            (SEED, FakePage::titled("Home", &[A, B])),
            (A, FakePage::titled("A", &[])),
            (B, FakePage::titled("B", &[])),
        ]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(1));

        crawler.start(SEED);
        crawler.finished().await;

        assert_eq!(drain(&mut rx), vec![CrawlResult::success(SEED, "Home")]);
        assert_eq!(fetcher.calls(A), 0);
        assert_eq!(fetcher.calls(B), 0);
        assert!(!crawler.is_visited(A).await);
    }

    #[tokio::test]
    async fn test_duplicate_links_are_visited_at_most_twice() {
        let fetcher = FakeFetcher::new(vec![
            (SEED, FakePage::titled("Home", &[A, A])),
            (A, FakePage::titled("A", &[])),
        ]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(2));

        crawler.start(SEED);
        crawler.finished().await;

        let results = drain(&mut rx);
        let for_a = results.iter().filter(|r| r.url == A).count();
        assert!((1..=2).contains(&for_a), "got {} results for A", for_a);
        assert!(fetcher.calls(A) <= 2);
    }

    #[tokio::test]
    async fn test_fetch_error_is_reported_and_not_followed() {
        let error = FetchError::Connect {
            url: A.to_string(),
            reason: "refused".to_string(),
        };
        let fetcher = FakeFetcher::new(vec![
            (SEED, FakePage::titled("Home", &[A])),
            (A, FakePage::failing(error.clone())),
        ]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(5));

        crawler.start(SEED);
        crawler.finished().await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 2);
        assert!(results.contains(&CrawlResult::failure(A, error)));
        assert!(crawler.is_visited(A).await);
    }

    #[tokio::test]
    async fn test_visited_url_is_not_fetched_again() {
        let fetcher = FakeFetcher::new(vec![(SEED, FakePage::titled("Home", &[]))]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(3));

        crawler.clone().scan(SEED.to_string(), 0).await;
        crawler.clone().scan(SEED.to_string(), 0).await;
        crawler.clone().scan(SEED.to_string(), 2).await;

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(fetcher.calls(SEED), 1);
    }

    #[tokio::test]
    async fn test_failed_url_is_not_retried() {
        let fetcher = FakeFetcher::new(vec![]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(3));

        crawler.clone().scan(A.to_string(), 0).await;
        crawler.clone().scan(A.to_string(), 1).await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_ok());
        assert_eq!(fetcher.calls(A), 1);
    }

    #[tokio::test]
    async fn test_too_deep_is_not_marked_visited() {
        let fetcher = FakeFetcher::new(vec![(A, FakePage::titled("A", &[]))]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(1));

        crawler.clone().scan(A.to_string(), 1).await;
        crawler.clone().scan(A.to_string(), 5).await;

        assert!(drain(&mut rx).is_empty());
        assert!(!crawler.is_visited(A).await);
        assert_eq!(fetcher.calls(A), 0);
    }

    #[tokio::test]
    async fn test_increase_depth_lets_rejected_url_through() {
        let fetcher = FakeFetcher::new(vec![(A, FakePage::titled("A", &[]))]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(1));

        crawler.clone().scan(A.to_string(), 1).await;
        assert!(drain(&mut rx).is_empty());

        assert_eq!(crawler.increase_depth(2), 3);
        crawler.clone().scan(A.to_string(), 1).await;

        assert_eq!(drain(&mut rx), vec![CrawlResult::success(A, "A")]);
        assert!(crawler.is_visited(A).await);
    }

    #[test]
    fn test_increase_depth_saturates() {
        let fetcher = FakeFetcher::new(vec![]);
        let (crawler, _rx) = crawler(&fetcher, &settings(usize::MAX - 1));

        assert_eq!(crawler.increase_depth(5), usize::MAX);
        assert_eq!(crawler.max_depth(), usize::MAX);
    }

    #[tokio::test]
    async fn test_cancelled_scan_has_no_side_effects() {
        let fetcher = FakeFetcher::new(vec![(SEED, FakePage::titled("Home", &[]))]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(2));

        crawler.cancel();
        crawler.clone().scan(SEED.to_string(), 0).await;

        assert!(drain(&mut rx).is_empty());
        assert!(!crawler.is_visited(SEED).await);
        assert_eq!(fetcher.calls(SEED), 0);
    }

    #[tokio::test]
    async fn test_missing_title_stops_the_branch() {
        let mut page = FakePage::titled("", &[A]);
        page.title = None;
        let fetcher = FakeFetcher::new(vec![(SEED, page), (A, FakePage::titled("A", &[]))]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(3));

        crawler.start(SEED);
        crawler.finished().await;

        assert_eq!(
            drain(&mut rx),
            vec![CrawlResult::failure(
                SEED,
                CrawlError::TitleUnavailable(TitleFailure::Missing)
            )]
        );
        assert_eq!(fetcher.calls(A), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_title_times_out() {
        let mut page = FakePage::titled("Home", &[]);
        page.title_delay = Some(Duration::from_secs(3));
        let fetcher = FakeFetcher::new(vec![(SEED, page)]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(2));

        crawler.clone().scan(SEED.to_string(), 0).await;

        assert_eq!(
            drain(&mut rx),
            vec![CrawlResult::failure(
                SEED,
                CrawlError::TitleUnavailable(TitleFailure::TimedOut)
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let mut page = FakePage::titled("Home", &[]);
        page.fetch_delay = Some(Duration::from_secs(30));
        let fetcher = FakeFetcher::new(vec![(SEED, page)]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(2));

        let started = Instant::now();
        crawler.clone().scan(SEED.to_string(), 0).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(
            drain(&mut rx),
            vec![CrawlResult::failure(SEED, FetchError::Timeout(SEED.to_string()))]
        );
        assert!(crawler.is_visited(SEED).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_fetch() {
        let mut page = FakePage::titled("Home", &[]);
        page.fetch_delay = Some(Duration::from_secs(3));
        let fetcher = FakeFetcher::new(vec![(SEED, page)]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(2));

        let scan = tokio::spawn(crawler.clone().scan(SEED.to_string(), 0));
        tokio::time::sleep(Duration::from_secs(1)).await;
        crawler.cancel();
        scan.await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![CrawlResult::failure(SEED, FetchError::Cancelled(SEED.to_string()))]
        );
    }

    #[tokio::test]
    async fn test_cycle_completes_naturally() {
        let fetcher = FakeFetcher::new(vec![
            (SEED, FakePage::titled("Home", &[A])),
            (A, FakePage::titled("A", &[SEED, B])),
            (B, FakePage::titled("B", &[SEED, A])),
        ]);
        let (crawler, mut rx) = crawler(&fetcher, &settings(10));

        crawler.start(SEED);
        crawler.finished().await;

        let mut urls: Vec<_> = drain(&mut rx).into_iter().map(|r| r.url).collect();
        urls.sort();
        assert_eq!(urls, vec![SEED, A, B]);
        assert_eq!(crawler.visited_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_capped() {
        let children: Vec<String> = (0..6).map(|i| format!("https://example.com/{}", i)).collect();
        let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();

        let mut pages = vec![(SEED, FakePage::titled("Home", &child_refs))];
        for child in child_refs.iter().copied() {
            let mut page = FakePage::titled("Child", &[]);
            page.fetch_delay = Some(Duration::from_millis(100));
            pages.push((child, page));
        }
        let fetcher = FakeFetcher::new(pages);
        let settings = CrawlSettings {
            max_depth: 2,
            max_concurrency: 2,
            ..Default::default()
        };
        let (crawler, mut rx) = crawler(&fetcher, &settings);

        crawler.start(SEED);
        crawler.finished().await;

        assert_eq!(drain(&mut rx).len(), 7);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }
}
