// src/crawl/watchdog.rs
// =============================================================================
// The result sink: drains the crawler's results and decides when the crawl
// is over.
//
// The loop wakes up on four things:
// - a new result      -> log it, tally it, reset the idle timer
// - a periodic tick   -> if nothing arrived for longer than the stall
//                        threshold, cancel the whole crawl and stop
// - cancellation      -> someone else stopped the crawl, just stop
// - natural end       -> every crawl branch returned, drain and stop
//
// Per-URL errors are only logged and counted. They end the crawl only when an
// error limit is configured.
//
// Rust concepts used:
// - tokio::select! with `biased;`: Branches are polled top to bottom, so a
//   cancellation is always noticed before yet another result
// - loop + break value: The loop itself evaluates to the CrawlOutcome
// - Generic Future parameter: The watchdog does not need to know where the
//   "natural end" signal comes from, tests pass a plain future
// =============================================================================

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::CrawlResult;
use crate::config::CrawlSettings;

// Why the watchdog stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// Every branch finished on its own
    Completed,
    /// No result for longer than the stall threshold
    Stalled,
    /// Cancelled from outside (signal)
    Cancelled,
    /// Too many per-URL errors
    ErrorLimit,
}

// Everything the watchdog saw
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub outcome: CrawlOutcome,
    pub ok: usize,
    pub errors: usize,
    pub results: Vec<CrawlResult>,
}

impl CrawlSummary {
    fn new() -> Self {
        Self {
            outcome: CrawlOutcome::Completed,
            ok: 0,
            errors: 0,
            results: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    tick: Duration,
    stall_timeout: Duration,
    max_errors: Option<usize>,
}

impl Watchdog {
    pub fn new(settings: &CrawlSettings) -> Self {
        Self {
            tick: settings.tick(),
            stall_timeout: settings.stall_timeout(),
            max_errors: settings.max_errors,
        }
    }

    // Consumes results until the crawl completes, stalls or is cancelled
    //
    // `finished` should resolve when the crawler has no branch left running.
    pub async fn run<F>(
        &self,
        mut results: mpsc::Receiver<CrawlResult>,
        cancel: &CancellationToken,
        finished: F,
    ) -> CrawlSummary
    where
        F: Future<Output = ()>,
    {
        let mut summary = CrawlSummary::new();

        // The idle clock starts now, so the seed gets the full threshold
        let mut idle_since = Instant::now();

        // interval_at so the first tick comes after one period, not right away
        // Delay: after a slow iteration, keep the period instead of bursting
        let mut ticker = interval_at(idle_since + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // select! polls `finished` by reference on every iteration, which
        // requires it to be pinned in place
        tokio::pin!(finished);

        summary.outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    warn!("crawl cancelled");
                    break CrawlOutcome::Cancelled;
                }

                received = results.recv() => match received {
                    Some(result) => {
                        // Any result, good or bad, counts as progress
                        idle_since = Instant::now();
                        if self.record(&mut summary, result) {
                            error!("error limit reached ({} errors), cancelling crawl", summary.errors);
                            cancel.cancel();
                            break CrawlOutcome::ErrorLimit;
                        }
                    }
                    // Every sender is gone: the crawler itself was dropped
                    None => break CrawlOutcome::Completed,
                },

                _ = &mut finished => {
                    // No branch can send anymore, but results may still be
                    // sitting in the channel buffer
                    while let Ok(result) = results.try_recv() {
                        self.record(&mut summary, result);
                    }
                    info!("all crawl branches finished");
                    break CrawlOutcome::Completed;
                }

                _ = ticker.tick() => {
                    // Branches still in flight are stopped through the token
                    let idle = idle_since.elapsed();
                    if idle > self.stall_timeout {
                        warn!("no result for {:?}, cancelling crawl", idle);
                        cancel.cancel();
                        break CrawlOutcome::Stalled;
                    }
                }
            }
        };

        summary
    }

    // Logs and stores one result, returns true when the error limit is hit
    fn record(&self, summary: &mut CrawlSummary, result: CrawlResult) -> bool {
        // Same log lines for every result, the table comes later
        match &result.error {
            Some(err) => {
                error!("ERROR Link: {}, err: {}", result.url, err);
                summary.errors += 1;
            }
            None => {
                info!("Link: {}, Title: {}", result.url, result.title);
                summary.ok += 1;
            }
        }
        summary.results.push(result);

        // None means there is no limit at all
        matches!(self.max_errors, Some(limit) if summary.errors >= limit)
    }
}
