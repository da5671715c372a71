// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments and load the configuration
// 2. Build the crawler, the signal listener and the watchdog
// 3. Crawl from the start URL until the crawl completes, stalls or is
//    cancelled
// 4. Print the results and exit with the proper code:
//      0 = crawl ended (completed or cancelled by a signal)
//      1 = crawl stalled or hit the error limit
//      2 = error (bad configuration, ...)
//
// Rust concepts used:
// - async/await: Every crawl branch is a tokio task doing network IO
// - Arc: The crawler is shared by its own tasks and the signal listener
// - CancellationToken: One switch shared by every part of the crawl
// - Result<T, E> with `?`: Any setup failure bubbles up to main as exit code 2
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli;      // src/cli.rs - command-line parsing
mod config;   // src/config/ - config files, defaults and validation
mod crawl;    // src/crawl/ - the crawl engine and the watchdog
mod error;    // src/error.rs - typed errors
mod fetch;    // src/fetch/ - HTTP download and HTML parsing
mod logging;  // src/logging.rs - tracing setup
mod signals;  // src/signals.rs - SIGUSR1 / SIGINT / SIGTERM handling

use std::sync::Arc;

// anyhow::Result is like std::result::Result but simpler for applications
// It lets us return any error type with the ? operator
use anyhow::Result;
use clap::Parser; // Parser trait enables the parse() method
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::Cli;
use crawl::{CrawlOutcome, CrawlResult, CrawlSummary, Crawler, Watchdog};
use fetch::HttpFetcher;
use signals::CrawlControl;

// The #[tokio::main] attribute transforms our async main into a real main function
// It creates a multi-threaded tokio runtime, so crawl branches run in parallel
#[tokio::main]
async fn main() {
    // Run our application logic and capture the exit code
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // Setup failed before (or instead of) crawling: exit code 2
            // {:#} prints the whole chain of causes on one line
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// This is the main application logic
// Returns:
//   Ok(0) = crawl completed or was cancelled
//   Ok(1) = crawl stalled or too many pages failed
//   Err   = setup error (config, logging, HTTP client)
async fn run() -> Result<i32> {
    // Parse command-line arguments into our Cli struct
    // This will automatically handle --help, --version, etc.
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    // Config file first, then the CLI flags on top, then validation
    let config = config::load(cli.config.as_deref(), &cli.overrides())?;
    let settings = &config.crawl;

    // The PID is what you pass to `kill -USR1` to crawl deeper
    info!("My PID is: {}", std::process::id());
    info!(
        "Crawling {} (max depth {}, SIGUSR1 adds {})",
        config.start_url, settings.max_depth, settings.depth_increment
    );

    // One HTTP client for the whole crawl (connection pooling)
    let fetcher = HttpFetcher::new(settings.request_timeout(), &settings.user_agent)?;

    // The token is shared by the crawler, the watchdog and the listener
    // Raising it once stops all of them
    let cancel = CancellationToken::new();
    let (crawler, results) = Crawler::new(Arc::new(fetcher), settings, cancel.clone());

    // The signal listener only sees the crawler through the CrawlControl trait
    let control: Arc<dyn CrawlControl> = crawler.clone();
    let listener = tokio::spawn(signals::listen(
        control,
        settings.depth_increment,
        cancel.clone(),
    ));

    // Kick off the seed branch, then block here until the watchdog decides
    // the crawl is over
    crawler.start(config.start_url.clone());
    let summary = Watchdog::new(settings)
        .run(results, &cancel, crawler.finished())
        .await;

    // Stops the signal listener and whatever branch is still running
    cancel.cancel();
    match listener.await {
        Ok(Ok(())) => {}
        // e.g. signal handlers could not be installed
        Ok(Err(e)) => warn!("signal handling was unavailable: {}", e),
        // The JoinError case: the listener task panicked
        Err(e) => warn!("signal listener panicked: {}", e),
    }

    info!(
        "crawl {:?} after visiting {} page(s)",
        summary.outcome,
        crawler.visited_count().await
    );

    // Print results and determine exit code
    print_results(&summary, cli.json)?;

    Ok(exit_code(summary.outcome))
}

// Maps how the crawl ended to the process exit code
fn exit_code(outcome: CrawlOutcome) -> i32 {
    match outcome {
        CrawlOutcome::Completed | CrawlOutcome::Cancelled => 0,
        CrawlOutcome::Stalled | CrawlOutcome::ErrorLimit => 1,
    }
}

// Prints the results either as a table or JSON
// Parameters:
//   summary: everything the watchdog collected
//   json: whether to output JSON format
fn print_results(summary: &CrawlSummary, json: bool) -> Result<()> {
    if json {
        // Serialize the summary (outcome, counters, results) and print it
        let json_output = serde_json::to_string_pretty(summary)?;
        println!("{}", json_output);
    } else {
        // Print human-readable table
        print_table(summary);
    }
    Ok(())
}

// Prints results as a human-readable table in the terminal
fn print_table(summary: &CrawlSummary) {
    // Print table header
    println!("{:<60} {:<10} {:<40}", "URL", "STATUS", "TITLE");
    println!("{}", "=".repeat(110));

    // Print each result, in the order the watchdog received them
    for result in &summary.results {
        println!(
            "{:<60} {:<10} {:<40}",
            truncate(&result.url, 57),
            format_status(result),
            describe(result)
        );
    }

    println!();

    // Print summary statistics
    println!("📊 Summary ({}):", format_outcome(summary.outcome));
    println!("   ✅ OK: {}", summary.ok);
    println!("   ❌ Errors: {}", summary.errors);
    println!("   📋 Total: {}", summary.total());
}

// Formats the status with an emoji for better readability
fn format_status(result: &CrawlResult) -> &'static str {
    if result.is_ok() {
        "✅ OK"
    } else {
        "❌ ERROR"
    }
}

// The title, or the error for failed pages
fn describe(result: &CrawlResult) -> String {
    match &result.error {
        Some(e) => e.to_string(),
        None => result.title.clone(),
    }
}

fn format_outcome(outcome: CrawlOutcome) -> &'static str {
    match outcome {
        CrawlOutcome::Completed => "completed",
        CrawlOutcome::Stalled => "stopped, no progress",
        CrawlOutcome::Cancelled => "cancelled",
        CrawlOutcome::ErrorLimit => "stopped, too many errors",
    }
}

// Shortens long values so the table stays aligned
// Counts chars, not bytes, so multi-byte characters are never split
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        format!("{}...", value.chars().take(max).collect::<String>())
    } else {
        value.to_string()
    }
}
