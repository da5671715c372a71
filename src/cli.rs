// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Everything here is optional: the start URL can come from a config file,
// from --external-url, or both (the flag wins).
// =============================================================================

use std::path::PathBuf;

use clap::Parser;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(
    name = "site-crawler",
    version,
    about = "Crawl a website from a start URL and report every page title",
    long_about = "site-crawler follows links from a start URL up to a maximum depth, \
                  printing the title of every page it visits. Send SIGUSR1 to the \
                  running process to crawl deeper, SIGINT/SIGTERM to stop."
)]
pub struct Cli {
    /// Configuration file (.json, .yaml, .yml or .env)
    ///
    /// Example: --config configuration/config.yaml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Start URL in full form, overrides the one in the config file
    ///
    /// Example: --external-url https://example.com/
    #[arg(long, value_name = "URL")]
    pub external_url: Option<String>,

    /// Maximum crawl depth, overrides the config file
    ///
    /// Depth 1 = just the start page
    /// Depth 2 = start page + all pages it links to
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    /// Log debug details (RUST_LOG takes precedence when set)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    // The values that win over the config file
    pub fn overrides(&self) -> Overrides {
        Overrides {
            start_url: self.external_url.clone(),
            max_depth: self.max_depth,
        }
    }
}
