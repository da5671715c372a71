// src/signals.rs
// =============================================================================
// This module turns process signals into crawl controls.
//
//   SIGUSR1          -> raise the depth limit by the configured increment
//   SIGINT, SIGTERM  -> cancel the crawl
//
// e.g. `kill -USR1 <pid>` while a crawl is running lets it go two levels
// deeper (the PID is logged at startup). On non-unix platforms only Ctrl-C
// is available, and it cancels.
// =============================================================================

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawl::Crawler;

// What a signal asks the crawl to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    IncreaseDepth,
    Cancel,
}

// The two actions the process boundary can trigger at any time
pub trait CrawlControl: Send + Sync {
    /// Raises the depth limit, returns the new limit
    fn increase_depth(&self, delta: usize) -> usize;
    fn cancel(&self);
}

impl CrawlControl for Crawler {
    fn increase_depth(&self, delta: usize) -> usize {
        Crawler::increase_depth(self, delta)
    }

    fn cancel(&self) {
        Crawler::cancel(self)
    }
}

pub fn apply(control: &dyn CrawlControl, signal: ControlSignal, increment: usize) {
    match signal {
        ControlSignal::IncreaseDepth => {
            let depth = control.increase_depth(increment);
            info!("MaxDepth changed to {}", depth);
        }
        ControlSignal::Cancel => {
            warn!("shutdown signal caught, cancelling crawl");
            control.cancel();
        }
    }
}

// Forwards signals to `control` until `cancel` is raised
#[cfg(unix)]
pub async fn listen(
    control: Arc<dyn CrawlControl>,
    increment: usize,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = usr1.recv() => ControlSignal::IncreaseDepth,
            _ = term.recv() => ControlSignal::Cancel,
            _ = int.recv() => ControlSignal::Cancel,
        };
        apply(control.as_ref(), received, increment);
    }
}

#[cfg(not(unix))]
pub async fn listen(
    control: Arc<dyn CrawlControl>,
    increment: usize,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = tokio::signal::ctrl_c() => {
            result?;
            apply(control.as_ref(), ControlSignal::Cancel, increment);
            Ok(())
        }
    }
}
