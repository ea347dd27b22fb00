//! Worker keeping the observed mission in step with its plan

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::mission::observer::MissionObserver;

/// Observer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between plan checks
    pub interval: Duration,

    /// Initial delay before the first mission starts
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(0),
        }
    }
}

/// Run the observer worker.
///
/// Starts a mission as soon as a plan is available, then swaps it whenever
/// the plan changes.
pub async fn run<S, F>(
    options: &Options,
    observer: &MissionObserver,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Observer worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Observer worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        observe(observer).await;

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Observer worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}

async fn observe(observer: &MissionObserver) {
    if !observer.is_active().await {
        match observer.start().await {
            Ok(()) => info!("Mission started for the active plan"),
            Err(e) => error!("Unable to start mission: {}", e),
        }
        return;
    }

    match observer.check().await {
        Ok(true) => info!("Mission replaced for the updated plan"),
        Ok(false) => debug!("Plan unchanged"),
        Err(e) => error!("Plan check failed: {}", e),
    }
}
