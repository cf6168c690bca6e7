//! Background sweep task
//!
//! Periodically removes expired cache entries, expired verification-id index
//! entries and idle rate windows, off the request path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::CrossValidationEngine;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Spawn the sweep task.
///
/// Runs one sweep per `interval` until `shutdown` is set. The first sweep
/// happens after one full interval.
pub fn spawn_sweep_task(
    engine: Arc<CrossValidationEngine>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Sweep task starting (interval: {}s)", interval.as_secs_f64());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = async {
                    while !shutdown.load(Ordering::Relaxed) {
                        tokio::time::sleep(SHUTDOWN_POLL.min(interval)).await;
                    }
                } => {
                    info!("Sweep task interrupted by shutdown");
                    break;
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                info!("Sweep task shutting down");
                break;
            }

            let report = engine.sweep();
            debug!(removed = report.total(), "Sweep cycle complete");
        }
    })
}
