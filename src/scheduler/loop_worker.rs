use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::{PassSummary, SpotEngine};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Run `check_all(false)` every `period` until cancelled. The first pass
/// happens one period after start.
pub async fn auto_check_loop(engine: SpotEngine, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = run_pass(&engine) => {}
                    _ = cancel_token.cancelled() => {
                        log_info!("auto-check loop cancelled mid-pass");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("auto-check loop shutting down");
                break;
            }
        }
    }
}

async fn run_pass(engine: &SpotEngine) {
    let started = Instant::now();
    match engine.check_all(false).await {
        Ok(results) => {
            let summary = PassSummary::from_results(&results);
            log_info!(
                "auto-check pass over {} spots in {:?}: {} completed, {} skipped, {} failed, {} rejected",
                results.len(),
                started.elapsed(),
                summary.completed,
                summary.skipped,
                summary.failed,
                summary.rejected
            );
        }
        Err(err) => log_error!("auto-check pass failed: {err}"),
    }
}
