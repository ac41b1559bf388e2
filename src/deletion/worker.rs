//! Background interval trigger for deployments without an external cron.
//!
//! The worker owns no deletion logic: it ticks at the configured interval and
//! calls [`DeletionBatchProcessor::run_batch`] with the current time. A run
//! failure is logged and the loop keeps going; the next tick retries.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info};

use super::batch::DeletionBatchProcessor;

/// Spawn the deletion worker. The first run happens immediately, then every
/// `interval`.
pub fn start_deletion_worker(
    processor: Arc<DeletionBatchProcessor>,
    interval: Duration,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting deletion worker");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match processor.run_batch(Utc::now()).await {
                Ok(summary) if summary.is_empty() => {
                    info!("Deletion run found nothing to do");
                }
                Ok(summary) => {
                    info!(
                        processed = summary.processed_count,
                        succeeded = summary.succeeded(),
                        failed = summary.failed(),
                        "Deletion run finished"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Deletion run failed");
                }
            }
        }
    })
}
