use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use comanda_core::config::IdempotencyConfig;
use comanda_core::domain::message::retention_cutoff;
use comanda_db::repositories::ProcessedMessageRepository;
use comanda_db::RepositoryError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Deletes dedup markers that fell out of the retention window.
pub async fn sweep_once(
    repository: &dyn ProcessedMessageRepository,
    now: DateTime<Utc>,
    retention_hours: u32,
) -> Result<u64, RepositoryError> {
    let cutoff = retention_cutoff(now, retention_hours);
    let purged = repository.purge_older_than(cutoff).await?;
    info!(
        event_name = "idempotency.sweep.completed",
        purged,
        cutoff = %cutoff,
        "expired message markers purged"
    );
    Ok(purged)
}

/// Runs [`sweep_once`] every `sweep_interval_secs`, starting immediately.
/// Abort the handle to stop it.
pub fn spawn(
    repository: Arc<dyn ProcessedMessageRepository>,
    config: IdempotencyConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(config.sweep_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(error) =
                sweep_once(repository.as_ref(), Utc::now(), config.retention_hours).await
            {
                error!(
                    event_name = "idempotency.sweep.failed",
                    error = %error,
                    "processed-message sweep failed"
                );
            }
        }
    })
}
