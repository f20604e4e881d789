use chrono::Utc;
use comanda_core::domain::message::retention_cutoff;
use comanda_db::repositories::ProcessedMessageRepository;
use comanda_db::{connect_with_config, Repositories};

use crate::commands::{prepare, CommandResult};

/// One pass of the server's background sweep, for cron or manual cleanup.
pub fn run(retention_hours: Option<u32>) -> CommandResult {
    let (config, runtime) = match prepare("sweep") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let retention_hours = retention_hours.unwrap_or(config.idempotency.retention_hours);
    if retention_hours == 0 {
        return CommandResult::failure(
            "sweep",
            "invalid_argument",
            "--retention-hours must be greater than zero",
            2,
        );
    }
    let cutoff = retention_cutoff(Utc::now(), retention_hours);

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let purged = Repositories::sql(pool.clone())
            .processed_messages
            .purge_older_than(cutoff)
            .await
            .map_err(|error| ("sweep", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<u64, (&'static str, String, u8)>(purged)
    });

    match result {
        Ok(purged) => CommandResult::success(
            "sweep",
            format!("purged {purged} processed-message marker(s) older than {retention_hours}h"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
