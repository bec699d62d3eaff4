use moldquote_db::{connect_with_settings, migrations, QuotationRepository, SqlQuotationRepository};
use serde_json::json;

use crate::commands::{load_config, runtime, CommandResult};

/// Lists the newest quotations in the local ledger.
pub fn run(limit: u32) -> CommandResult {
    let config = match load_config("recent") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("recent") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        if pending > 0 {
            pool.close().await;
            return Err((
                "migration_pending",
                format!("{pending} migration(s) pending, run `moldquote migrate` first"),
                5u8,
            ));
        }

        let records = SqlQuotationRepository::new(pool.clone())
            .list_recent(limit)
            .await
            .map_err(|error| ("query", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(records)
    });

    match result {
        Ok(records) => {
            let rows = serde_json::to_value(&records).unwrap_or_else(|_| json!([]));
            CommandResult::success_with_data(
                "recent",
                format!("{} quotation(s)", records.len()),
                Some(json!({ "limit": limit, "quotations": rows })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recent", error_class, message, exit_code)
        }
    }
}
