use pharmasync_core::sync::SyncOutcome;

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_report_lines, load_sync_config, open_store,
    open_sync_engine, sync_conflict_to_item, Context, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(ctx: &Context) -> Result<(), CliError> {
    let config = load_sync_config(ctx)?;
    if config.offline_mode {
        return Err(CliError::OfflineMode);
    }

    let engine = open_sync_engine(ctx, &config).await?;
    match engine.sync().await? {
        SyncOutcome::Completed(report) => {
            for line in format_sync_report_lines(&report) {
                println!("{line}");
            }
        }
        SyncOutcome::Skipped => println!("A sync pass is already running"),
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    ctx: &Context,
) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
