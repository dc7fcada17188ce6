use pharmasync_core::db::StatusCounts;
use serde::Serialize;

use crate::commands::common::{load_sync_config, open_store, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub entity: &'static str,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

pub async fn run_status(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let config = load_sync_config(ctx)?;
    let store = open_store(ctx).await?;
    let summary = store.status_summary().await?;

    if as_json {
        let items = summary
            .into_iter()
            .map(|(entity, counts)| StatusItem { entity, counts })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    let remote = match (&config.remote_url, config.offline_mode) {
        (_, true) => "offline".to_string(),
        (Some(url), false) => url.clone(),
        (None, false) => "not configured".to_string(),
    };
    println!("Remote: {remote}");
    for line in format_status_lines(&summary) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(summary: &[(&'static str, StatusCounts)]) -> Vec<String> {
    let mut lines = summary
        .iter()
        .map(|(entity, counts)| {
            format!(
                "{entity:<18}  create {:>3}  update {:>3}  delete {:>3}  synced {:>5}",
                counts.pending_create, counts.pending_update, counts.pending_delete, counts.synced
            )
        })
        .collect::<Vec<_>>();
    let pending = summary
        .iter()
        .map(|(_, counts)| counts.pending())
        .sum::<usize>();
    lines.push(format!("{pending} changes waiting to sync"));
    lines
}
