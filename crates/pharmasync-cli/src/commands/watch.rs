use std::io::{self, BufRead};
use std::time::Duration;

use pharmasync_core::config::SyncConfig;
use pharmasync_core::sync::{SyncScheduler, SyncTrigger};

use crate::commands::common::{load_sync_config, open_sync_engine, Context};
use crate::error::CliError;

pub async fn run_watch(interval_secs: Option<u64>, ctx: &Context) -> Result<(), CliError> {
    let config = apply_interval_override(load_sync_config(ctx)?, interval_secs);
    let engine = open_sync_engine(ctx, &config).await?;
    let scheduler = SyncScheduler::from_config(&engine, &config);

    let mut states = engine.subscribe();
    let reporter = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            println!("Sync state: {state}");
        }
    });

    spawn_refresh_listener(scheduler.trigger());
    match config.sync_interval {
        Some(interval) => println!(
            "Syncing every {}s. Press Enter to sync now, Ctrl-C to stop.",
            interval.as_secs()
        ),
        None => println!("Automatic sync disabled. Press Enter to sync now, Ctrl-C to stop."),
    }

    scheduler
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    reporter.abort();
    Ok(())
}

/// `Some(0)` turns automatic passes off.
pub fn apply_interval_override(config: SyncConfig, interval_secs: Option<u64>) -> SyncConfig {
    match interval_secs {
        None => config,
        Some(0) => config.without_auto_sync(),
        Some(secs) => config.with_sync_interval(Duration::from_secs(secs)),
    }
}

/// Each line read from stdin requests a pass; stops at end of input.
fn spawn_refresh_listener(trigger: SyncTrigger) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
            trigger.request();
        }
    });
}
