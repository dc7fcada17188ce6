use std::env;
use std::path::PathBuf;

use chrono::Utc;
use pharmasync_core::config::SyncConfig;
use pharmasync_core::db::Seed;
use pharmasync_core::remote::HttpRemoteStore;
use pharmasync_core::stock::MedicationStock;
use pharmasync_core::sync::{SyncEngine, SyncReport};
use pharmasync_core::{EntityDescriptor, Fields, LocalRecord, LocalStore, SyncConflict};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

pub const ENV_DB_PATH: &str = "PHARMASYNC_DB_PATH";

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub offline: bool,
    pub seed: Option<PathBuf>,
}

impl Context {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            offline: false,
            seed: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity: String,
    pub remote_doc_id: String,
    pub local_modified_at: i64,
    pub incoming_modified_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

#[derive(Debug, Serialize)]
pub struct StockItem {
    pub medication_id: i64,
    pub name: String,
    pub on_hand: i64,
    pub reorder_level: Option<i64>,
    pub needs_reorder: bool,
}

pub async fn open_store(ctx: &Context) -> Result<LocalStore, CliError> {
    let store = LocalStore::open_path(ctx.db_path.clone()).await?;
    if let Some(seed_path) = &ctx.seed {
        let seed = Seed::load(seed_path)?;
        let inserted = store.apply_seed(&seed).await?;
        tracing::info!("Seeded {inserted} rows from {}", seed_path.display());
    }
    Ok(store)
}

/// Sync settings from the environment, with `--offline` layered on top.
pub fn load_sync_config(ctx: &Context) -> Result<SyncConfig, CliError> {
    let config = SyncConfig::from_env()?;
    let offline = ctx.offline || config.offline_mode;
    Ok(config.with_offline_mode(offline))
}

pub async fn open_sync_engine(
    ctx: &Context,
    config: &SyncConfig,
) -> Result<SyncEngine<HttpRemoteStore>, CliError> {
    let remote = HttpRemoteStore::from_config(config)?.ok_or(CliError::SyncNotConfigured)?;
    let store = open_store(ctx).await?;
    Ok(SyncEngine::new(store, remote))
}

pub async fn require_record(
    store: &LocalStore,
    entity: &EntityDescriptor,
    id: i64,
) -> Result<LocalRecord, CliError> {
    store
        .get_record(entity, id)
        .await?
        .ok_or(CliError::RecordNotFound {
            entity: entity.local_table,
            id,
        })
}

/// Collect the set flags into a field map.
pub fn fields_from<const N: usize>(pairs: [(&str, Option<Value>); N]) -> Fields {
    pairs
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name.to_string(), value)))
        .collect()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pharmasync")
        .join("pharmasync.db")
}

pub fn record_label(record: &LocalRecord, entity: &EntityDescriptor) -> String {
    let parts = entity
        .natural_key
        .iter()
        .filter_map(|name| record.text(name))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        format!("#{}", record.local_id)
    } else {
        parts.join(" ")
    }
}

pub fn format_record_lines(records: &[LocalRecord], entity: &EntityDescriptor) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{:>5}  {:<32}  {}",
                record.local_id,
                record_label(record, entity),
                record.sync_status
            )
        })
        .collect()
}

pub fn format_sync_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = report
        .entities
        .iter()
        .map(|entity| {
            let mut line = format!(
                "{:<18}  pushed {:>3}  pulled {:>3}",
                entity.entity,
                entity.push.pushed(),
                entity.pull.changed()
            );
            if entity.push.failed > 0 {
                line.push_str(&format!("  queued {}", entity.push.failed));
            }
            if entity.pull.skipped > 0 {
                line.push_str(&format!("  skipped {}", entity.pull.skipped));
            }
            if entity.pull.conflicts > 0 {
                line.push_str(&format!("  conflicts {}", entity.pull.conflicts));
            }
            if entity.push.transaction_failed {
                line.push_str("  (push rolled back)");
            }
            line
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "Sync completed: {} pushed, {} pulled, {} still queued",
        report.pushed(),
        report.pulled(),
        report.failed()
    ));
    lines
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity: conflict.entity.clone(),
        remote_doc_id: conflict.remote_doc_id.clone(),
        local_modified_at: conflict.local_modified_at,
        incoming_modified_at: conflict.incoming_modified_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}/{}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.entity,
                conflict.remote_doc_id,
                conflict.local_modified_at,
                conflict.incoming_modified_at
            )
        })
        .collect()
}

pub fn stock_to_item(stock: &MedicationStock) -> StockItem {
    StockItem {
        medication_id: stock.level.medication_id,
        name: stock.name().to_string(),
        on_hand: stock.level.on_hand(),
        reorder_level: stock.reorder_level(),
        needs_reorder: stock.needs_reorder(),
    }
}

pub fn format_stock_lines(stocks: &[MedicationStock]) -> Vec<String> {
    stocks
        .iter()
        .map(|stock| {
            let reorder = stock
                .reorder_level()
                .map_or_else(String::new, |level| format!("  reorder at {level}"));
            let flag = if stock.needs_reorder() { "  LOW" } else { "" };
            format!(
                "{:>5}  {:<32}  {:>6}{reorder}{flag}",
                stock.level.medication_id,
                stock.name(),
                stock.level.on_hand()
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
