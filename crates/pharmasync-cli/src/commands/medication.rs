use pharmasync_core::schema::MEDICATIONS;
use pharmasync_core::{Fields, LocalRecord, LocalStore};
use serde_json::Value;

use crate::cli::MedicationArgs;
use crate::commands::common::{
    fields_from, format_record_lines, open_store, require_record, Context,
};
use crate::error::CliError;

pub fn medication_fields(args: &MedicationArgs) -> Fields {
    fields_from([
        ("name", args.name.clone().map(Value::from)),
        ("category", args.category.clone().map(Value::from)),
        ("unit", args.unit.clone().map(Value::from)),
        ("unit_price", args.unit_price.map(Value::from)),
        ("reorder_level", args.reorder_level.map(Value::from)),
    ])
}

pub async fn add_medication(
    store: &LocalStore,
    args: &MedicationArgs,
) -> Result<LocalRecord, CliError> {
    Ok(store
        .create_record(&MEDICATIONS, &medication_fields(args))
        .await?)
}

pub async fn run_medication_add(args: &MedicationArgs, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let record = add_medication(&store, args).await?;
    println!("{}", record.local_id);
    Ok(())
}

pub async fn run_medication_list(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let records = store.list_records(&MEDICATIONS).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for line in format_record_lines(&records, &MEDICATIONS) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_medication_edit(
    id: i64,
    changes: &MedicationArgs,
    ctx: &Context,
) -> Result<(), CliError> {
    let patch = medication_fields(changes);
    if patch.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to change; pass at least one field flag".to_string(),
        ));
    }

    let store = open_store(ctx).await?;
    require_record(&store, &MEDICATIONS, id).await?;
    let record = store.update_record(&MEDICATIONS, id, &patch).await?;
    println!("{}", record.local_id);
    Ok(())
}

pub async fn run_medication_delete(id: i64, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    require_record(&store, &MEDICATIONS, id).await?;
    store.delete_record(&MEDICATIONS, id).await?;
    println!("{id}");
    Ok(())
}
