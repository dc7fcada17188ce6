use pharmasync_core::schema::{
    EntityDescriptor, MEDICATIONS, PATIENTS, STOCK_ADJUSTMENTS, STOCK_RECEIPTS, STOCK_RETURNS,
};
use pharmasync_core::{LocalRecord, LocalStore};
use serde_json::Value;

use crate::cli::{IssueArgs, MovementArgs, ReceiveArgs};
use crate::commands::common::{fields_from, now_ms, open_store, require_record, Context};
use crate::error::CliError;

pub fn positive_quantity(quantity: i64) -> Result<i64, CliError> {
    if quantity > 0 {
        Ok(quantity)
    } else {
        Err(CliError::InvalidArgument(format!(
            "quantity must be positive (got {quantity})"
        )))
    }
}

pub async fn receive(store: &LocalStore, args: &ReceiveArgs) -> Result<LocalRecord, CliError> {
    let quantity = positive_quantity(args.quantity)?;
    require_record(store, &MEDICATIONS, args.medication).await?;

    let fields = fields_from([
        ("medication_id", Some(Value::from(args.medication))),
        ("quantity", Some(Value::from(quantity))),
        ("received_at", Some(Value::from(now_ms()))),
        ("supplier", args.supplier.clone().map(Value::from)),
        ("batch_number", args.batch_number.clone().map(Value::from)),
        ("expiry_date", args.expiry_date.clone().map(Value::from)),
    ]);
    Ok(store.create_record(&STOCK_RECEIPTS, &fields).await?)
}

pub async fn issue(
    store: &LocalStore,
    args: &IssueArgs,
) -> Result<(LocalRecord, Vec<LocalRecord>), CliError> {
    if let Some(patient) = args.patient {
        require_record(store, &PATIENTS, patient).await?;
    }
    for line in &args.lines {
        require_record(store, &MEDICATIONS, line.medication_id).await?;
    }

    let header = fields_from([
        ("patient_id", args.patient.map(Value::from)),
        ("issued_at", Some(Value::from(now_ms()))),
        ("prescriber", args.prescriber.clone().map(Value::from)),
        ("note", args.note.clone().map(Value::from)),
    ]);
    Ok(store.record_issuance(&header, &args.lines).await?)
}

pub async fn record_return(
    store: &LocalStore,
    args: &MovementArgs,
) -> Result<LocalRecord, CliError> {
    let quantity = positive_quantity(args.quantity)?;
    record_movement(store, &STOCK_RETURNS, "returned_at", args, quantity).await
}

pub async fn adjust(store: &LocalStore, args: &MovementArgs) -> Result<LocalRecord, CliError> {
    if args.quantity == 0 {
        return Err(CliError::InvalidArgument(
            "an adjustment of zero changes nothing".to_string(),
        ));
    }
    record_movement(store, &STOCK_ADJUSTMENTS, "adjusted_at", args, args.quantity).await
}

async fn record_movement(
    store: &LocalStore,
    entity: &EntityDescriptor,
    timestamp_field: &str,
    args: &MovementArgs,
    quantity: i64,
) -> Result<LocalRecord, CliError> {
    require_record(store, &MEDICATIONS, args.medication).await?;
    let fields = fields_from([
        ("medication_id", Some(Value::from(args.medication))),
        ("quantity", Some(Value::from(quantity))),
        (timestamp_field, Some(Value::from(now_ms()))),
        ("reason", args.reason.clone().map(Value::from)),
    ]);
    Ok(store.create_record(entity, &fields).await?)
}

pub async fn run_receive(args: &ReceiveArgs, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let record = receive(&store, args).await?;
    print_on_hand(&store, &record, args.medication).await
}

pub async fn run_issue(args: &IssueArgs, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let (header, lines) = issue(&store, args).await?;
    println!("{} ({} lines)", header.local_id, lines.len());
    Ok(())
}

pub async fn run_return(args: &MovementArgs, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let record = record_return(&store, args).await?;
    print_on_hand(&store, &record, args.medication).await
}

pub async fn run_adjust(args: &MovementArgs, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let record = adjust(&store, args).await?;
    print_on_hand(&store, &record, args.medication).await
}

async fn print_on_hand(
    store: &LocalStore,
    record: &LocalRecord,
    medication_id: i64,
) -> Result<(), CliError> {
    let level = store.stock_level(medication_id).await?;
    println!("{}  on hand: {}", record.local_id, level.on_hand());
    Ok(())
}
