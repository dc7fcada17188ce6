use pharmasync_core::schema::PATIENTS;
use serde_json::Value;

use crate::commands::common::{fields_from, format_record_lines, open_store, Context};
use crate::error::CliError;

pub async fn run_patient_add(
    first_name: &str,
    last_name: &str,
    birth_date: Option<&str>,
    phone: Option<&str>,
    ctx: &Context,
) -> Result<(), CliError> {
    let fields = fields_from([
        ("first_name", Some(Value::from(first_name))),
        ("last_name", Some(Value::from(last_name))),
        ("birth_date", birth_date.map(Value::from)),
        ("phone", phone.map(Value::from)),
    ]);

    let store = open_store(ctx).await?;
    let record = store.create_record(&PATIENTS, &fields).await?;
    println!("{}", record.local_id);
    Ok(())
}

pub async fn run_patient_list(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let records = store.list_records(&PATIENTS).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for line in format_record_lines(&records, &PATIENTS) {
            println!("{line}");
        }
    }
    Ok(())
}
