use pharmasync_core::schema::MEDICATIONS;
use pharmasync_core::stock::MedicationStock;

use crate::commands::common::{
    format_stock_lines, open_store, require_record, stock_to_item, Context, StockItem,
};
use crate::error::CliError;

pub async fn run_stock(
    medication: Option<i64>,
    low_only: bool,
    as_json: bool,
    ctx: &Context,
) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let stocks = if let Some(id) = medication {
        let record = require_record(&store, &MEDICATIONS, id).await?;
        let level = store.stock_level(id).await?;
        vec![MedicationStock {
            medication: record,
            level,
        }]
    } else if low_only {
        store.below_reorder_level().await?
    } else {
        store.stock_levels().await?
    };

    if as_json {
        let json_items = stocks.iter().map(stock_to_item).collect::<Vec<StockItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if stocks.is_empty() {
        println!(
            "{}",
            if low_only {
                "Nothing needs reordering."
            } else {
                "No medications in the catalog."
            }
        );
        return Ok(());
    }

    for line in format_stock_lines(&stocks) {
        println!("{line}");
    }
    Ok(())
}
