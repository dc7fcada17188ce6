//! pharmasync - pharmacy stock management from the command line

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, MedicationCommands, PatientCommands, SyncCommands};
use crate::commands::common::{resolve_db_path, Context};
use crate::commands::completions::run_completions;
use crate::commands::ledger::{run_adjust, run_issue, run_receive, run_return};
use crate::commands::medication::{
    run_medication_add, run_medication_delete, run_medication_edit, run_medication_list,
};
use crate::commands::patient::{run_patient_add, run_patient_list};
use crate::commands::status::run_status;
use crate::commands::stock::run_stock;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pharmasync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context {
        offline: cli.offline,
        seed: cli.seed,
        ..Context::new(resolve_db_path(cli.db_path))
    };

    match cli.command {
        Commands::Sync { command: None } => run_sync(&ctx).await?,
        Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit, json }),
        } => run_sync_conflicts(limit, json, &ctx).await?,
        Commands::Watch { interval_secs } => run_watch(interval_secs, &ctx).await?,
        Commands::Status { json } => run_status(json, &ctx).await?,
        Commands::Medication { command } => match command {
            MedicationCommands::Add(args) => run_medication_add(&args, &ctx).await?,
            MedicationCommands::List { json } => run_medication_list(json, &ctx).await?,
            MedicationCommands::Edit { id, changes } => {
                run_medication_edit(id, &changes, &ctx).await?;
            }
            MedicationCommands::Delete { id } => run_medication_delete(id, &ctx).await?,
        },
        Commands::Patient { command } => match command {
            PatientCommands::Add {
                first_name,
                last_name,
                birth_date,
                phone,
            } => {
                run_patient_add(
                    &first_name,
                    &last_name,
                    birth_date.as_deref(),
                    phone.as_deref(),
                    &ctx,
                )
                .await?;
            }
            PatientCommands::List { json } => run_patient_list(json, &ctx).await?,
        },
        Commands::Receive(args) => run_receive(&args, &ctx).await?,
        Commands::Issue(args) => run_issue(&args, &ctx).await?,
        Commands::Return(args) => run_return(&args, &ctx).await?,
        Commands::Adjust(args) => run_adjust(&args, &ctx).await?,
        Commands::Stock {
            medication,
            low,
            json,
        } => run_stock(medication, low, json, &ctx).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
