use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use pharmasync_core::stock::IssuanceLine;

#[derive(Parser)]
#[command(name = "pharmasync")]
#[command(about = "Pharmacy stock management that keeps working offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Never contact the remote store
    #[arg(long, global = true)]
    pub offline: bool,

    /// Seed file (JSON) applied to empty tables before running the command
    #[arg(long, global = true, value_name = "PATH")]
    pub seed: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync pass against the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Keep syncing on an interval until Ctrl-C; press Enter to sync now
    Watch {
        /// Seconds between passes (0 disables automatic passes)
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
    },
    /// Show queued changes per table
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the medication catalog
    #[command(alias = "med")]
    Medication {
        #[command(subcommand)]
        command: MedicationCommands,
    },
    /// Manage patients
    Patient {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Record received stock
    Receive(ReceiveArgs),
    /// Issue medications to a patient
    Issue(IssueArgs),
    /// Record stock returned to the pharmacy
    Return(MovementArgs),
    /// Correct stock by a signed quantity
    Adjust(MovementArgs),
    /// Show current stock derived from the ledgers
    Stock {
        /// Only this medication (local id)
        #[arg(long, value_name = "ID")]
        medication: Option<i64>,
        /// Only medications at or below their reorder level
        #[arg(long, conflicts_with = "medication")]
        low: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently logged sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum MedicationCommands {
    /// Add a medication to the catalog
    Add(MedicationArgs),
    /// List catalog medications
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a medication
    Edit {
        /// Local medication id
        id: i64,
        #[command(flatten)]
        changes: MedicationArgs,
    },
    /// Delete a medication
    Delete {
        /// Local medication id
        id: i64,
    },
}

/// Medication fields; every flag is optional so the same set serves edits.
#[derive(Args, Debug, Default)]
pub struct MedicationArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    /// Dispensing unit, e.g. tablet or ml
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long, value_name = "PRICE")]
    pub unit_price: Option<f64>,
    /// Stock level at which the medication needs reordering
    #[arg(long, value_name = "QTY")]
    pub reorder_level: Option<i64>,
}

#[derive(Subcommand)]
pub enum PatientCommands {
    /// Add a patient
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Birth date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        birth_date: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List patients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Local medication id
    #[arg(long, value_name = "ID")]
    pub medication: i64,
    #[arg(long, value_name = "QTY")]
    pub quantity: i64,
    #[arg(long)]
    pub supplier: Option<String>,
    #[arg(long, value_name = "BATCH")]
    pub batch_number: Option<String>,
    /// Expiry date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub expiry_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Local patient id
    #[arg(long, value_name = "ID")]
    pub patient: Option<i64>,
    /// Issued line as MEDICATION_ID:QUANTITY (repeatable)
    #[arg(
        long = "line",
        value_name = "MED:QTY",
        required = true,
        value_parser = parse_issuance_line
    )]
    pub lines: Vec<IssuanceLine>,
    #[arg(long)]
    pub prescriber: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug)]
pub struct MovementArgs {
    /// Local medication id
    #[arg(long, value_name = "ID")]
    pub medication: i64,
    /// Quantity; adjustments may be negative
    #[arg(long, value_name = "QTY", allow_negative_numbers = true)]
    pub quantity: i64,
    #[arg(long)]
    pub reason: Option<String>,
}

/// Parse `MEDICATION_ID:QUANTITY`.
pub fn parse_issuance_line(raw: &str) -> Result<IssuanceLine, String> {
    let (medication, quantity) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected MEDICATION_ID:QUANTITY, got '{raw}'"))?;
    let medication_id = medication
        .trim()
        .parse()
        .map_err(|_| format!("invalid medication id '{medication}'"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|_| format!("invalid quantity '{quantity}'"))?;
    Ok(IssuanceLine {
        medication_id,
        quantity,
    })
}
