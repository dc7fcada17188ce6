pub mod common;
pub mod completions;
pub mod ledger;
pub mod medication;
pub mod patient;
pub mod status;
pub mod stock;
pub mod sync;
pub mod watch;
