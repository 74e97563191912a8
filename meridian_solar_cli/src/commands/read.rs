//! The `read` subcommand: a single update cycle.

use anyhow::Result;
use meridian_solar_lib::Coordinator;

use crate::output::{print_json, print_outcome_table, OutputFormat};

pub async fn run(coordinator: &Coordinator, format: &OutputFormat) -> Result<()> {
    let outcome = coordinator.refresh().await;
    match format {
        OutputFormat::Table => print_outcome_table(&outcome),
        OutputFormat::Json => print_json(&outcome),
    }
    coordinator.stop().await;
    Ok(())
}
