//! The `diagnose` subcommand: redacted session state and the portal
//! self-test.

use anyhow::Result;
use clap::Args;
use meridian_solar_lib::Coordinator;

use crate::output::{print_diagnostics_table, print_json, OutputFormat};

#[derive(Args)]
pub struct DiagnoseArgs {
    /// Skip the self-test and only show session state
    #[arg(long)]
    pub no_self_test: bool,
}

pub async fn run(args: &DiagnoseArgs, coordinator: &Coordinator, format: &OutputFormat) -> Result<()> {
    let snapshot = coordinator.diagnostics(!args.no_self_test).await;
    match format {
        OutputFormat::Table => print_diagnostics_table(&snapshot),
        OutputFormat::Json => print_json(&snapshot),
    }
    coordinator.stop().await;
    Ok(())
}
