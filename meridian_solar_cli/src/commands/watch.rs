//! The `watch` subcommand: update on the configured interval until Ctrl-C.

use anyhow::Result;
use chrono::Local;
use meridian_solar_lib::Coordinator;

use crate::output::{print_outcome_table, OutputFormat};

pub async fn run(coordinator: &Coordinator, format: &OutputFormat) -> Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    coordinator
        .run(
            |outcome| match format {
                OutputFormat::Table => {
                    println!("{}", Local::now().format("%Y-%m-%d %H:%M:%S"));
                    print_outcome_table(outcome);
                }
                // One JSON document per line so the stream can be piped.
                OutputFormat::Json => match serde_json::to_string(outcome) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
                },
            },
            shutdown,
        )
        .await;

    if let (OutputFormat::Table, Some(ts)) = (format, coordinator.last_success()) {
        println!("Last successful update: {}", ts.with_timezone(&Local));
    }
    Ok(())
}

