//! The `check` subcommand: one login attempt, with the exact failure.

use anyhow::{bail, Result};
use meridian_solar_lib::Coordinator;

pub async fn run(coordinator: &Coordinator) -> Result<()> {
    match coordinator.validate_credentials().await {
        Ok(()) => {
            println!("Login succeeded.");
            Ok(())
        }
        Err(e) if e.is_credential_problem() => {
            bail!("the portal rejected the username or password ({})", e)
        }
        Err(e) => bail!("could not reach the portal login: {}", e),
    }
}
