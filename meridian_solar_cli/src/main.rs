mod commands;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meridian_solar_lib::{Config, Coordinator};

use crate::output::OutputFormat;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "meridian-solar.toml";

#[derive(Parser)]
#[command(name = "meridian-solar")]
#[command(about = "Read solar and energy data from the Meridian Energy customer portal")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Config file (TOML). Credentials may also come from MERIDIAN_USERNAME
    /// and MERIDIAN_PASSWORD.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in once and report whether the credentials work
    Check,
    /// Run one update cycle and print the reading
    Read,
    /// Update on the configured interval until interrupted
    Watch,
    /// Show session state and run the portal self-test
    Diagnose(commands::diagnose::DiagnoseArgs),
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::load(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("loading config from {}", DEFAULT_CONFIG_FILE))?
        }
        None => Config::default(),
    };
    Ok(config.with_env_overrides().validate()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meridian_solar_lib=info".parse()?)
                .add_directive("meridian_portal=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let config = load_config(cli.config.as_deref())?;
    let coordinator = Coordinator::new(&config)?;

    match &cli.command {
        Commands::Check => commands::check::run(&coordinator).await?,
        Commands::Read => commands::read::run(&coordinator, &format).await?,
        Commands::Watch => commands::watch::run(&coordinator, &format).await?,
        Commands::Diagnose(args) => commands::diagnose::run(args, &coordinator, &format).await?,
    }

    Ok(())
}
