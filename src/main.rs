mod batch;
mod clean;
mod cli;
mod config;
mod error;
mod input;
mod orchestrator;
mod output;
mod ui;
mod vision;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use config::TrackerConfig;
use console::Style;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", Style::new().red().bold().apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}

// Diagnostics go to stderr; the progress bar and summary own stdout.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = TrackerConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Command::Config => {
            print!("{}", config.to_masked_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { folder, output } => {
            let outcome =
                orchestrator::run_folder(&config, &folder, output.as_deref(), cli.verbose).await?;
            Ok(ExitCode::from(orchestrator::exit_code(outcome.report.status)))
        }
    }
}

/// CLI flags win over the environment and the config file.
fn apply_overrides(config: &mut TrackerConfig, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }
    if let Some(rpm) = cli.rpm {
        config.rate_limit_rpm = rpm;
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }
}
