//! Overload Probe Binary
//!
//! Run with: `overload-probe <COMMAND>`

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use overload::DispatchConfig;
use overload_probe::Scenario;

#[derive(Parser)]
#[command(name = "overload-probe")]
#[command(about = "Run dispatch scenarios against the overload runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a scenario and perform its calls
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Configuration file path, overriding the scenario's [config] table
        #[arg(short = 'c', long, env = "OVERLOAD_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Build a scenario and print its registration diagnostics
    Check {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Configuration file path, overriding the scenario's [config] table
        #[arg(short = 'c', long, env = "OVERLOAD_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the default configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Commands::Config => {
            print!("{}", DispatchConfig::default().to_toml_string()?);
            Ok(())
        }
        Commands::Run {
            scenario,
            json,
            config,
        } => run(scenario, config.as_deref(), *json),
        Commands::Check { scenario, config } => check(scenario, config.as_deref()),
    }
}

fn load(path: &Path, config_path: Option<&Path>) -> Result<(Scenario, DispatchConfig)> {
    let scenario = Scenario::load(path)
        .with_context(|| format!("Failed to load scenario: {}", path.display()))?;

    let config = match config_path {
        Some(config_path) => DispatchConfig::load(config_path)
            .with_context(|| format!("Failed to load config file: {}", config_path.display()))?,
        None => scenario.config(),
    };
    debug!(?config, "using configuration");

    Ok((scenario, config))
}

fn run(path: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let (scenario, config) = load(path, config_path)?;
    let session = scenario
        .build(config)
        .with_context(|| format!("Failed to build scenario: {}", path.display()))?;

    let report = session.run(&scenario.calls);
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }

    info!(
        "Performed {} calls, {} failed",
        report.calls.len(),
        report.failures()
    );
    Ok(())
}

fn check(path: &Path, config_path: Option<&Path>) -> Result<()> {
    let (scenario, config) = load(path, config_path)?;
    let session = scenario
        .build(config)
        .with_context(|| format!("Failed to build scenario: {}", path.display()))?;

    for diagnostic in session.diagnostics() {
        println!("warning: {}", diagnostic.replace('\n', "\n    "));
    }
    println!(
        "{}: {} types, {} operations, {} classes, {} diagnostics",
        path.display(),
        session.graph().len(),
        scenario.operations.len(),
        scenario.classes.len(),
        session.diagnostics().len()
    );
    Ok(())
}
