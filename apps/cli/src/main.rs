//! airq CLI - command-line serving layer for the air-quality estimation core
//!
//! Buffers collected observations, trains model banks from them and serves
//! predictions from the latest saved version.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{collect, importance, info, predict, train, versions, CommandContext};

/// airq - air-pollutant estimation from weather, sensor and satellite signals
#[derive(Parser, Debug)]
#[command(name = "airq", author, version, about = "Air-quality estimation core")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Config file to use instead of ~/.airq/config.toml and ./airq.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model artifact directory (overrides config and AIRQ_ARTIFACT_ROOT)
    #[arg(long, global = true)]
    artifact_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append observation records to the buffer
    ///
    /// Accepts a single JSON record or a JSONL file of records.
    Collect {
        /// Record file (.json or .jsonl)
        input: PathBuf,
    },

    /// Train a new model bank
    ///
    /// Trains on the observation buffer, or on `--data` when given.
    Train {
        /// JSONL file of training records
        #[arg(long)]
        data: Option<PathBuf>,

        /// Add `--data` records to the buffer and train on everything
        #[arg(long, requires = "data")]
        append: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict pollutant levels for one record
    Predict {
        /// JSON file holding one observation record
        input: PathBuf,

        /// Model version to use (defaults to the latest)
        #[arg(long)]
        version: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict for every record of a JSONL file
    Batch {
        /// JSONL file of observation records
        input: PathBuf,

        /// Model version to use (defaults to the latest)
        #[arg(long)]
        version: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show feature importances for a target
    Importance {
        /// Target (pm2_5, pm10, no2, o3, aqi)
        target: String,

        /// Only show the N most important features
        #[arg(long)]
        top: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the loaded model bank
    Info {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List saved model versions
    Versions {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut context = CommandContext::load(args.config.as_deref())?;
    if let Some(root) = args.artifact_root {
        context.config.artifact_root = root;
    }

    // Initialize tracing
    let level_name = args.log_level.or_else(|| context.config.log_level.clone()).unwrap_or_else(|| "info".to_string());
    let level = match level_name.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Collect { input } => collect::execute(&context, &input)?,
        Command::Train { data, append, json } => train::execute(&context, data, append, json).await?,
        Command::Predict { input, version, json } => predict::execute(&context, &input, version, json)?,
        Command::Batch { input, version, json } => predict::execute_batch(&context, &input, version, json)?,
        Command::Importance { target, top, json } => importance::execute(&context, &target, top, json)?,
        Command::Info { json } => info::execute(&context, json)?,
        Command::Versions { json } => versions::execute(&context, json)?,
    }

    Ok(())
}
