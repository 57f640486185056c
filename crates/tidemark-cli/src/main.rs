mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tidemark",
    version,
    about = "Stage, load, and quality-gate warehouse tables from object storage"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline for one logical key
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Logical key for this run, usually a date (default: today, UTC)
        #[arg(long)]
        key: Option<String>,
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate pipeline configuration and warehouse connectivity
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Print the task graph level by level without running it
    Plan {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            key,
            json,
        } => commands::run::execute(&pipeline, key.as_deref(), json).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
        Commands::Plan { pipeline } => commands::plan::execute(&pipeline),
    }
}
