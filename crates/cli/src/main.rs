//! Sidekick CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write a default config and create the sandbox
//! - `run`: Run one task to completion and print the answer
//! - `gateway`: Start the chat web interface
//! - `doctor`: Diagnose configuration and connectivity
//! - `tools`: List the tools the assistant can use

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sidekick",
    about = "Sidekick - a personal co-worker that keeps going until the job is done",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the sandbox directory
    Onboard,

    /// Run a single request through the worker/evaluator loop
    Run {
        /// Your request to the Sidekick
        #[arg(short, long)]
        message: String,

        /// What counts as done
        #[arg(short, long)]
        criteria: Option<String>,

        /// Override the maximum number of worker calls
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Start the chat web interface
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose system health
    Doctor,

    /// List available tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Run {
            message,
            criteria,
            max_iterations,
        } => commands::run::run(message, criteria, max_iterations).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Tools => commands::tools::run().await?,
    }

    Ok(())
}
