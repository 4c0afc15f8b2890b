//! Colorspace normalizer
//!
//! Runs the normalization pipeline either inside the function runtime or once
//! against a stored event document.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod wiring;

use commands::invoke::InvokeCommand;
use commands::lambda::LambdaCommand;

#[derive(Parser)]
#[command(
    name = "colorspace-normalizer",
    version,
    about = "Convert CMYK uploads to RGB in place",
    after_help = "EXAMPLES:\n  \
                  # Serve object-created notifications inside the function runtime\n  \
                  colorspace-normalizer lambda\n\n  \
                  # Process a saved notification\n  \
                  colorspace-normalizer invoke --event event.json\n  \
                  cat event.json | colorspace-normalizer invoke --event -\n\n  \
                  # Process specific keys with settings from a file\n  \
                  colorspace-normalizer invoke --config normalizer.yaml --key ns/pages_1/a.jpg"
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
    /// Serve invocations from the function runtime
    Lambda(LambdaCommand),

    /// Process one event document or a list of keys and print the response
    Invoke(InvokeCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // The function runtime's log sink does not render colors
    let ansi = !matches!(cli.command, Commands::Lambda(_));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Lambda(cmd) => cmd.execute().await,
        Commands::Invoke(cmd) => cmd.execute().await,
    }
}
