//! Ticklock CLI - Exercise the runtime layer without a target program
//!
//! # Commands
//!
//! - `ticklock simulate` - Run a scripted program and print its determinism checksum
//! - `ticklock render` - Mix a looping tone frame by frame into a WAV file
//!
//! # Usage
//!
//! ```bash
//! # Two runs with the same flags print the same checksum
//! ticklock simulate --frames 600 --fps 60 --spin 200 --sleep-ms 4
//!
//! # Ten seconds of audio, exactly 441000 frames at 44.1 kHz
//! ticklock render --frames 600 --out tone.wav
//! ```

mod render;
mod simulate;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ticklock_core::config::{self, Config};

/// Ticklock CLI - Deterministic time playground
#[derive(Parser)]
#[command(name = "ticklock")]
#[command(about = "Run the deterministic clock and audio mixer from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted program and print its determinism checksum
    Simulate(simulate::SimulateArgs),

    /// Mix a looping tone frame by frame into a WAV file
    Render(render::RenderArgs),
}

/// Config from `path`, or the platform config file when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            config::load_from(path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => Ok(config::load()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => simulate::execute(args),
        Commands::Render(args) => render::execute(args),
    }
}
