//! Adjoint CLI - Command Line Operations for the Differentiation Engine
//!
//! This is the operational entry point for the adjoint engine.
//!
//! # Commands
//!
//! - `adjoint demo` - Differentiate a diffusion model under a checkpoint schedule
//! - `adjoint verify` - Taylor-test the gradient, Hessian action and tangent-linear model
//! - `adjoint plan --blocks <n>` - Print a binomial checkpointing plan as JSON
//!
//! # Architecture
//!
//! As part of the **S**ervice layer, this crate drives the core, checkpoint
//! and engine layers from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod model;

pub use error::{CliError, Result};

use commands::ScheduleKind;

/// Adjoint differentiation engine CLI
#[derive(Parser)]
#[command(name = "adjoint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "adjoint.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Differentiate the diffusion model and compare with the in-memory gradient
    Demo {
        /// Number of timesteps
        #[arg(short, long)]
        steps: Option<usize>,

        /// Checkpoint schedule
        #[arg(long, value_enum)]
        schedule: Option<ScheduleKind>,

        /// Fast-tier snapshots (binomial) or snapshot period (periodic)
        #[arg(long, default_value = "2")]
        ram: usize,

        /// Slow-tier snapshots (binomial); any value stores periodic snapshots on disk
        #[arg(long, default_value = "0")]
        disk: usize,
    },

    /// Run Taylor remainder tests of the derivatives
    Verify,

    /// Print the binomial checkpointing plan as JSON
    Plan {
        /// Number of blocks
        #[arg(short, long)]
        blocks: usize,

        /// Fast-tier snapshots
        #[arg(long, default_value = "2")]
        ram: usize,

        /// Slow-tier snapshots
        #[arg(long, default_value = "0")]
        disk: usize,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = config::load(&cli.config)?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Demo {
            steps,
            schedule,
            ram,
            disk,
        } => commands::demo::run(
            &config,
            &commands::demo::DemoOptions {
                steps,
                schedule,
                ram,
                disk,
            },
        ),
        Commands::Verify => commands::verify::run(&config),
        Commands::Plan { blocks, ram, disk } => commands::plan::run(blocks, ram, disk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo_flags() {
        let cli = Cli::try_parse_from([
            "adjoint", "demo", "--steps", "12", "--schedule", "binomial", "--ram", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Demo {
                steps,
                schedule,
                ram,
                disk,
            } => {
                assert_eq!(steps, Some(12));
                assert_eq!(schedule, Some(ScheduleKind::Binomial));
                assert_eq!((ram, disk), (3, 0));
            }
            _ => panic!("expected demo"),
        }
        assert_eq!(cli.config, PathBuf::from("adjoint.toml"));
    }

    #[test]
    fn test_plan_requires_blocks() {
        assert!(Cli::try_parse_from(["adjoint", "plan"]).is_err());
    }
}
