//! CLI command implementations
//!
//! Each submodule implements a specific CLI command.

pub mod demo;
pub mod plan;
pub mod verify;

use clap::ValueEnum;

/// Checkpoint schedule selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScheduleKind {
    /// Keep everything in memory
    Memory,
    /// Snapshot at a fixed block interval
    Periodic,
    /// Binomial checkpointing over the model's blocks
    Binomial,
}
