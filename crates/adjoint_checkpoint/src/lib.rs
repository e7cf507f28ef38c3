//! # adjoint_checkpoint: Checkpointing for Adjoint Reverse Sweeps
//!
//! This crate decides where the forward model is snapshotted and how the
//! reverse sweep recomputes what it did not keep.
//!
//! ## Architecture
//!
//! - [`schedule`]: schedules and the [`Action`] stream they emit
//! - [`storage`]: fast (memory) and slow (disk) snapshot tiers
//! - [`Snapshot`]: variable values at a block boundary
//! - [`MemoryBudget`]: fast-tier memory limit
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use adjoint_checkpoint::{Action, BinomialSchedule, CheckpointSchedule};
//!
//! let schedule = BinomialSchedule::new(8, 2, 0).unwrap();
//! let plan = schedule.reverse_plan(8, &BTreeMap::new()).unwrap();
//! let reversed = plan
//!     .iter()
//!     .filter(|a| matches!(a, Action::Reverse { .. }))
//!     .count();
//! assert_eq!(reversed, 8);
//! assert_eq!(plan.last(), Some(&Action::End));
//! ```

#![warn(missing_docs)]

pub mod budget;
pub mod config;
pub mod error;
pub mod schedule;
pub mod snapshot;
pub mod storage;

pub use budget::MemoryBudget;
pub use config::ScheduleConfig;
pub use error::{CheckpointError, CheckpointResult};
pub use schedule::{
    Action, BinomialSchedule, CheckpointSchedule, MemorySchedule, PeriodicSchedule, StorageTier,
};
pub use snapshot::Snapshot;
pub use storage::{CheckpointStorage, DiskStorage, MemoryStorage, TieredStorage};
