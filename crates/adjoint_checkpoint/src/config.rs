//! Serializable schedule selection.

use serde::{Deserialize, Serialize};

use crate::error::CheckpointResult;
use crate::schedule::{
    BinomialSchedule, CheckpointSchedule, MemorySchedule, PeriodicSchedule, StorageTier,
};

/// Which checkpoint schedule to use and its parameters.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::ScheduleConfig;
///
/// let config: ScheduleConfig = toml::from_str(
///     r#"
///     type = "binomial"
///     blocks = 100
///     snapshots_in_ram = 4
///     snapshots_on_disk = 8
///     "#,
/// )
/// .unwrap();
/// let schedule = config.build().unwrap();
/// assert_eq!(schedule.name(), "binomial");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleConfig {
    /// Keep all annotation data in memory.
    #[default]
    Memory,
    /// Snapshot every `period` blocks.
    Periodic {
        /// Blocks between snapshots
        period: usize,
        /// Destination tier
        #[serde(default)]
        tier: StorageTier,
    },
    /// Binomial checkpointing over a known number of blocks.
    Binomial {
        /// Number of blocks
        blocks: usize,
        /// Fast-tier slots
        snapshots_in_ram: usize,
        /// Slow-tier slots
        #[serde(default)]
        snapshots_on_disk: usize,
    },
}

impl ScheduleConfig {
    /// Builds the configured schedule.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::InvalidSchedule`](crate::CheckpointError::InvalidSchedule)
    /// for a zero period or zero blocks.
    pub fn build(&self) -> CheckpointResult<Box<dyn CheckpointSchedule>> {
        Ok(match *self {
            ScheduleConfig::Memory => Box::new(MemorySchedule::new()),
            ScheduleConfig::Periodic { period, tier } => {
                Box::new(PeriodicSchedule::new(period)?.with_tier(tier))
            }
            ScheduleConfig::Binomial {
                blocks,
                snapshots_in_ram,
                snapshots_on_disk,
            } => Box::new(BinomialSchedule::new(
                blocks,
                snapshots_in_ram,
                snapshots_on_disk,
            )?),
        })
    }
}
