//! Manager configuration.
//!
//! Loaded from TOML, for example:
//!
//! ```toml
//! disk_directory = "/scratch/checkpoints"
//! fast_tier_budget_mb = 512
//!
//! [schedule]
//! type = "binomial"
//! blocks = 200
//! snapshots_in_ram = 8
//! snapshots_on_disk = 32
//!
//! [fixed_point]
//! absolute_tolerance = 1e-14
//! relative_tolerance = 1e-12
//! ```

use std::path::PathBuf;

use adjoint_checkpoint::{MemoryBudget, ScheduleConfig, StorageTier, TieredStorage};
use adjoint_core::FixedPointParameters;
use serde::{Deserialize, Serialize};

use crate::error::{AdjointResult, ManagerError};

/// Configuration of an [`EquationManager`](crate::EquationManager).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Checkpoint schedule.
    pub schedule: ScheduleConfig,
    /// Default convergence parameters for fixed-point solvers built by
    /// helpers and the CLI.
    pub fixed_point: Option<FixedPointParameters>,
    /// Parent directory for slow-tier files; the system temp directory when
    /// unset.
    pub disk_directory: Option<PathBuf>,
    /// Fast-tier memory budget in megabytes.
    pub fast_tier_budget_mb: Option<usize>,
    /// Accept blocks without equations.
    pub allow_empty_blocks: bool,
    /// Replace a block's equations as soon as the block is closed.
    pub replace_on_new_block: bool,
}

impl ManagerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidConfig`] for malformed TOML or invalid
    /// fixed-point parameters.
    pub fn from_toml_str(text: &str) -> AdjointResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ManagerError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Uses `schedule`.
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Places slow-tier files under `directory`.
    pub fn with_disk_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.disk_directory = Some(directory.into());
        self
    }

    /// Limits the fast tier to `mb` megabytes.
    pub fn with_fast_tier_budget_mb(mut self, mb: usize) -> Self {
        self.fast_tier_budget_mb = Some(mb);
        self
    }

    /// Accepts empty blocks.
    pub fn with_allow_empty_blocks(mut self, allow: bool) -> Self {
        self.allow_empty_blocks = allow;
        self
    }

    /// Replaces closed blocks' equations.
    pub fn with_replace_on_new_block(mut self, replace: bool) -> Self {
        self.replace_on_new_block = replace;
        self
    }

    /// Sets default fixed-point parameters.
    pub fn with_fixed_point(mut self, parameters: FixedPointParameters) -> Self {
        self.fixed_point = Some(parameters);
        self
    }

    /// Checks nested parameters.
    pub fn validate(&self) -> AdjointResult<()> {
        if let Some(parameters) = &self.fixed_point {
            parameters.validate()?;
        }
        Ok(())
    }

    /// Builds snapshot storage matching the schedule's slot limits.
    pub(crate) fn build_storage(
        &self,
        capacity: impl Fn(StorageTier) -> Option<usize>,
    ) -> TieredStorage {
        let mut storage = TieredStorage::new();
        if let Some(directory) = &self.disk_directory {
            storage = storage.with_disk_directory(directory.clone());
        }
        if let Some(mb) = self.fast_tier_budget_mb {
            storage = storage.with_memory_budget(MemoryBudget::from_mb(mb));
        }
        for tier in [StorageTier::Fast, StorageTier::Slow] {
            if let Some(slots) = capacity(tier) {
                storage = storage.with_capacity(tier, slots);
            }
        }
        storage
    }
}
