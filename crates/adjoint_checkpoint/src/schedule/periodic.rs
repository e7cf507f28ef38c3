//! Fixed-period snapshots.

use std::collections::BTreeMap;

use super::{push_segment, Action, CheckpointSchedule, StorageTier};
use crate::budget::MemoryBudget;
use crate::error::{CheckpointError, CheckpointResult};

/// Snapshots every `period` blocks during annotation. The reverse sweep
/// replays each segment from its snapshot, last segment first.
///
/// Snapshots are kept after the sweep, so repeated sweeps replay the same
/// segments.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::{Action, CheckpointSchedule, PeriodicSchedule, StorageTier};
///
/// let schedule = PeriodicSchedule::new(3).unwrap();
/// assert_eq!(schedule.annotation_action(2), None);
/// assert_eq!(
///     schedule.annotation_action(3),
///     Some(Action::Store { block: 3, tier: StorageTier::Fast })
/// );
/// ```
#[derive(Clone, Copy, Debug)]
pub struct PeriodicSchedule {
    period: usize,
    tier: StorageTier,
}

impl PeriodicSchedule {
    /// Creates a schedule storing to the fast tier.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::InvalidSchedule`] if `period` is zero.
    pub fn new(period: usize) -> CheckpointResult<Self> {
        if period == 0 {
            return Err(CheckpointError::InvalidSchedule {
                message: "period must be at least 1".to_string(),
            });
        }
        Ok(Self {
            period,
            tier: StorageTier::Fast,
        })
    }

    /// Chooses the period so that the snapshots fit in `budget`.
    pub fn from_budget(
        budget: &MemoryBudget,
        n_blocks: usize,
        snapshot_bytes: usize,
    ) -> CheckpointResult<Self> {
        Self::new(budget.recommended_period(n_blocks, snapshot_bytes))
    }

    /// Sets the tier snapshots are stored in.
    pub fn with_tier(mut self, tier: StorageTier) -> Self {
        self.tier = tier;
        self
    }

    /// Blocks between snapshots.
    #[inline]
    pub fn period(&self) -> usize {
        self.period
    }
}

impl CheckpointSchedule for PeriodicSchedule {
    fn name(&self) -> &'static str {
        "periodic"
    }

    fn annotation_action(&self, block: usize) -> Option<Action> {
        (block > 0 && block % self.period == 0).then_some(Action::Store {
            block,
            tier: self.tier,
        })
    }

    fn reverse_plan(
        &self,
        n_blocks: usize,
        stored: &BTreeMap<usize, StorageTier>,
    ) -> CheckpointResult<Vec<Action>> {
        let mut actions = Vec::new();
        let starts: Vec<usize> = (0..n_blocks).step_by(self.period).collect();
        for &start in starts.iter().rev() {
            let end = (start + self.period).min(n_blocks);
            push_segment(&mut actions, stored, start, end);
        }
        actions.push(Action::End);
        Ok(actions)
    }
}
