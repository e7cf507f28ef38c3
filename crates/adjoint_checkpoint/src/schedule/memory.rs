//! Keep everything.

use std::collections::BTreeMap;

use super::{Action, CheckpointSchedule, StorageTier};
use crate::error::CheckpointResult;

/// Retains every block's non-linear dependency data from annotation, so
/// the reverse sweep never replays.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use adjoint_checkpoint::{Action, CheckpointSchedule, MemorySchedule};
///
/// let plan = MemorySchedule::new().reverse_plan(4, &BTreeMap::new()).unwrap();
/// assert_eq!(plan, vec![Action::Reverse { start: 0, end: 4 }, Action::End]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct MemorySchedule;

impl MemorySchedule {
    /// Creates the schedule.
    pub fn new() -> Self {
        Self
    }
}

impl CheckpointSchedule for MemorySchedule {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn retains_annotation_data(&self) -> bool {
        true
    }

    fn annotation_action(&self, _block: usize) -> Option<Action> {
        None
    }

    fn reverse_plan(
        &self,
        n_blocks: usize,
        _stored: &BTreeMap<usize, StorageTier>,
    ) -> CheckpointResult<Vec<Action>> {
        if n_blocks == 0 {
            return Ok(vec![Action::End]);
        }
        Ok(vec![
            Action::Reverse {
                start: 0,
                end: n_blocks,
            },
            Action::End,
        ])
    }
}
