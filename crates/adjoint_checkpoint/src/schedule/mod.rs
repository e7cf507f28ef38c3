//! Checkpoint schedules.
//!
//! A schedule decides which block boundaries are snapshotted while the
//! forward model is annotated, and turns the set of snapshots available at
//! the end of annotation into a stream of [`Action`]s that drives the
//! reverse sweep: loads, forward replays, stores, adjoint sweeps and
//! discards.
//!
//! The snapshot at block 0 is held by the caller for the lifetime of the
//! record and is never stored, discarded or counted against slot
//! capacities. Every schedule may [`Action::Load`] it.
//!
//! # Key Components
//!
//! - [`MemorySchedule`]: keeps every block's data from annotation
//! - [`PeriodicSchedule`]: snapshot every `period` blocks
//! - [`BinomialSchedule`]: Griewank–Walther optimal checkpointing over a
//!   fast and a slow tier

mod binomial;
mod memory;
mod periodic;
pub mod revolve;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CheckpointResult;

pub use binomial::BinomialSchedule;
pub use memory::MemorySchedule;
pub use periodic::PeriodicSchedule;

/// Storage tier for a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// In-memory storage.
    #[default]
    Fast,
    /// Out-of-core storage.
    Slow,
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTier::Fast => write!(f, "fast"),
            StorageTier::Slow => write!(f, "slow"),
        }
    }
}

/// One step of a checkpointing plan.
///
/// Block ranges are half-open: `start..end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Snapshot the state at the start of `block`.
    Store {
        /// Block whose start state is stored
        block: usize,
        /// Destination tier
        tier: StorageTier,
    },
    /// Restore the state at the start of `block`.
    Load {
        /// Block to restore
        block: usize,
    },
    /// Release the snapshot of `block`.
    Discard {
        /// Block to release
        block: usize,
    },
    /// Replay blocks `start..end` forward.
    Forward {
        /// First replayed block
        start: usize,
        /// One past the last replayed block
        end: usize,
        /// Keep the non-linear dependency data needed by the adjoint
        retain_data: bool,
    },
    /// Run the adjoint over blocks `start..end`, last block first.
    Reverse {
        /// First block
        start: usize,
        /// One past the last block
        end: usize,
    },
    /// Drop retained non-linear dependency data for `start..end`.
    DiscardData {
        /// First block
        start: usize,
        /// One past the last block
        end: usize,
    },
    /// The plan is complete.
    End,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Store { block, tier } => write!(f, "store({}, {})", block, tier),
            Action::Load { block } => write!(f, "load({})", block),
            Action::Discard { block } => write!(f, "discard({})", block),
            Action::Forward {
                start,
                end,
                retain_data,
            } => {
                if *retain_data {
                    write!(f, "forward({}..{}, retain)", start, end)
                } else {
                    write!(f, "forward({}..{})", start, end)
                }
            }
            Action::Reverse { start, end } => write!(f, "reverse({}..{})", start, end),
            Action::DiscardData { start, end } => write!(f, "discard_data({}..{})", start, end),
            Action::End => write!(f, "end"),
        }
    }
}

/// Decides where snapshots are taken and how the reverse sweep proceeds.
pub trait CheckpointSchedule: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if non-linear dependency data recorded during
    /// annotation is kept for the reverse sweep.
    fn retains_annotation_data(&self) -> bool {
        false
    }

    /// Action to take when annotation reaches the start of `block`.
    ///
    /// Only [`Action::Store`] or `None` are returned. Never called for
    /// block 0.
    fn annotation_action(&self, block: usize) -> Option<Action>;

    /// Maximum number of blocks, if bounded.
    fn max_blocks(&self) -> Option<usize> {
        None
    }

    /// Maximum number of snapshots held in `tier`, if bounded.
    fn capacity(&self, _tier: StorageTier) -> Option<usize> {
        None
    }

    /// Plans a complete reverse sweep over `n_blocks` blocks.
    ///
    /// # Arguments
    ///
    /// * `n_blocks` - Number of annotated blocks
    /// * `stored` - Snapshots currently held, excluding block 0
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`](crate::CheckpointError) when the plan
    /// cannot be built from the stored snapshots.
    fn reverse_plan(
        &self,
        n_blocks: usize,
        stored: &BTreeMap<usize, StorageTier>,
    ) -> CheckpointResult<Vec<Action>>;
}

/// Appends replay-and-reverse of the single segment `start..end`, replaying
/// from the nearest snapshot at or before `start`.
pub(crate) fn push_segment(
    actions: &mut Vec<Action>,
    stored: &BTreeMap<usize, StorageTier>,
    start: usize,
    end: usize,
) {
    let from = stored
        .range(..=start)
        .next_back()
        .map(|(&b, _)| b)
        .unwrap_or(0);
    actions.push(Action::Load { block: from });
    if from < start {
        actions.push(Action::Forward {
            start: from,
            end: start,
            retain_data: false,
        });
    }
    actions.push(Action::Forward {
        start,
        end,
        retain_data: true,
    });
    actions.push(Action::Reverse { start, end });
    actions.push(Action::DiscardData { start, end });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        let actions = [
            Action::Store {
                block: 4,
                tier: StorageTier::Slow,
            },
            Action::Forward {
                start: 0,
                end: 4,
                retain_data: false,
            },
            Action::Forward {
                start: 4,
                end: 5,
                retain_data: true,
            },
            Action::End,
        ];
        let text: Vec<String> = actions.iter().map(Action::to_string).collect();
        assert_eq!(
            text,
            vec!["store(4, slow)", "forward(0..4)", "forward(4..5, retain)", "end"]
        );
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&Action::Load { block: 3 }).unwrap();
        assert_eq!(json, r#"{"action":"load","block":3}"#);
        let tier: StorageTier = serde_json::from_str(r#""slow""#).unwrap();
        assert_eq!(tier, StorageTier::Slow);
    }

    #[test]
    fn test_push_segment_replays_from_nearest_snapshot() {
        let mut stored = BTreeMap::new();
        stored.insert(2, StorageTier::Fast);
        let mut actions = Vec::new();
        push_segment(&mut actions, &stored, 4, 6);
        assert_eq!(actions[0], Action::Load { block: 2 });
        assert_eq!(
            actions[1],
            Action::Forward {
                start: 2,
                end: 4,
                retain_data: false
            }
        );
        assert_eq!(actions.len(), 5);
    }
}
