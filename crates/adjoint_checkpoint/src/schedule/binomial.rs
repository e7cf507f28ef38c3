//! Binomial (revolve) checkpointing over two storage tiers.

use std::collections::BTreeMap;

use tracing::debug;

use super::revolve::optimal_advance;
use super::{Action, CheckpointSchedule, StorageTier};
use crate::error::{CheckpointError, CheckpointResult};

/// Griewank–Walther binomial schedule for a known number of blocks.
///
/// Snapshots are placed at the optimal-advance positions during
/// annotation, fast tier first. The reverse sweep recurses on the stored
/// snapshots, re-using freed slots to subdivide the remaining segments, and
/// falls back to replaying from the segment start when no slot is left.
/// Every snapshot is discarded by the end of the sweep, so a repeated
/// sweep recomputes from block 0.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::{Action, BinomialSchedule, CheckpointSchedule};
///
/// let schedule = BinomialSchedule::new(10, 2, 0).unwrap();
/// let stores: Vec<usize> = (1..10)
///     .filter_map(|b| schedule.annotation_action(b))
///     .filter_map(|a| match a {
///         Action::Store { block, .. } => Some(block),
///         _ => None,
///     })
///     .collect();
/// assert_eq!(stores.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct BinomialSchedule {
    blocks: usize,
    fast_slots: usize,
    slow_slots: usize,
    spine: Vec<usize>,
}

impl BinomialSchedule {
    /// Creates a schedule for `blocks` blocks.
    ///
    /// # Arguments
    ///
    /// * `blocks` - Number of blocks that will be annotated
    /// * `fast_slots` - Snapshots held in memory
    /// * `slow_slots` - Snapshots held on disk
    ///
    /// # Errors
    ///
    /// [`CheckpointError::InvalidSchedule`] if `blocks` is zero.
    pub fn new(blocks: usize, fast_slots: usize, slow_slots: usize) -> CheckpointResult<Self> {
        if blocks == 0 {
            return Err(CheckpointError::InvalidSchedule {
                message: "binomial schedule needs at least one block".to_string(),
            });
        }
        let mut spine = Vec::new();
        let mut start = 0;
        let mut free = fast_slots + slow_slots;
        while free > 0 && blocks - start > 1 {
            start += optimal_advance(blocks - start, free);
            spine.push(start);
            free -= 1;
        }
        debug!(blocks, fast_slots, slow_slots, ?spine, "Binomial annotation snapshots");
        Ok(Self {
            blocks,
            fast_slots,
            slow_slots,
            spine,
        })
    }

    /// Number of blocks the schedule was built for.
    #[inline]
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Blocks snapshotted during annotation, in order.
    pub fn annotation_snapshots(&self) -> &[usize] {
        &self.spine
    }
}

impl CheckpointSchedule for BinomialSchedule {
    fn name(&self) -> &'static str {
        "binomial"
    }

    fn annotation_action(&self, block: usize) -> Option<Action> {
        let index = self.spine.iter().position(|&b| b == block)?;
        let tier = if index < self.fast_slots {
            StorageTier::Fast
        } else {
            StorageTier::Slow
        };
        Some(Action::Store { block, tier })
    }

    fn max_blocks(&self) -> Option<usize> {
        Some(self.blocks)
    }

    fn capacity(&self, tier: StorageTier) -> Option<usize> {
        match tier {
            StorageTier::Fast => Some(self.fast_slots),
            StorageTier::Slow => Some(self.slow_slots),
        }
    }

    fn reverse_plan(
        &self,
        n_blocks: usize,
        stored: &BTreeMap<usize, StorageTier>,
    ) -> CheckpointResult<Vec<Action>> {
        if n_blocks > self.blocks {
            return Err(CheckpointError::BlockCountExceeded {
                block: n_blocks - 1,
                max: self.blocks,
            });
        }
        if n_blocks == 0 {
            return Ok(vec![Action::End]);
        }
        let used = |tier: StorageTier| stored.values().filter(|&&t| t == tier).count();
        let mut planner = Planner {
            stored: stored.clone(),
            fast_free: self.fast_slots.saturating_sub(used(StorageTier::Fast)),
            slow_free: self.slow_slots.saturating_sub(used(StorageTier::Slow)),
            actions: Vec::new(),
        };
        planner.reverse(0, n_blocks);
        planner.actions.push(Action::End);
        Ok(planner.actions)
    }
}

struct Planner {
    stored: BTreeMap<usize, StorageTier>,
    fast_free: usize,
    slow_free: usize,
    actions: Vec<Action>,
}

impl Planner {
    fn take_slot(&mut self) -> Option<StorageTier> {
        if self.fast_free > 0 {
            self.fast_free -= 1;
            Some(StorageTier::Fast)
        } else if self.slow_free > 0 {
            self.slow_free -= 1;
            Some(StorageTier::Slow)
        } else {
            None
        }
    }

    fn release_slot(&mut self, block: usize) {
        match self.stored.remove(&block) {
            Some(StorageTier::Fast) => self.fast_free += 1,
            Some(StorageTier::Slow) => self.slow_free += 1,
            None => {}
        }
        self.actions.push(Action::Discard { block });
    }

    /// Reverses `start..end`, assuming the state at `start` is loadable.
    fn reverse(&mut self, start: usize, end: usize) {
        if end - start == 1 {
            self.reverse_single(start, start);
            return;
        }

        let existing = self.stored.range(start + 1..end).next().map(|(&b, _)| b);
        let mid = match existing {
            Some(mid) => mid,
            None => {
                let free = self.fast_free + self.slow_free;
                let Some(tier) = self.take_slot() else {
                    self.reverse_by_replay(start, end);
                    return;
                };
                let mid = start + optimal_advance(end - start, free);
                self.actions.push(Action::Load { block: start });
                self.actions.push(Action::Forward {
                    start,
                    end: mid,
                    retain_data: false,
                });
                self.actions.push(Action::Store { block: mid, tier });
                self.stored.insert(mid, tier);
                mid
            }
        };

        self.reverse(mid, end);
        self.release_slot(mid);
        self.reverse(start, mid);
    }

    /// Reverses `start..end` without snapshots, replaying from `start` for
    /// every block.
    fn reverse_by_replay(&mut self, start: usize, end: usize) {
        for block in (start..end).rev() {
            self.reverse_single(start, block);
        }
    }

    fn reverse_single(&mut self, from: usize, block: usize) {
        self.actions.push(Action::Load { block: from });
        if block > from {
            self.actions.push(Action::Forward {
                start: from,
                end: block,
                retain_data: false,
            });
        }
        self.actions.push(Action::Forward {
            start: block,
            end: block + 1,
            retain_data: true,
        });
        self.actions.push(Action::Reverse {
            start: block,
            end: block + 1,
        });
        self.actions.push(Action::DiscardData {
            start: block,
            end: block + 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate(schedule: &BinomialSchedule) -> BTreeMap<usize, StorageTier> {
        (1..schedule.blocks())
            .filter_map(|b| schedule.annotation_action(b))
            .filter_map(|a| match a {
                Action::Store { block, tier } => Some((block, tier)),
                _ => None,
            })
            .collect()
    }

    fn reversed_blocks(plan: &[Action]) -> Vec<usize> {
        plan.iter()
            .filter_map(|a| match a {
                Action::Reverse { start, end } => Some((*start..*end).rev().collect::<Vec<_>>()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_zero_blocks_rejected() {
        assert!(BinomialSchedule::new(0, 1, 0).is_err());
    }

    #[test]
    fn test_spine_tiers() {
        let schedule = BinomialSchedule::new(20, 1, 2).unwrap();
        let stored = annotate(&schedule);
        assert_eq!(stored.len(), 3);
        let tiers: Vec<StorageTier> = stored.values().copied().collect();
        assert_eq!(
            tiers,
            vec![StorageTier::Fast, StorageTier::Slow, StorageTier::Slow]
        );
    }

    #[test]
    fn test_plan_reverses_every_block_once() {
        for (blocks, slots) in [(1, 0), (5, 0), (10, 2), (17, 3), (30, 1)] {
            let schedule = BinomialSchedule::new(blocks, slots, 0).unwrap();
            let plan = schedule.reverse_plan(blocks, &annotate(&schedule)).unwrap();
            let expected: Vec<usize> = (0..blocks).rev().collect();
            assert_eq!(reversed_blocks(&plan), expected, "blocks={}", blocks);
            assert_eq!(plan.last(), Some(&Action::End));
        }
    }

    #[test]
    fn test_plan_discards_every_snapshot() {
        let schedule = BinomialSchedule::new(12, 2, 1).unwrap();
        let plan = schedule.reverse_plan(12, &annotate(&schedule)).unwrap();
        let stores = plan
            .iter()
            .filter(|a| matches!(a, Action::Store { .. }))
            .count();
        let discards = plan
            .iter()
            .filter(|a| matches!(a, Action::Discard { .. }))
            .count();
        assert_eq!(discards, stores + 3);
    }

    #[test]
    fn test_no_slots_replays_from_origin() {
        let schedule = BinomialSchedule::new(3, 0, 0).unwrap();
        let plan = schedule.reverse_plan(3, &BTreeMap::new()).unwrap();
        assert_eq!(plan[0], Action::Load { block: 0 });
        assert_eq!(
            plan[1],
            Action::Forward {
                start: 0,
                end: 2,
                retain_data: false
            }
        );
        let forward_blocks: usize = plan
            .iter()
            .filter_map(|a| match a {
                Action::Forward { start, end, .. } => Some(end - start),
                _ => None,
            })
            .sum();
        assert_eq!(forward_blocks, 6);
    }

    #[test]
    fn test_too_many_blocks() {
        let schedule = BinomialSchedule::new(4, 1, 0).unwrap();
        assert!(matches!(
            schedule.reverse_plan(5, &BTreeMap::new()),
            Err(CheckpointError::BlockCountExceeded { max: 4, .. })
        ));
    }
}
