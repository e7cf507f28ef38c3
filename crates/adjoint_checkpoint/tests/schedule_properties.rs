//! Property tests: every schedule's plan must be executable.
//!
//! A plan is replayed against a model that tracks the current forward
//! position, the held snapshots and the blocks with retained data.

use std::collections::{BTreeMap, BTreeSet};

use adjoint_checkpoint::{
    Action, BinomialSchedule, CheckpointSchedule, MemorySchedule, PeriodicSchedule, StorageTier,
};
use proptest::prelude::*;

fn annotate(schedule: &dyn CheckpointSchedule, n_blocks: usize) -> BTreeMap<usize, StorageTier> {
    (1..n_blocks)
        .filter_map(|b| schedule.annotation_action(b))
        .map(|a| match a {
            Action::Store { block, tier } => (block, tier),
            other => panic!("annotation emitted {}", other),
        })
        .collect()
}

/// Executes `plan` symbolically and returns the blocks in the order they
/// were reversed.
fn execute(
    schedule: &dyn CheckpointSchedule,
    n_blocks: usize,
    mut stored: BTreeMap<usize, StorageTier>,
) -> Vec<usize> {
    let plan = schedule.reverse_plan(n_blocks, &stored).unwrap();
    let mut position: Option<usize> = None;
    let mut data: BTreeSet<usize> = if schedule.retains_annotation_data() {
        (0..n_blocks).collect()
    } else {
        BTreeSet::new()
    };
    let mut reversed = Vec::new();

    assert_eq!(plan.last(), Some(&Action::End));
    for action in &plan {
        match *action {
            Action::Load { block } => {
                assert!(block == 0 || stored.contains_key(&block), "load({}) not held", block);
                position = Some(block);
            }
            Action::Forward {
                start,
                end,
                retain_data,
            } => {
                assert_eq!(position, Some(start), "forward from wrong position");
                assert!(start < end && end <= n_blocks);
                if retain_data {
                    data.extend(start..end);
                }
                position = Some(end);
            }
            Action::Store { block, tier } => {
                assert_eq!(position, Some(block), "store away from position");
                assert!(block > 0);
                stored.insert(block, tier);
                if let Some(capacity) = schedule.capacity(tier) {
                    let used = stored.values().filter(|&&t| t == tier).count();
                    assert!(used <= capacity, "{} tier over capacity", tier);
                }
            }
            Action::Discard { block } => {
                assert!(stored.remove(&block).is_some(), "discard({}) not held", block);
            }
            Action::Reverse { start, end } => {
                for block in (start..end).rev() {
                    assert!(data.contains(&block), "reverse({}) without data", block);
                    reversed.push(block);
                }
            }
            Action::DiscardData { start, end } => {
                for block in start..end {
                    data.remove(&block);
                }
            }
            Action::End => {}
        }
    }
    reversed
}

fn assert_complete(reversed: &[usize], n_blocks: usize) {
    let expected: Vec<usize> = (0..n_blocks).rev().collect();
    assert_eq!(reversed, expected.as_slice());
}

proptest! {
    #[test]
    fn binomial_plan_is_executable(
        n_blocks in 1usize..60,
        fast in 0usize..5,
        slow in 0usize..4,
    ) {
        let schedule = BinomialSchedule::new(n_blocks, fast, slow).unwrap();
        let stored = annotate(&schedule, n_blocks);
        prop_assert!(stored.len() <= fast + slow);
        let reversed = execute(&schedule, n_blocks, stored);
        assert_complete(&reversed, n_blocks);
    }

    #[test]
    fn binomial_plan_with_fewer_blocks(
        planned in 2usize..40,
        short in 1usize..40,
        fast in 1usize..4,
    ) {
        let n_blocks = short.min(planned);
        let schedule = BinomialSchedule::new(planned, fast, 0).unwrap();
        let stored: BTreeMap<usize, StorageTier> = annotate(&schedule, planned)
            .into_iter()
            .filter(|(b, _)| *b < n_blocks)
            .collect();
        let reversed = execute(&schedule, n_blocks, stored);
        assert_complete(&reversed, n_blocks);
    }

    #[test]
    fn periodic_plan_is_executable(n_blocks in 0usize..50, period in 1usize..8) {
        let schedule = PeriodicSchedule::new(period).unwrap();
        let stored = annotate(&schedule, n_blocks);
        let reversed = execute(&schedule, n_blocks, stored);
        assert_complete(&reversed, n_blocks);
    }

    #[test]
    fn memory_plan_is_executable(n_blocks in 0usize..50) {
        let schedule = MemorySchedule::new();
        let reversed = execute(&schedule, n_blocks, BTreeMap::new());
        assert_complete(&reversed, n_blocks);
    }
}

#[test]
fn binomial_repeat_sweep_starts_from_origin() {
    let schedule = BinomialSchedule::new(10, 2, 1).unwrap();
    let first = schedule.reverse_plan(10, &annotate(&schedule, 10)).unwrap();
    let mut held = annotate(&schedule, 10);
    for action in &first {
        match *action {
            Action::Store { block, tier } => {
                held.insert(block, tier);
            }
            Action::Discard { block } => {
                held.remove(&block);
            }
            _ => {}
        }
    }
    assert!(held.is_empty());
    let reversed = execute(&schedule, 10, held);
    assert_complete(&reversed, 10);
}
