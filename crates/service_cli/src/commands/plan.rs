//! Plan command: print the binomial checkpointing plan as JSON.
//!
//! The annotation pass is simulated to find where snapshots are taken, then
//! the reverse plan over those snapshots is built.

use std::collections::BTreeMap;

use adjoint_checkpoint::{Action, BinomialSchedule, CheckpointSchedule};
use serde::Serialize;

use crate::Result;

/// A complete plan for one forward and reverse pass.
#[derive(Clone, Debug, Serialize)]
pub struct PlanReport {
    /// Schedule name
    pub schedule: &'static str,
    /// Number of blocks
    pub blocks: usize,
    /// Fast-tier slots
    pub snapshots_in_ram: usize,
    /// Slow-tier slots
    pub snapshots_on_disk: usize,
    /// Blocks replayed forward during the reverse pass
    pub replayed_blocks: usize,
    /// Snapshots taken while annotating
    pub annotation: Vec<Action>,
    /// Reverse pass
    pub reverse: Vec<Action>,
}

/// Builds the plan for `blocks` blocks.
pub fn build_plan(blocks: usize, ram: usize, disk: usize) -> Result<PlanReport> {
    let schedule = BinomialSchedule::new(blocks, ram, disk)?;
    let mut stored = BTreeMap::new();
    let mut annotation = Vec::new();
    for block in 1..blocks {
        if let Some(action) = schedule.annotation_action(block) {
            if let Action::Store { block, tier } = action {
                stored.insert(block, tier);
            }
            annotation.push(action);
        }
    }
    let reverse = schedule.reverse_plan(blocks, &stored)?;
    let replayed_blocks = reverse
        .iter()
        .map(|action| match action {
            Action::Forward { start, end, .. } => end - start,
            _ => 0,
        })
        .sum();
    Ok(PlanReport {
        schedule: schedule.name(),
        blocks,
        snapshots_in_ram: ram,
        snapshots_on_disk: disk,
        replayed_blocks,
        annotation,
        reverse,
    })
}

/// Runs the plan command.
pub fn run(blocks: usize, ram: usize, disk: usize) -> Result<()> {
    let report = build_plan(blocks, ram, disk)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_reverses_every_block_once() {
        let report = build_plan(10, 2, 1).unwrap();
        let mut reversed = Vec::new();
        for action in &report.reverse {
            if let Action::Reverse { start, end } = *action {
                reversed.extend((start..end).rev());
            }
        }
        assert_eq!(reversed, (0..10).rev().collect::<Vec<_>>());
        assert!(report.annotation.len() <= 3);
        assert_eq!(report.reverse.last(), Some(&Action::End));
    }

    #[test]
    fn test_no_snapshots_replays_quadratically() {
        let report = build_plan(5, 0, 0).unwrap();
        assert!(report.annotation.is_empty());
        // Every block is replayed from block 0 up to and including itself.
        assert_eq!(report.replayed_blocks, 5 + 4 + 3 + 2 + 1);
    }

    #[test]
    fn test_json_shape() {
        let report = build_plan(4, 1, 0).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["schedule"], "binomial");
        let last = json["reverse"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["action"], "end");
    }

    #[test]
    fn test_zero_blocks_rejected() {
        assert!(build_plan(0, 1, 0).is_err());
    }
}
