//! Forward replay of recorded blocks from snapshots.

use std::collections::{HashMap, HashSet};

use adjoint_checkpoint::{Action, Snapshot};
use adjoint_core::{EquationCore, Variable, VariableId, VariableRef};
use tracing::trace;

use super::EquationManager;
use crate::error::{AdjointResult, ManagerError};

/// Values available at the current replay position.
///
/// Snapshot payloads are materialized into variables on first use.
#[derive(Debug, Default)]
pub(super) struct Replay {
    values: HashMap<VariableId, Variable>,
    pending: HashMap<VariableId, Vec<f64>>,
}

impl Replay {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Restarts from `snapshot`, dropping every replayed value.
    pub(super) fn load(&mut self, snapshot: &Snapshot) {
        self.values.clear();
        self.pending = snapshot
            .iter()
            .map(|(id, values)| (id, values.to_vec()))
            .collect();
    }

    fn lookup(&mut self, dep: &VariableRef) -> Option<Variable> {
        let id = dep.id();
        if let Some(value) = self.values.get(&id) {
            return Some(value.clone());
        }
        let payload = self.pending.remove(&id)?;
        let value = Variable::with_values(dep.name(), payload);
        self.values.insert(id, value.clone());
        Some(value)
    }

    /// Current value of `id` without materializing it.
    fn peek(&self, id: VariableId) -> Option<Vec<f64>> {
        self.values
            .get(&id)
            .map(Variable::to_vec)
            .or_else(|| self.pending.get(&id).cloned())
    }

    /// Replayed value of `id`, if it has been computed or loaded.
    pub(super) fn get(&mut self, dep: &VariableRef) -> Option<Variable> {
        self.lookup(dep)
    }

    /// Dependency values for one equation. Solutions not yet known are
    /// created zero-valued; handles of variables that are never
    /// checkpointed come from `references`.
    pub(super) fn resolve_deps(
        &mut self,
        core: &EquationCore,
        references: &HashMap<VariableId, Variable>,
    ) -> AdjointResult<Vec<Variable>> {
        core.deps()
            .iter()
            .enumerate()
            .map(|(j, dep)| -> AdjointResult<Variable> {
                if let Some(value) = self.lookup(dep) {
                    return Ok(value);
                }
                if core.is_solution_index(j) {
                    let value = dep.new_like();
                    self.values.insert(dep.id(), value.clone());
                    return Ok(value);
                }
                references
                    .get(&dep.id())
                    .cloned()
                    .ok_or_else(|| {
                        ManagerError::MissingValue {
                            name: dep.name().to_string(),
                        }
                        .into()
                    })
            })
            .collect()
    }
}

/// One past the last block replayed from a snapshot stored at `block` by
/// `plan[index]`.
///
/// Scans forward until the snapshot is discarded, following the replays
/// made while it is the most recently loaded one. A snapshot stored from
/// that replay position is taken from this one's values, so its own
/// horizon extends this one.
pub(super) fn replay_horizon(plan: &[Action], index: usize, block: usize) -> usize {
    let mut horizon = block;
    let mut active = true;
    for (k, action) in plan.iter().enumerate().skip(index + 1) {
        match *action {
            Action::Load { block: loaded } => active = loaded == block,
            Action::Forward { end, .. } | Action::Reverse { end, .. } if active => {
                horizon = horizon.max(end);
            }
            Action::Store { block: nested, .. } if active && nested != block => {
                horizon = horizon.max(replay_horizon(plan, k, nested));
            }
            Action::Discard { block: discarded } if discarded == block => break,
            _ => {}
        }
    }
    horizon
}

impl EquationManager {
    /// Replays blocks `start..end`, optionally keeping the non-linear
    /// dependency data the reverse sweep needs.
    pub(super) fn replay_forward(
        &mut self,
        replay: &mut Replay,
        start: usize,
        end: usize,
        retain: bool,
    ) -> AdjointResult<()> {
        for block in start..end {
            let mut retained = Vec::new();
            for eq in &mut self.blocks[block] {
                let deps = replay.resolve_deps(eq.core(), &self.references)?;
                let x: Vec<Variable> = eq
                    .core()
                    .x_indices()
                    .iter()
                    .map(|&j| deps[j].clone())
                    .collect();
                eq.forward_solve(&x, Some(&deps))?;
                if retain {
                    retained.push(
                        eq.core()
                            .nl_deps_map()
                            .iter()
                            .map(|&j| deps[j].copy())
                            .collect(),
                    );
                }
            }
            if retain {
                self.data.insert(block, retained);
            }
            trace!(block, retain, "Replayed block");
        }
        Ok(())
    }

    /// Snapshot of the values blocks `block..horizon` read before
    /// producing them, taken from the replay position at `block`.
    pub(super) fn live_in(
        &self,
        replay: &Replay,
        block: usize,
        horizon: usize,
    ) -> AdjointResult<Snapshot> {
        let mut snapshot = Snapshot::new(block);
        let mut seen = HashSet::new();
        for eq in self.blocks[block..horizon].iter().flatten() {
            let core = eq.core();
            for (x, &ic) in core.x().zip(core.checkpoint_ic()) {
                if ic {
                    capture_replayed(x, replay, &mut seen, &mut snapshot)?;
                }
            }
            for (j, dep) in core.deps().iter().enumerate() {
                if !core.is_solution_index(j) {
                    capture_replayed(dep, replay, &mut seen, &mut snapshot)?;
                }
            }
            for x in core.x() {
                // Produced here; later reads replay it.
                seen.insert(x.id());
            }
        }
        Ok(snapshot)
    }
}

fn capture_replayed(
    dep: &VariableRef,
    replay: &Replay,
    seen: &mut HashSet<VariableId>,
    snapshot: &mut Snapshot,
) -> AdjointResult<()> {
    if !dep.flags().checkpointed || !seen.insert(dep.id()) {
        return Ok(());
    }
    let values = replay
        .peek(dep.id())
        .ok_or_else(|| ManagerError::MissingValue {
            name: dep.name().to_string(),
        })?;
    snapshot.insert(dep.id(), values);
    Ok(())
}
