//! The reverse sweep.

use std::collections::{HashMap, HashSet};

use adjoint_checkpoint::Action;
use adjoint_core::{Equation, Variable, VariableId};
use tracing::{debug, info_span};

use super::replay::{replay_horizon, Replay};
use super::EquationManager;
use crate::error::{AdjointResult, ManagerError};

/// Instrumentation hook for [`EquationManager::compute_gradient_with_callback`].
///
/// Called with `(functional, block, equation, eq, adj_x)` for every equation
/// visited by the reverse sweep, once per functional. `adj_x` is `None` when
/// the equation was pruned.
pub type GradientCallback<'a> =
    dyn FnMut(usize, usize, usize, &dyn Equation, Option<&[Variable]>) + 'a;

/// Per block, per equation: which dependencies carry derivative information
/// from the parameters, or `None` when none does.
type Activity = Vec<Vec<Option<Vec<bool>>>>;

impl EquationManager {
    /// Computes the derivatives of each functional in `js` with respect to
    /// each parameter in `ms`.
    ///
    /// Finalizes the trace first. A functional with several components is
    /// differentiated as the sum of its components. Parameters the
    /// functional does not depend on get zero gradients.
    ///
    /// # Returns
    ///
    /// `result[i][k]` is `dJ_i / dm_k`.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::UnknownFunctional`] if a functional is neither
    ///   computed by the trace nor a parameter
    /// - Checkpoint errors from the schedule or storage
    /// - Equation errors raised while replaying or in the adjoint
    pub fn compute_gradient(
        &mut self,
        js: &[&Variable],
        ms: &[&Variable],
    ) -> AdjointResult<Vec<Vec<Variable>>> {
        self.compute_gradient_with_callback(js, ms, &mut |_, _, _, _, _| {})
    }

    /// [`compute_gradient`](Self::compute_gradient) with an instrumentation
    /// callback.
    pub fn compute_gradient_with_callback(
        &mut self,
        js: &[&Variable],
        ms: &[&Variable],
        callback: &mut GradientCallback<'_>,
    ) -> AdjointResult<Vec<Vec<Variable>>> {
        self.finalize()?;
        let _span = info_span!("compute_gradient", functionals = js.len(), parameters = ms.len())
            .entered();

        let m_ids: Vec<VariableId> = ms.iter().map(|m| m.id()).collect();
        let produced: HashSet<VariableId> = self
            .blocks
            .iter()
            .flatten()
            .flat_map(|eq| eq.core().x_ids())
            .collect();
        if let Some(j) = js
            .iter()
            .find(|j| !produced.contains(&j.id()) && !m_ids.contains(&j.id()))
        {
            return Err(ManagerError::UnknownFunctional {
                name: j.name().to_string(),
            }
            .into());
        }

        let activity = self.forward_activity(&m_ids);
        let mut adjoints: Vec<HashMap<VariableId, Variable>> = js
            .iter()
            .map(|j| {
                let seed = Variable::with_values(j.name(), vec![1.0; j.len()]);
                HashMap::from([(j.id(), seed)])
            })
            .collect();

        let plan = self
            .schedule
            .reverse_plan(self.blocks.len(), self.storage.stored())?;
        debug!(actions = plan.len(), blocks = self.blocks.len(), "Reverse plan");

        let mut replay = Replay::new();
        for (index, action) in plan.iter().enumerate() {
            match *action {
                Action::Load { block: 0 } => replay.load(&self.origin),
                Action::Load { block } => replay.load(&self.storage.load(block)?),
                Action::Forward {
                    start,
                    end,
                    retain_data,
                } => self.replay_forward(&mut replay, start, end, retain_data)?,
                Action::Store { block, tier } => {
                    let horizon = replay_horizon(&plan, index, block);
                    let snapshot = self.live_in(&replay, block, horizon)?;
                    self.storage.store(snapshot, tier)?;
                }
                Action::Discard { block } => {
                    self.storage.discard(block)?;
                }
                Action::Reverse { start, end } => {
                    for block in (start..end).rev() {
                        self.reverse_block(block, &activity[block], &mut adjoints, callback)?;
                    }
                }
                Action::DiscardData { start, end } => {
                    for block in start..end {
                        self.data.remove(&block);
                    }
                }
                Action::End => break,
            }
        }

        Ok(adjoints
            .into_iter()
            .map(|mut adjoint| {
                ms.iter()
                    .map(|m| adjoint.remove(&m.id()).unwrap_or_else(|| m.new_like()))
                    .collect()
            })
            .collect())
    }

    /// Marks the dependencies reachable from the parameters `m_ids`.
    ///
    /// A solution becomes active when its equation reads an active
    /// dependency and inactive when it is overwritten without one.
    fn forward_activity(&self, m_ids: &[VariableId]) -> Activity {
        let mut active: HashSet<VariableId> = m_ids.iter().copied().collect();
        let mut activity = Vec::with_capacity(self.blocks.len());
        for eqs in &self.blocks {
            let mut flags_in_block = Vec::with_capacity(eqs.len());
            for eq in eqs {
                let core = eq.core();
                let flags: Vec<bool> = core
                    .deps()
                    .iter()
                    .enumerate()
                    .map(|(j, dep)| !core.is_solution_index(j) && active.contains(&dep.id()))
                    .collect();
                if flags.contains(&true) {
                    active.extend(core.x().map(|x| x.id()));
                    flags_in_block.push(Some(flags));
                } else {
                    for x in core.x() {
                        active.remove(&x.id());
                    }
                    flags_in_block.push(None);
                }
            }
            activity.push(flags_in_block);
        }
        activity
    }

    /// Runs the adjoint of every equation in `block`, last first.
    fn reverse_block(
        &mut self,
        block: usize,
        activity: &[Option<Vec<bool>>],
        adjoints: &mut [HashMap<VariableId, Variable>],
        callback: &mut GradientCallback<'_>,
    ) -> AdjointResult<()> {
        let data = self
            .data
            .get(&block)
            .ok_or(ManagerError::MissingData { block })?;
        for (index, eq) in self.blocks[block].iter_mut().enumerate().rev() {
            let nl_deps = data
                .get(index)
                .ok_or(ManagerError::MissingData { block })?;
            for (functional, adjoint) in adjoints.iter_mut().enumerate() {
                let Some(flags) = activity[index].as_ref() else {
                    callback(functional, block, index, eq.as_ref(), None);
                    continue;
                };
                if !eq.core().x().any(|x| adjoint.contains_key(&x.id())) {
                    callback(functional, block, index, eq.as_ref(), None);
                    continue;
                }

                let b: Vec<Variable> = eq
                    .core()
                    .x()
                    .map(|x| adjoint.remove(&x.id()).unwrap_or_else(|| x.new_like()))
                    .collect();
                let adj_x = eq.adjoint_jacobian_solve(nl_deps, b)?;
                for j in (0..flags.len()).filter(|&j| flags[j]) {
                    let action = eq.adjoint_derivative_action(nl_deps, j, &adj_x)?;
                    if action.is_none() {
                        continue;
                    }
                    let dep = &eq.core().deps()[j];
                    let target = adjoint.entry(dep.id()).or_insert_with(|| dep.new_like());
                    action.subtract_from(target)?;
                }
                callback(functional, block, index, eq.as_ref(), Some(&adj_x));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::error::AdjointError;
    use adjoint_checkpoint::{BinomialSchedule, PeriodicSchedule};
    use adjoint_core::{InnerProductSolver, LinearCombinationSolver};

    /// `J = |2 * 3 m|^2` over three blocks.
    fn record(manager: &mut EquationManager, m: &Variable) -> Variable {
        let u1 = Variable::new("u1", 2);
        let u2 = Variable::new("u2", 2);
        let j = Variable::new("j", 1);
        manager.start().unwrap();
        manager.solve(LinearCombinationSolver::scale(&u1, 3.0, m).unwrap()).unwrap();
        manager.new_block().unwrap();
        manager.solve(LinearCombinationSolver::scale(&u2, 2.0, &u1).unwrap()).unwrap();
        manager.new_block().unwrap();
        manager.solve(InnerProductSolver::norm_sq(&j, &u2).unwrap()).unwrap();
        manager.stop();
        j
    }

    // ========================================
    // Gradients
    // ========================================

    #[test]
    fn test_gradient_memory_schedule() {
        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let mut manager = EquationManager::new();
        let j = record(&mut manager, &m);
        assert_eq!(j.value(), 180.0);
        let dj = manager.compute_gradient(&[&j], &[&m]).unwrap();
        assert_eq!(dj[0][0].to_vec(), vec![72.0, 144.0]);
    }

    #[test]
    fn test_gradient_checkpointed_schedules_agree() {
        let schedules: Vec<Box<dyn adjoint_checkpoint::CheckpointSchedule>> = vec![
            Box::new(PeriodicSchedule::new(1).unwrap()),
            Box::new(BinomialSchedule::new(3, 1, 0).unwrap()),
            Box::new(BinomialSchedule::new(3, 0, 0).unwrap()),
        ];
        for schedule in schedules {
            let m = Variable::with_values("m", vec![1.0, 2.0]);
            let mut manager = EquationManager::with_schedule(ManagerConfig::default(), schedule);
            let j = record(&mut manager, &m);
            let dj = manager.compute_gradient(&[&j], &[&m]).unwrap();
            assert_eq!(dj[0][0].to_vec(), vec![72.0, 144.0]);
        }
    }

    #[test]
    fn test_gradient_repeatable() {
        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let schedule = Box::new(BinomialSchedule::new(3, 1, 0).unwrap());
        let mut manager = EquationManager::with_schedule(ManagerConfig::default(), schedule);
        let j = record(&mut manager, &m);
        let first = manager.compute_gradient(&[&j], &[&m]).unwrap();
        let second = manager.compute_gradient(&[&j], &[&m]).unwrap();
        assert_eq!(first[0][0].to_vec(), second[0][0].to_vec());
    }

    #[test]
    fn test_linear_combination_exact() {
        let a = Variable::scalar("a", 2.0);
        let b = Variable::scalar("b", 4.0);
        let x = Variable::new("x", 1);
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        manager
            .solve(LinearCombinationSolver::new(&x, &[(1.0, &a), (0.5, &b)]).unwrap())
            .unwrap();
        assert_eq!(x.value(), 4.0);
        let dx = manager.compute_gradient(&[&x], &[&a, &b]).unwrap();
        assert_eq!(dx[0][0].value(), 1.0);
        assert_eq!(dx[0][1].value(), 0.5);
    }

    #[test]
    fn test_several_functionals_one_sweep() {
        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let mut manager = EquationManager::new();
        let j = record(&mut manager, &m);
        let k = Variable::new("k", 1);
        // Recorded after the trace was closed: not part of it.
        assert!(matches!(
            manager.compute_gradient(&[&j, &k], &[&m]),
            Err(AdjointError::Manager(ManagerError::UnknownFunctional { .. }))
        ));

        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let u = Variable::new("u", 2);
        let s = Variable::new("s", 1);
        let q = Variable::new("q", 1);
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        manager.solve(LinearCombinationSolver::scale(&u, 2.0, &m).unwrap()).unwrap();
        manager.solve(adjoint_core::SumSolver::new(&s, &u).unwrap()).unwrap();
        manager.solve(InnerProductSolver::norm_sq(&q, &u).unwrap()).unwrap();
        let d = manager.compute_gradient(&[&s, &q], &[&m]).unwrap();
        assert_eq!(d[0][0].to_vec(), vec![2.0, 2.0]);
        assert_eq!(d[1][0].to_vec(), vec![8.0, 16.0]);
    }

    #[test]
    fn test_parameter_not_reached_has_zero_gradient() {
        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let unused = Variable::with_values("unused", vec![5.0]);
        let mut manager = EquationManager::new();
        let j = record(&mut manager, &m);
        let dj = manager.compute_gradient(&[&j], &[&unused]).unwrap();
        assert_eq!(dj[0][0].to_vec(), vec![0.0]);
    }

    // ========================================
    // Pruning
    // ========================================

    #[test]
    fn test_pruned_equations_reported() {
        let m = Variable::with_values("m", vec![1.0, 2.0]);
        let w = Variable::with_values("w", vec![1.0, 1.0]);
        let u = Variable::new("u", 2);
        let v = Variable::new("v", 2);
        let z = Variable::new("z", 2);
        let j = Variable::new("j", 1);
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        manager.solve(LinearCombinationSolver::scale(&u, 2.0, &m).unwrap()).unwrap();
        // Not reached from m.
        manager.solve(LinearCombinationSolver::scale(&v, 3.0, &w).unwrap()).unwrap();
        // Does not reach j.
        manager.solve(LinearCombinationSolver::scale(&z, 5.0, &u).unwrap()).unwrap();
        manager
            .solve(InnerProductSolver::from_terms(&j, &[(1.0, &u, &u), (1.0, &v, &v)]).unwrap())
            .unwrap();

        let mut visited = Vec::new();
        let dj = manager
            .compute_gradient_with_callback(&[&j], &[&m], &mut |_, _, index, _, adj_x| {
                visited.push((index, adj_x.is_some()));
            })
            .unwrap();
        assert_eq!(visited, vec![(3, true), (2, false), (1, false), (0, true)]);
        assert_eq!(dj[0][0].to_vec(), vec![8.0, 16.0]);
    }
}
