//! Tangent-linear propagation, online and offline.

use adjoint_core::{TangentLinearMap, Variable, VariableId};
use tracing::{debug, info_span};

use super::replay::Replay;
use super::{EquationManager, TangentDirection};
use crate::error::{AdjointResult, ManagerError};

fn check_directions(ms: &[&Variable], dms: &[&Variable]) -> AdjointResult<()> {
    if ms.len() != dms.len() {
        return Err(ManagerError::DirectionMismatch {
            parameters: ms.len(),
            directions: dms.len(),
        }
        .into());
    }
    Ok(())
}

impl EquationManager {
    /// Registers the direction `dms` of the parameters `ms`.
    ///
    /// While tangent-linear propagation is enabled, every equation solved
    /// afterwards also solves its tangent-linear equation for this
    /// direction. When annotating, the tangent-linear equations are
    /// recorded too, so they can themselves be differentiated.
    ///
    /// # Returns
    ///
    /// The direction index, for [`tlm_for`](Self::tlm_for).
    ///
    /// # Errors
    ///
    /// [`ManagerError::DirectionMismatch`] if the lists differ in length.
    pub fn add_tlm(&mut self, ms: &[&Variable], dms: &[&Variable]) -> AdjointResult<usize> {
        check_directions(ms, dms)?;
        self.directions.push(TangentDirection {
            m: ms.iter().map(|m| m.id()).collect(),
            dm: dms.iter().map(|&dm| dm.clone()).collect(),
            map: TangentLinearMap::new(),
        });
        let index = self.directions.len() - 1;
        debug!(index, parameters = ms.len(), "Tangent-linear direction registered");
        Ok(index)
    }

    /// Tangent-linear companion of `x` in the first registered direction.
    pub fn tlm(&self, x: &Variable) -> AdjointResult<Variable> {
        self.tlm_for(0, x)
    }

    /// Tangent-linear companion of `x` in direction `index`.
    ///
    /// A parameter's companion is its direction. A variable not reached by
    /// the direction gets a fresh zero companion.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnknownDirection`] if `index` was never registered.
    pub fn tlm_for(&self, index: usize, x: &Variable) -> AdjointResult<Variable> {
        let direction = self
            .directions
            .get(index)
            .ok_or(ManagerError::UnknownDirection { index })?;
        if let Some(i) = direction.m.iter().position(|&id| id == x.id()) {
            return Ok(direction.dm[i].clone());
        }
        Ok(direction
            .map
            .get(x.id())
            .cloned()
            .unwrap_or_else(|| x.tangent_linear()))
    }

    /// Replays the trace from block 0, solving tangent-linear equations
    /// for the direction `dms` of `ms` alongside, and returns the tangents
    /// of `outputs`.
    ///
    /// Finalizes the trace first. Only the block-0 snapshot is needed.
    ///
    /// # Errors
    ///
    /// [`ManagerError::DirectionMismatch`] for mismatched lists; replay and
    /// equation errors otherwise.
    pub fn compute_tangent_linear(
        &mut self,
        ms: &[&Variable],
        dms: &[&Variable],
        outputs: &[&Variable],
    ) -> AdjointResult<Vec<Variable>> {
        check_directions(ms, dms)?;
        self.finalize()?;
        let _span = info_span!("compute_tangent_linear", parameters = ms.len()).entered();

        let m: Vec<VariableId> = ms.iter().map(|m| m.id()).collect();
        let dm: Vec<Variable> = dms.iter().map(|&dm| dm.clone()).collect();
        let mut map = TangentLinearMap::new();
        let mut replay = Replay::new();
        replay.load(&self.origin);

        for eqs in &mut self.blocks {
            for eq in eqs.iter_mut() {
                let deps = replay.resolve_deps(eq.core(), &self.references)?;
                let x: Vec<Variable> = eq
                    .core()
                    .x_indices()
                    .iter()
                    .map(|&j| deps[j].clone())
                    .collect();
                eq.forward_solve(&x, Some(&deps))?;

                let Some(mut tangent) = eq.tangent_linear(&m, &dm, &mut map)? else {
                    for x in eq.core().x() {
                        if let Some(tau) = map.get(x.id()) {
                            tau.zero();
                        }
                    }
                    continue;
                };
                let tangent_deps = tangent
                    .core()
                    .deps()
                    .iter()
                    .map(|dep| -> AdjointResult<Variable> {
                        let id = dep.id();
                        if let Some(tau) = map.companion(id) {
                            return Ok(tau.clone());
                        }
                        if let Some(direction) = dm.iter().find(|d| d.id() == id) {
                            return Ok(direction.clone());
                        }
                        replay
                            .get(dep)
                            .or_else(|| self.references.get(&id).cloned())
                            .ok_or_else(|| {
                                ManagerError::MissingValue {
                                    name: dep.name().to_string(),
                                }
                                .into()
                            })
                    })
                    .collect::<AdjointResult<Vec<_>>>()?;
                let tangent_x: Vec<Variable> = tangent
                    .core()
                    .x_indices()
                    .iter()
                    .map(|&j| tangent_deps[j].clone())
                    .collect();
                tangent.forward_solve(&tangent_x, Some(&tangent_deps))?;
            }
        }

        Ok(outputs
            .iter()
            .map(|output| {
                if let Some(i) = m.iter().position(|&id| id == output.id()) {
                    return dm[i].copy();
                }
                map.get(output.id())
                    .map(Variable::copy)
                    .unwrap_or_else(|| output.tangent_linear())
            })
            .collect())
    }
}
