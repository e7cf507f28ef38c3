//! Demonstration model: implicit diffusion with linear absorption.
//!
//! ```text
//! (A + diag(m)) u_{n+1} = u_n + dt f,      u_0 = g
//! J(m) = u_N · u_N + α m · m
//! ```
//!
//! `A` is the backward-Euler diffusion operator and `m` the per-point
//! absorption, which is the parameter.

use std::f64::consts::PI;
use std::rc::Rc;

use adjoint_core::math::DenseMatrix;
use adjoint_core::{AssignmentSolver, InnerProductSolver, LinearSystemBuilder, Variable};
use adjoint_engine::{AdjointResult, EquationManager, Functional, TimeFunction, TimeSystem};

use crate::config::ModelConfig;

/// The assembled, parameter-independent parts of the model.
#[derive(Clone, Debug)]
pub struct DiffusionModel {
    config: ModelConfig,
    operator: Rc<DenseMatrix>,
    initial: Variable,
    source: Variable,
}

impl DiffusionModel {
    /// Assembles the operator, initial condition and source.
    pub fn new(config: &ModelConfig) -> Self {
        let n = config.size;
        let r = config.diffusion_number;
        let x = |i: usize| (i + 1) as f64 / (n + 1) as f64;
        let initial = (0..n).map(|i| (PI * x(i)).sin()).collect();
        let source = (0..n).map(|i| x(i) * (1.0 - x(i))).collect();
        Self {
            config: config.clone(),
            operator: Rc::new(DenseMatrix::tridiagonal(n, -r, 1.0 + 2.0 * r, -r)),
            initial: Variable::new_static("g", initial),
            source: Variable::new_static("f", source),
        }
    }

    /// A parameter value to differentiate at.
    pub fn parameter(&self) -> Variable {
        let n = self.config.size;
        let values = (0..n).map(|i| 0.1 + 0.05 * (i as f64 / n as f64)).collect();
        Variable::with_values("m", values)
    }

    /// Number of blocks recorded by [`run`](Self::run).
    #[inline]
    pub fn blocks(&self) -> usize {
        self.config.steps + 2
    }

    /// Runs the model at `m`, one block per timestep, and returns `J`.
    pub fn run(&self, manager: &mut EquationManager, m: &Variable) -> AdjointResult<Variable> {
        let u = TimeFunction::new("u", self.config.size, 2);
        let misfit = Variable::new("misfit", 1);

        let mut system = TimeSystem::new();
        system.add_initial(AssignmentSolver::new(&u[0], &self.initial)?)?;
        system.add_timestep(
            LinearSystemBuilder::new(self.operator.clone())
                .with_coefficient(m)
                .with_term(1.0, &u[0])
                .with_term(self.config.dt, &self.source)
                .build(&u[1])?,
        )?;
        system.add_final(InnerProductSolver::norm_sq(&misfit, &u[0])?)?;
        system.add_time_function(u)?;
        system.timestep(manager, self.config.steps)?;
        system.finalise(manager)?;

        let penalty = Variable::new("penalty", 1);
        manager.solve(InnerProductSolver::from_terms(
            &penalty,
            &[(self.config.regularisation, m, m)],
        )?)?;

        let mut functional = Functional::new("J");
        functional.assign(manager, &misfit)?;
        functional.addto(manager, &penalty)?;
        Ok(functional.variable().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small() -> ModelConfig {
        ModelConfig {
            size: 5,
            steps: 4,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_block_layout() {
        let model = DiffusionModel::new(&small());
        let m = model.parameter();
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        model.run(&mut manager, &m).unwrap();
        manager.finalize().unwrap();
        assert_eq!(manager.block_count(), model.blocks());
    }

    #[test]
    fn test_absorption_decreases_functional() {
        let model = DiffusionModel::new(&small());
        let m = model.parameter();
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        let j = model.run(&mut manager, &m).unwrap();
        manager.stop();
        let dj = manager.compute_gradient(&[&j], &[&m]).unwrap();
        // Absorption damps the solution faster than the penalty grows.
        assert!(dj[0][0].to_vec().iter().all(|&g| g < 0.0));

        let unrecorded = model.run(&mut EquationManager::new(), &m).unwrap();
        assert_relative_eq!(unrecorded.value(), j.value(), max_relative = 1e-14);
    }
}
