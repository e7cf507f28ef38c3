//! The residual-form equation contract and its built-in variants.
//!
//! An [`Equation`] owns a tuple of solution variables `X` and a tuple of
//! dependencies `deps ⊇ X`. It can be solved forward, asked for the
//! transposed action of its residual derivative on an adjoint, asked to
//! solve its transposed Jacobian system, and asked to derive the equation
//! governing its own tangent-linear companion.
//!
//! # Built-in variants
//!
//! - [`NullSolver`]: `X ← 0`
//! - [`AssignmentSolver`]: `x ← y`
//! - [`LinearCombinationSolver`]: `x ← Σ αᵢ yᵢ` (also scale and axpy)
//! - [`SumSolver`], [`InnerProductSolver`]: scalar reductions
//! - [`LinearSystemSolver`]: `(A + diag(k)) x = Σ αᵢ yᵢ + Σ βⱼ uⱼ ⊙ vⱼ`

mod assignment;
mod base;
mod linear_combination;
mod linear_system;
mod null;
mod reductions;
mod tangent;

use std::fmt;

pub use self::assignment::AssignmentSolver;
pub use self::base::{DependencyList, EquationCore};
pub use self::linear_combination::LinearCombinationSolver;
pub use self::linear_system::{LinearSystemBuilder, LinearSystemSolver};
pub use self::null::NullSolver;
pub use self::reductions::{InnerProductSolver, SumSolver};
pub use self::tangent::TangentLinearMap;

pub(crate) use self::base::{dep_at, single};

use crate::error::EquationResult;
use crate::variable::{Variable, VariableId};

/// Contribution of one dependency to an adjoint right-hand side.
#[derive(Clone, Debug)]
pub enum AdjointAction {
    /// The dependency does not contribute.
    None,
    /// Subtract this value.
    Value(Variable),
    /// Subtract `alpha * value`.
    Scaled(f64, Variable),
}

impl AdjointAction {
    /// Returns `true` for [`AdjointAction::None`].
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, AdjointAction::None)
    }

    /// Subtracts the contribution from `target`.
    pub fn subtract_from(&self, target: &Variable) -> EquationResult<()> {
        match self {
            AdjointAction::None => Ok(()),
            AdjointAction::Value(v) => target.axpy(-1.0, v),
            AdjointAction::Scaled(alpha, v) => target.axpy(-alpha, v),
        }
    }
}

/// Object-safe cloning for boxed equations.
pub trait EquationClone {
    /// Clones into a new box.
    fn clone_box(&self) -> Box<dyn Equation>;
}

impl<T> EquationClone for T
where
    T: Equation + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Equation> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Equation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A residual-form equation over solution and dependency variables.
///
/// Implementations must be deterministic given their dependencies and must
/// overwrite their solutions fully on every forward solve.
pub trait Equation: EquationClone + fmt::Debug {
    /// Short name of the equation kind, used in logs.
    fn kind(&self) -> &'static str;

    /// Shared bookkeeping.
    fn core(&self) -> &EquationCore;

    /// Mutable shared bookkeeping.
    fn core_mut(&mut self) -> &mut EquationCore;

    /// Computes the solutions `x` from the dependencies.
    ///
    /// With `deps = None` the equation's own live dependencies are used;
    /// replaced equations then fail. With explicit `deps`, `x` must be the
    /// entries of `deps` at the solution positions.
    fn forward_solve(&mut self, x: &[Variable], deps: Option<&[Variable]>) -> EquationResult<()>;

    /// Transposed action of `∂F/∂deps[dep_index]` on the adjoint `adj_x`.
    ///
    /// `nl_deps` holds the values of the non-linear dependencies at solve
    /// time. `adj_x` is not modified.
    fn adjoint_derivative_action(
        &mut self,
        nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction>;

    /// Solves the transposed linearised system with right-hand side `b`.
    fn adjoint_jacobian_solve(
        &mut self,
        nl_deps: &[Variable],
        b: Vec<Variable>,
    ) -> EquationResult<Vec<Variable>>;

    /// Derives the equation for the tangent-linear companions of `X` in the
    /// direction `dm` of the parameters `m`.
    ///
    /// Returns `Ok(None)` when the direction does not reach this equation.
    ///
    /// # Errors
    ///
    /// [`EquationError::InvalidTangentLinearParameter`](crate::EquationError::InvalidTangentLinearParameter)
    /// if a solution is among `m`.
    fn tangent_linear(
        &self,
        m: &[VariableId],
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>>;

    /// Clears caches used by the forward solve.
    fn reset_forward_solve(&mut self) {}

    /// Clears caches used by the derivative action.
    fn reset_adjoint_derivative_action(&mut self) {}

    /// Clears caches used by the adjoint Jacobian solve.
    fn reset_adjoint_jacobian_solve(&mut self) {}

    /// Swaps every variable reference for a placeholder and clears caches.
    fn replace(&mut self) {
        self.core_mut().replace();
        self.reset_forward_solve();
        self.reset_adjoint_derivative_action();
        self.reset_adjoint_jacobian_solve();
    }

    /// Solves in place using the equation's own live variables.
    fn solve_in_place(&mut self) -> EquationResult<()> {
        let x = self.core().live_x()?;
        self.forward_solve(&x, None)
    }
}
