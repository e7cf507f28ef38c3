//! `X ← 0`.

use super::{AdjointAction, Equation, EquationCore, TangentLinearMap};
use crate::error::{EquationError, EquationResult};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Zeroes its solutions.
///
/// The derivative action on a solution is the identity; nothing else
/// contributes and there is never a tangent-linear contribution.
#[derive(Clone, Debug)]
pub struct NullSolver {
    core: EquationCore,
}

impl NullSolver {
    /// Creates a solver zeroing `x`.
    pub fn new(x: &Variable) -> EquationResult<Self> {
        Self::from_refs(vec![VariableRef::from(x)])
    }

    /// Creates a solver zeroing every variable in `xs`.
    pub fn for_many(xs: &[Variable]) -> EquationResult<Self> {
        Self::from_refs(xs.iter().map(VariableRef::from).collect())
    }

    pub(crate) fn from_refs(xs: Vec<VariableRef>) -> EquationResult<Self> {
        if xs.is_empty() {
            return Err(EquationError::InvalidDefinition {
                message: "null solver requires at least one solution".to_string(),
            });
        }
        let core = EquationCore::new(&xs, xs.clone(), Some(&[]))?;
        Ok(Self { core })
    }
}

impl Equation for NullSolver {
    fn kind(&self) -> &'static str {
        "Null"
    }

    fn core(&self) -> &EquationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationCore {
        &mut self.core
    }

    fn forward_solve(&mut self, x: &[Variable], _deps: Option<&[Variable]>) -> EquationResult<()> {
        x.iter().for_each(Variable::zero);
        Ok(())
    }

    fn adjoint_derivative_action(
        &mut self,
        _nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        Ok(adj_x
            .get(dep_index)
            .map_or(AdjointAction::None, |a| AdjointAction::Value(a.clone())))
    }

    fn adjoint_jacobian_solve(
        &mut self,
        _nl_deps: &[Variable],
        b: Vec<Variable>,
    ) -> EquationResult<Vec<Variable>> {
        Ok(b)
    }

    fn tangent_linear(
        &self,
        m: &[VariableId],
        _dm: &[Variable],
        _tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_zeroes() {
        let x = Variable::with_values("x", vec![1.0, 2.0]);
        let mut eq = NullSolver::new(&x).unwrap();
        eq.solve_in_place().unwrap();
        assert_eq!(x.to_vec(), vec![0.0, 0.0]);
        assert_eq!(eq.core().checkpoint_ic(), &[true]);
    }

    #[test]
    fn test_adjoint_action_identity_on_solution() {
        let x = Variable::new("x", 1);
        let mut eq = NullSolver::new(&x).unwrap();
        let adj = Variable::scalar("adj_x", 2.5);
        match eq.adjoint_derivative_action(&[], 0, std::slice::from_ref(&adj)).unwrap() {
            AdjointAction::Value(v) => assert_eq!(v.value(), 2.5),
            other => panic!("unexpected action {:?}", other),
        }
        assert!(eq
            .adjoint_derivative_action(&[], 1, std::slice::from_ref(&adj))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_no_tangent_linear() {
        let x = Variable::new("x", 1);
        let eq = NullSolver::new(&x).unwrap();
        let mut map = TangentLinearMap::new();
        assert!(eq.tangent_linear(&[], &[], &mut map).unwrap().is_none());
        assert!(eq.tangent_linear(&[x.id()], &[x.new_like()], &mut map).is_err());
    }

    #[test]
    fn test_many_solutions() {
        let a = Variable::scalar("a", 1.0);
        let b = Variable::scalar("b", 2.0);
        let mut eq = NullSolver::for_many(&[a.clone(), b.clone()]).unwrap();
        eq.solve_in_place().unwrap();
        assert_eq!(a.value() + b.value(), 0.0);
        assert!(NullSolver::for_many(&[]).is_err());
    }
}
