//! `x ← y`.

use super::{dep_at, single, AdjointAction, Equation, EquationCore, TangentLinearMap};
use crate::constraint::{apply_constraints, DirichletConstraint};
use crate::error::{EquationError, EquationResult};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Copies `y` into `x`, then applies boundary constraints.
///
/// # Example
///
/// ```
/// use adjoint_core::{AssignmentSolver, Equation, Variable};
///
/// let y = Variable::with_values("y", vec![1.0, 2.0]);
/// let x = Variable::new("x", 2);
/// AssignmentSolver::new(&x, &y).unwrap().solve_in_place().unwrap();
/// assert_eq!(x.to_vec(), vec![1.0, 2.0]);
/// ```
#[derive(Clone, Debug)]
pub struct AssignmentSolver {
    core: EquationCore,
    constraints: Vec<DirichletConstraint>,
    homogeneous: Vec<DirichletConstraint>,
}

impl AssignmentSolver {
    /// Creates `x ← y`.
    ///
    /// # Errors
    ///
    /// [`EquationError::SelfDependency`] if `x` and `y` are the same variable.
    pub fn new(x: &Variable, y: &Variable) -> EquationResult<Self> {
        Self::from_refs(VariableRef::from(x), VariableRef::from(y))
    }

    pub(crate) fn from_refs(x: VariableRef, y: VariableRef) -> EquationResult<Self> {
        if x.id() == y.id() {
            return Err(EquationError::SelfDependency {
                name: x.name().to_string(),
            });
        }
        if x.len() != y.len() {
            return Err(EquationError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        let core = EquationCore::new(std::slice::from_ref(&x), vec![x.clone(), y], Some(&[]))?;
        Ok(Self {
            core,
            constraints: Vec::new(),
            homogeneous: Vec::new(),
        })
    }

    /// Adds boundary constraints applied after the copy.
    pub fn with_constraints(mut self, constraints: Vec<DirichletConstraint>) -> Self {
        self.homogeneous = constraints.iter().map(DirichletConstraint::homogenized).collect();
        self.constraints = constraints;
        self
    }
}

impl Equation for AssignmentSolver {
    fn kind(&self) -> &'static str {
        "Assignment"
    }

    fn core(&self) -> &EquationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationCore {
        &mut self.core
    }

    fn forward_solve(&mut self, x: &[Variable], deps: Option<&[Variable]>) -> EquationResult<()> {
        let deps = self.core.resolve_deps(deps)?;
        let x = single(x)?;
        x.assign(dep_at(&deps, 1)?)?;
        apply_constraints(&self.constraints, x)
    }

    fn adjoint_derivative_action(
        &mut self,
        _nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        let adj_x = single(adj_x)?;
        Ok(match dep_index {
            0 => AdjointAction::Value(adj_x.clone()),
            1 => AdjointAction::Scaled(-1.0, adj_x.clone()),
            _ => AdjointAction::None,
        })
    }

    fn adjoint_jacobian_solve(
        &mut self,
        _nl_deps: &[Variable],
        b: Vec<Variable>,
    ) -> EquationResult<Vec<Variable>> {
        apply_constraints(&self.homogeneous, single(&b)?)?;
        Ok(b)
    }

    fn tangent_linear(
        &self,
        m: &[VariableId],
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        let tau_y = match self.core.tangent_of(1, m, dm, tlm_map) {
            Some(tau_y) => tau_y,
            None => return Ok(None),
        };
        let tau_x = tlm_map.get_or_create(&self.core.deps()[0]);
        let eq = AssignmentSolver::from_refs(VariableRef::from(tau_x), VariableRef::from(tau_y))?
            .with_constraints(self.homogeneous.clone());
        Ok(Some(Box::new(eq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_assignment_rejected() {
        let x = Variable::new("x", 1);
        assert!(matches!(
            AssignmentSolver::new(&x, &x),
            Err(EquationError::SelfDependency { .. })
        ));
    }

    #[test]
    fn test_forward_with_constraints() {
        let y = Variable::with_values("y", vec![1.0, 2.0, 3.0]);
        let x = Variable::new("x", 3);
        let bc = DirichletConstraint::new(vec![2], vec![9.0]).unwrap();
        let mut eq = AssignmentSolver::new(&x, &y).unwrap().with_constraints(vec![bc]);
        eq.solve_in_place().unwrap();
        assert_eq!(x.to_vec(), vec![1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_adjoint_actions() {
        let y = Variable::new("y", 1);
        let x = Variable::new("x", 1);
        let mut eq = AssignmentSolver::new(&x, &y).unwrap();
        let adj = Variable::scalar("adj_x", 4.0);
        let adj_x = std::slice::from_ref(&adj);

        assert!(matches!(
            eq.adjoint_derivative_action(&[], 0, adj_x).unwrap(),
            AdjointAction::Value(_)
        ));
        match eq.adjoint_derivative_action(&[], 1, adj_x).unwrap() {
            AdjointAction::Scaled(alpha, v) => {
                assert_eq!(alpha, -1.0);
                assert_eq!(v.value(), 4.0);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(adj.state(), 0);
    }

    #[test]
    fn test_adjoint_jacobian_applies_homogeneous_constraints() {
        let y = Variable::new("y", 2);
        let x = Variable::new("x", 2);
        let bc = DirichletConstraint::new(vec![0], vec![5.0]).unwrap();
        let mut eq = AssignmentSolver::new(&x, &y).unwrap().with_constraints(vec![bc]);
        let b = Variable::with_values("b", vec![1.0, 1.0]);
        let adj = eq.adjoint_jacobian_solve(&[], vec![b]).unwrap();
        assert_eq!(adj[0].to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_tangent_linear() {
        let y = Variable::new("y", 1);
        let x = Variable::new("x", 1);
        let eq = AssignmentSolver::new(&x, &y).unwrap();
        let mut map = TangentLinearMap::new();

        assert!(eq.tangent_linear(&[], &[], &mut map).unwrap().is_none());
        assert!(map.is_empty());

        let dy = Variable::scalar("dy", 2.0);
        let mut tlm = eq
            .tangent_linear(&[y.id()], std::slice::from_ref(&dy), &mut map)
            .unwrap()
            .unwrap();
        tlm.solve_in_place().unwrap();
        assert_eq!(map.get(x.id()).unwrap().value(), 2.0);

        assert!(matches!(
            eq.tangent_linear(&[x.id()], std::slice::from_ref(&dy), &mut map),
            Err(EquationError::InvalidTangentLinearParameter { .. })
        ));
    }
}
