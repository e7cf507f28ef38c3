//! `x ← Σ αᵢ yᵢ`.

use super::{
    dep_at, single, AdjointAction, DependencyList, Equation, EquationCore, TangentLinearMap,
};
use crate::constraint::{apply_constraints, DirichletConstraint};
use crate::error::{EquationError, EquationResult};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Weighted sum of dependencies, followed by boundary constraints.
///
/// Covers scaling (`x ← α y`) and axpy (`x ← x_old + α y`) as special
/// cases. Repeated terms on the same variable are kept separately in the
/// forward sum and combined in the derivative action.
///
/// # Example
///
/// ```
/// use adjoint_core::{Equation, LinearCombinationSolver, Variable};
///
/// let a = Variable::scalar("a", 2.0);
/// let b = Variable::scalar("b", 4.0);
/// let x = Variable::new("x", 1);
/// let mut eq = LinearCombinationSolver::new(&x, &[(1.0, &a), (0.5, &b)]).unwrap();
/// eq.solve_in_place().unwrap();
/// assert_eq!(x.value(), 4.0);
/// ```
#[derive(Clone, Debug)]
pub struct LinearCombinationSolver {
    core: EquationCore,
    terms: Vec<(f64, usize)>,
    constraints: Vec<DirichletConstraint>,
    homogeneous: Vec<DirichletConstraint>,
}

impl LinearCombinationSolver {
    /// Creates `x ← Σ αᵢ yᵢ` from `(αᵢ, yᵢ)` pairs.
    ///
    /// # Errors
    ///
    /// [`EquationError::SelfDependency`] if `x` appears among the terms.
    pub fn new(x: &Variable, terms: &[(f64, &Variable)]) -> EquationResult<Self> {
        let terms = terms
            .iter()
            .map(|&(alpha, y)| (alpha, VariableRef::from(y)))
            .collect();
        Self::from_refs(VariableRef::from(x), terms)
    }

    /// Creates `x ← α y`.
    pub fn scale(x: &Variable, alpha: f64, y: &Variable) -> EquationResult<Self> {
        Self::new(x, &[(alpha, y)])
    }

    /// Creates `x_new ← x_old + α y`.
    pub fn axpy(x_new: &Variable, x_old: &Variable, alpha: f64, y: &Variable) -> EquationResult<Self> {
        Self::new(x_new, &[(1.0, x_old), (alpha, y)])
    }

    pub(crate) fn from_refs(x: VariableRef, terms: Vec<(f64, VariableRef)>) -> EquationResult<Self> {
        let mut deps = DependencyList::new();
        deps.push(x.clone());
        let mut indexed = Vec::with_capacity(terms.len());
        for (alpha, y) in terms {
            if y.id() == x.id() {
                return Err(EquationError::SelfDependency {
                    name: x.name().to_string(),
                });
            }
            if y.len() != x.len() {
                return Err(EquationError::DimensionMismatch {
                    expected: x.len(),
                    found: y.len(),
                });
            }
            indexed.push((alpha, deps.push(y)));
        }
        let core = EquationCore::new(std::slice::from_ref(&x), deps.into_vec(), Some(&[]))?;
        Ok(Self {
            core,
            terms: indexed,
            constraints: Vec::new(),
            homogeneous: Vec::new(),
        })
    }

    /// Adds boundary constraints applied after the sum.
    pub fn with_constraints(mut self, constraints: Vec<DirichletConstraint>) -> Self {
        self.homogeneous = constraints.iter().map(DirichletConstraint::homogenized).collect();
        self.constraints = constraints;
        self
    }

    /// Coefficients, in term order.
    pub fn coefficients(&self) -> Vec<f64> {
        self.terms.iter().map(|&(alpha, _)| alpha).collect()
    }
}

impl Equation for LinearCombinationSolver {
    fn kind(&self) -> &'static str {
        "LinearCombination"
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
        x.zero();
        for &(alpha, j) in &self.terms {
            x.axpy(alpha, dep_at(&deps, j)?)?;
        }
        apply_constraints(&self.constraints, x)
    }

    fn adjoint_derivative_action(
        &mut self,
        _nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        let adj_x = single(adj_x)?;
        if dep_index == 0 {
            return Ok(AdjointAction::Value(adj_x.clone()));
        }
        let mut matched = false;
        let mut alpha = 0.0;
        for &(a, j) in &self.terms {
            if j == dep_index {
                matched = true;
                alpha += a;
            }
        }
        Ok(if matched {
            AdjointAction::Scaled(-alpha, adj_x.clone())
        } else {
            AdjointAction::None
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
        let terms: Vec<(f64, VariableRef)> = self
            .terms
            .iter()
            .filter_map(|&(alpha, j)| {
                self.core
                    .tangent_of(j, m, dm, tlm_map)
                    .map(|tau| (alpha, VariableRef::from(tau)))
            })
            .collect();
        if terms.is_empty() {
            return Ok(None);
        }
        let tau_x = tlm_map.get_or_create(&self.core.deps()[0]);
        let eq = LinearCombinationSolver::from_refs(VariableRef::from(tau_x), terms)?
            .with_constraints(self.homogeneous.clone());
        Ok(Some(Box::new(eq)))
    }
}
