//! Scalar reductions: sums and inner products.

use super::{
    dep_at, single, AdjointAction, DependencyList, Equation, EquationCore, TangentLinearMap,
};
use crate::error::{EquationError, EquationResult};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

fn require_scalar(x: &VariableRef) -> EquationResult<()> {
    if x.len() != 1 {
        return Err(EquationError::DimensionMismatch {
            expected: 1,
            found: x.len(),
        });
    }
    Ok(())
}

// ================================================================
// Sum
// ================================================================

/// `x ← Σᵢ y[i]` for a scalar `x`.
#[derive(Clone, Debug)]
pub struct SumSolver {
    core: EquationCore,
}

impl SumSolver {
    /// Creates `x ← sum(y)`.
    pub fn new(x: &Variable, y: &Variable) -> EquationResult<Self> {
        Self::from_refs(VariableRef::from(x), VariableRef::from(y))
    }

    pub(crate) fn from_refs(x: VariableRef, y: VariableRef) -> EquationResult<Self> {
        require_scalar(&x)?;
        if x.id() == y.id() {
            return Err(EquationError::SelfDependency {
                name: x.name().to_string(),
            });
        }
        let core = EquationCore::new(std::slice::from_ref(&x), vec![x.clone(), y], Some(&[]))?;
        Ok(Self { core })
    }
}

impl Equation for SumSolver {
    fn kind(&self) -> &'static str {
        "Sum"
    }

    fn core(&self) -> &EquationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationCore {
        &mut self.core
    }

    fn forward_solve(&mut self, x: &[Variable], deps: Option<&[Variable]>) -> EquationResult<()> {
        let deps = self.core.resolve_deps(deps)?;
        let total = dep_at(&deps, 1)?.sum();
        single(x)?.set_values(&[total])
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
            1 => {
                let y = &self.core.deps()[1];
                let action = Variable::with_values("sum_action", vec![-adj_x.value(); y.len()]);
                AdjointAction::Value(action)
            }
            _ => AdjointAction::None,
        })
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
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        let tau_y = match self.core.tangent_of(1, m, dm, tlm_map) {
            Some(tau_y) => tau_y,
            None => return Ok(None),
        };
        let tau_x = tlm_map.get_or_create(&self.core.deps()[0]);
        let eq = SumSolver::from_refs(VariableRef::from(tau_x), VariableRef::from(tau_y))?;
        Ok(Some(Box::new(eq)))
    }
}

// ================================================================
// Inner product
// ================================================================

/// `x ← Σₖ αₖ (yₖ · zₖ)` for a scalar `x`.
///
/// Every `yₖ` and `zₖ` is a non-linear dependency. `yₖ` and `zₖ` may be
/// the same variable, which gives a squared norm.
///
/// # Example
///
/// ```
/// use adjoint_core::{Equation, InnerProductSolver, Variable};
///
/// let y = Variable::with_values("y", vec![3.0, 4.0]);
/// let j = Variable::new("J", 1);
/// InnerProductSolver::norm_sq(&j, &y).unwrap().solve_in_place().unwrap();
/// assert_eq!(j.value(), 25.0);
/// ```
#[derive(Clone, Debug)]
pub struct InnerProductSolver {
    core: EquationCore,
    terms: Vec<(f64, usize, usize)>,
}

impl InnerProductSolver {
    /// Creates `x ← α (y · z)`.
    pub fn new(x: &Variable, alpha: f64, y: &Variable, z: &Variable) -> EquationResult<Self> {
        Self::from_terms(x, &[(alpha, y, z)])
    }

    /// Creates `x ← y · y`.
    pub fn norm_sq(x: &Variable, y: &Variable) -> EquationResult<Self> {
        Self::new(x, 1.0, y, y)
    }

    /// Creates `x ← Σₖ αₖ (yₖ · zₖ)`.
    pub fn from_terms(x: &Variable, terms: &[(f64, &Variable, &Variable)]) -> EquationResult<Self> {
        let terms = terms
            .iter()
            .map(|&(alpha, y, z)| (alpha, VariableRef::from(y), VariableRef::from(z)))
            .collect();
        Self::from_refs(VariableRef::from(x), terms)
    }

    pub(crate) fn from_refs(
        x: VariableRef,
        terms: Vec<(f64, VariableRef, VariableRef)>,
    ) -> EquationResult<Self> {
        require_scalar(&x)?;
        if terms.is_empty() {
            return Err(EquationError::InvalidDefinition {
                message: "inner product requires at least one term".to_string(),
            });
        }
        let mut deps = DependencyList::new();
        deps.push(x.clone());
        let mut nl = DependencyList::new();
        let mut indexed = Vec::with_capacity(terms.len());
        for (alpha, y, z) in terms {
            if y.id() == x.id() || z.id() == x.id() {
                return Err(EquationError::SelfDependency {
                    name: x.name().to_string(),
                });
            }
            if y.len() != z.len() {
                return Err(EquationError::DimensionMismatch {
                    expected: y.len(),
                    found: z.len(),
                });
            }
            let iy = deps.push(y.clone());
            let iz = deps.push(z.clone());
            nl.push(y);
            nl.push(z);
            indexed.push((alpha, iy, iz));
        }
        let nl = nl.into_vec();
        let core = EquationCore::new(std::slice::from_ref(&x), deps.into_vec(), Some(&nl))?;
        Ok(Self {
            core,
            terms: indexed,
        })
    }

    fn nl_value<'a>(&self, nl_deps: &'a [Variable], dep_index: usize) -> EquationResult<&'a Variable> {
        let position = self
            .core
            .nl_position(dep_index)
            .ok_or(EquationError::DependencyIndex {
                index: dep_index,
                count: nl_deps.len(),
            })?;
        dep_at(nl_deps, position)
    }
}

impl Equation for InnerProductSolver {
    fn kind(&self) -> &'static str {
        "InnerProduct"
    }

    fn core(&self) -> &EquationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationCore {
        &mut self.core
    }

    fn forward_solve(&mut self, x: &[Variable], deps: Option<&[Variable]>) -> EquationResult<()> {
        let deps = self.core.resolve_deps(deps)?;
        let mut total = 0.0;
        for &(alpha, iy, iz) in &self.terms {
            total += alpha * dep_at(&deps, iy)?.inner(dep_at(&deps, iz)?)?;
        }
        single(x)?.set_values(&[total])
    }

    fn adjoint_derivative_action(
        &mut self,
        nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        let lambda = single(adj_x)?.value();
        if dep_index == 0 {
            return Ok(AdjointAction::Value(single(adj_x)?.clone()));
        }
        let dep = match self.core.deps().get(dep_index) {
            Some(dep) => dep,
            None => return Ok(AdjointAction::None),
        };
        let mut action: Option<Vec<f64>> = None;
        for &(alpha, iy, iz) in &self.terms {
            for (this, other) in [(iy, iz), (iz, iy)] {
                if this != dep_index {
                    continue;
                }
                let other = self.nl_value(nl_deps, other)?;
                let acc = action.get_or_insert_with(|| vec![0.0; dep.len()]);
                for (a, &o) in acc.iter_mut().zip(other.values().iter()) {
                    *a -= alpha * lambda * o;
                }
            }
        }
        Ok(match action {
            Some(values) => AdjointAction::Value(Variable::with_values("inner_product_action", values)),
            None => AdjointAction::None,
        })
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
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        let mut terms = Vec::new();
        for &(alpha, iy, iz) in &self.terms {
            let y = &self.core.deps()[iy];
            let z = &self.core.deps()[iz];
            if let Some(tau_y) = self.core.tangent_of(iy, m, dm, tlm_map) {
                terms.push((alpha, VariableRef::from(tau_y), z.clone()));
            }
            if let Some(tau_z) = self.core.tangent_of(iz, m, dm, tlm_map) {
                terms.push((alpha, y.clone(), VariableRef::from(tau_z)));
            }
        }
        if terms.is_empty() {
            return Ok(None);
        }
        let tau_x = tlm_map.get_or_create(&self.core.deps()[0]);
        let eq = InnerProductSolver::from_refs(VariableRef::from(tau_x), terms)?;
        Ok(Some(Box::new(eq)))
    }
}
