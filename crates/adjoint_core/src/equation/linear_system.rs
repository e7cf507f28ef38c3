//! Dense linear systems `(A + diag(k)) x = Σ αᵢ yᵢ + Σ βⱼ uⱼ ⊙ vⱼ`.
//!
//! The operator is a fixed dense matrix `A` plus an optional diagonal
//! coefficient variable `k`. The right-hand side is a sum of scaled
//! dependencies and scaled pointwise products. The LU factorisation is
//! cached against the identity and state of `k`; clones of the equation
//! (including its tangent-linear equation) share the cache.

use std::rc::Rc;

use tracing::debug;

use super::{
    dep_at, single, AdjointAction, DependencyList, Equation, EquationCore, TangentLinearMap,
};
use crate::cache::{shared_cache, SharedCache};
use crate::error::{EquationError, EquationResult};
use crate::math::{DenseMatrix, LuFactorization};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Right-hand side term, by reference.
#[derive(Clone, Debug)]
enum RhsTerm {
    Scaled(f64, VariableRef),
    Product(f64, VariableRef, VariableRef),
}

/// Right-hand side term, by dependency index.
#[derive(Clone, Copy, Debug)]
enum IndexedTerm {
    Scaled(f64, usize),
    Product(f64, usize, usize),
}

/// Builder for [`LinearSystemSolver`].
///
/// # Example
///
/// ```
/// use adjoint_core::math::DenseMatrix;
/// use adjoint_core::{Equation, LinearSystemBuilder, Variable};
///
/// let a = DenseMatrix::from_rows(vec![vec![2.0, 0.0], vec![0.0, 4.0]]).unwrap();
/// let b = Variable::with_values("b", vec![2.0, 2.0]);
/// let x = Variable::new("x", 2);
/// let mut eq = LinearSystemBuilder::new(a).with_term(1.0, &b).build(&x).unwrap();
/// eq.solve_in_place().unwrap();
/// assert_eq!(x.to_vec(), vec![1.0, 0.5]);
/// ```
#[derive(Clone, Debug)]
pub struct LinearSystemBuilder {
    matrix: Rc<DenseMatrix>,
    coefficient: Option<VariableRef>,
    terms: Vec<RhsTerm>,
}

impl LinearSystemBuilder {
    /// Starts a system with operator `matrix`.
    pub fn new(matrix: impl Into<Rc<DenseMatrix>>) -> Self {
        Self {
            matrix: matrix.into(),
            coefficient: None,
            terms: Vec::new(),
        }
    }

    /// Adds `diag(k)` to the operator.
    pub fn with_coefficient(mut self, k: &Variable) -> Self {
        self.coefficient = Some(VariableRef::from(k));
        self
    }

    /// Adds `alpha * y` to the right-hand side.
    pub fn with_term(mut self, alpha: f64, y: &Variable) -> Self {
        self.terms.push(RhsTerm::Scaled(alpha, VariableRef::from(y)));
        self
    }

    /// Adds `beta * (u ⊙ v)` to the right-hand side.
    pub fn with_product(mut self, beta: f64, u: &Variable, v: &Variable) -> Self {
        self.terms
            .push(RhsTerm::Product(beta, VariableRef::from(u), VariableRef::from(v)));
        self
    }

    /// Builds the equation solving for `x`.
    ///
    /// # Errors
    ///
    /// - [`EquationError::SelfDependency`] if `x` is the coefficient or
    ///   appears on the right-hand side
    /// - [`EquationError::DimensionMismatch`] on inconsistent sizes
    pub fn build(self, x: &Variable) -> EquationResult<LinearSystemSolver> {
        LinearSystemSolver::from_parts(
            VariableRef::from(x),
            self.matrix,
            self.coefficient,
            self.terms,
            shared_cache(),
        )
    }
}

/// Solves `(A + diag(k)) x = Σ αᵢ yᵢ + Σ βⱼ uⱼ ⊙ vⱼ`.
///
/// Non-linear dependencies are `k`, `x` when `k` is present, and every
/// product factor.
#[derive(Clone, Debug)]
pub struct LinearSystemSolver {
    core: EquationCore,
    matrix: Rc<DenseMatrix>,
    coefficient: Option<usize>,
    terms: Vec<IndexedTerm>,
    factorization: SharedCache<LuFactorization>,
}

impl LinearSystemSolver {
    fn from_parts(
        x: VariableRef,
        matrix: Rc<DenseMatrix>,
        coefficient: Option<VariableRef>,
        terms: Vec<RhsTerm>,
        factorization: SharedCache<LuFactorization>,
    ) -> EquationResult<Self> {
        let n = x.len();
        if !matrix.is_square() || matrix.rows() != n {
            return Err(EquationError::DimensionMismatch {
                expected: n,
                found: matrix.rows(),
            });
        }
        let check = |v: &VariableRef| -> EquationResult<()> {
            if v.id() == x.id() {
                return Err(EquationError::SelfDependency {
                    name: x.name().to_string(),
                });
            }
            if v.len() != n {
                return Err(EquationError::DimensionMismatch {
                    expected: n,
                    found: v.len(),
                });
            }
            Ok(())
        };

        let mut deps = DependencyList::new();
        let mut nl = DependencyList::new();
        deps.push(x.clone());
        let coefficient = match coefficient {
            Some(k) => {
                check(&k)?;
                nl.push(x.clone());
                nl.push(k.clone());
                Some(deps.push(k))
            }
            None => None,
        };

        let mut indexed = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                RhsTerm::Scaled(alpha, y) => {
                    check(&y)?;
                    indexed.push(IndexedTerm::Scaled(alpha, deps.push(y)));
                }
                RhsTerm::Product(beta, u, v) => {
                    check(&u)?;
                    check(&v)?;
                    nl.push(u.clone());
                    nl.push(v.clone());
                    let iu = deps.push(u);
                    let iv = deps.push(v);
                    indexed.push(IndexedTerm::Product(beta, iu, iv));
                }
            }
        }

        let nl = nl.into_vec();
        let core = EquationCore::new(std::slice::from_ref(&x), deps.into_vec(), Some(&nl))?;
        Ok(Self {
            core,
            matrix,
            coefficient,
            terms: indexed,
            factorization,
        })
    }

    /// The fixed part of the operator.
    #[inline]
    pub fn matrix(&self) -> &DenseMatrix {
        &self.matrix
    }

    /// Factorisation cache hits and misses.
    pub fn cache_stats(&self) -> (usize, usize) {
        let cache = self.factorization.borrow();
        (cache.hits(), cache.misses())
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

    /// Runs `f` with the factorisation of `A + diag(k)`.
    fn with_factorization<R>(
        &self,
        k: Option<&Variable>,
        f: impl FnOnce(&LuFactorization) -> R,
    ) -> EquationResult<R> {
        let mut cache = self.factorization.borrow_mut();
        let sources: Vec<&Variable> = k.into_iter().collect();
        let lu = cache.get_or_try_insert_with(&sources, || {
            debug!(n = self.matrix.rows(), "factorising linear system");
            match k {
                Some(k) => LuFactorization::factor(&self.matrix.with_added_diagonal(&k.values())?),
                None => LuFactorization::factor(&self.matrix),
            }
        })?;
        Ok(f(lu))
    }

    /// `(A + diag(k))^T λ`.
    fn apply_transpose(&self, k: Option<&Variable>, lambda: &Variable) -> Vec<f64> {
        let lambda = lambda.values();
        let mut out = self.matrix.transpose_matvec(&lambda);
        if let Some(k) = k {
            for ((o, &ki), &li) in out.iter_mut().zip(k.values().iter()).zip(lambda.iter()) {
                *o += ki * li;
            }
        }
        out
    }
}

impl Equation for LinearSystemSolver {
    fn kind(&self) -> &'static str {
        "LinearSystem"
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
        let mut rhs = vec![0.0; x.len()];
        for term in &self.terms {
            match *term {
                IndexedTerm::Scaled(alpha, iy) => {
                    let y = dep_at(&deps, iy)?.values();
                    for (r, &yi) in rhs.iter_mut().zip(y.iter()) {
                        *r += alpha * yi;
                    }
                }
                IndexedTerm::Product(beta, iu, iv) => {
                    let u = dep_at(&deps, iu)?.values();
                    let v = dep_at(&deps, iv)?.values();
                    for ((r, &ui), &vi) in rhs.iter_mut().zip(u.iter()).zip(v.iter()) {
                        *r += beta * ui * vi;
                    }
                }
            }
        }
        let k = match self.coefficient {
            Some(ik) => Some(dep_at(&deps, ik)?.clone()),
            None => None,
        };
        let solution = self.with_factorization(k.as_ref(), |lu| lu.solve(&rhs))?;
        x.set_values(&solution)
    }

    fn adjoint_derivative_action(
        &mut self,
        nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        let lambda = single(adj_x)?;
        let k = match self.coefficient {
            Some(ik) => Some(self.nl_value(nl_deps, ik)?.clone()),
            None => None,
        };
        if dep_index == 0 {
            let values = self.apply_transpose(k.as_ref(), lambda);
            return Ok(AdjointAction::Value(Variable::with_values("operator_action", values)));
        }

        let n = lambda.len();
        let mut action: Option<Vec<f64>> = None;
        if self.coefficient == Some(dep_index) {
            let x = self.nl_value(nl_deps, 0)?.values();
            let acc = action.get_or_insert_with(|| vec![0.0; n]);
            for ((a, &xi), &li) in acc.iter_mut().zip(x.iter()).zip(lambda.values().iter()) {
                *a += xi * li;
            }
        }
        for term in &self.terms {
            match *term {
                IndexedTerm::Scaled(alpha, iy) if iy == dep_index => {
                    let acc = action.get_or_insert_with(|| vec![0.0; n]);
                    for (a, &li) in acc.iter_mut().zip(lambda.values().iter()) {
                        *a -= alpha * li;
                    }
                }
                IndexedTerm::Product(beta, iu, iv) => {
                    for (this, other) in [(iu, iv), (iv, iu)] {
                        if this != dep_index {
                            continue;
                        }
                        let other = self.nl_value(nl_deps, other)?.values();
                        let acc = action.get_or_insert_with(|| vec![0.0; n]);
                        for ((a, &oi), &li) in
                            acc.iter_mut().zip(other.iter()).zip(lambda.values().iter())
                        {
                            *a -= beta * oi * li;
                        }
                    }
                }
                IndexedTerm::Scaled(..) => {}
            }
        }
        Ok(match action {
            Some(values) => AdjointAction::Value(Variable::with_values("rhs_action", values)),
            None => AdjointAction::None,
        })
    }

    fn adjoint_jacobian_solve(
        &mut self,
        nl_deps: &[Variable],
        b: Vec<Variable>,
    ) -> EquationResult<Vec<Variable>> {
        let rhs = single(&b)?.to_vec();
        let k = match self.coefficient {
            Some(ik) => Some(self.nl_value(nl_deps, ik)?.clone()),
            None => None,
        };
        let lambda = self.with_factorization(k.as_ref(), |lu| lu.solve_transpose(&rhs))?;
        single(&b)?.set_values(&lambda)?;
        Ok(b)
    }

    fn tangent_linear(
        &self,
        m: &[VariableId],
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        let deps = self.core.deps();
        let mut terms = Vec::new();
        for term in &self.terms {
            match *term {
                IndexedTerm::Scaled(alpha, iy) => {
                    if let Some(tau_y) = self.core.tangent_of(iy, m, dm, tlm_map) {
                        terms.push(RhsTerm::Scaled(alpha, VariableRef::from(tau_y)));
                    }
                }
                IndexedTerm::Product(beta, iu, iv) => {
                    if let Some(tau_u) = self.core.tangent_of(iu, m, dm, tlm_map) {
                        terms.push(RhsTerm::Product(beta, VariableRef::from(tau_u), deps[iv].clone()));
                    }
                    if let Some(tau_v) = self.core.tangent_of(iv, m, dm, tlm_map) {
                        terms.push(RhsTerm::Product(beta, deps[iu].clone(), VariableRef::from(tau_v)));
                    }
                }
            }
        }
        if let Some(ik) = self.coefficient {
            if let Some(tau_k) = self.core.tangent_of(ik, m, dm, tlm_map) {
                terms.push(RhsTerm::Product(-1.0, VariableRef::from(tau_k), deps[0].clone()));
            }
        }
        if terms.is_empty() {
            return Ok(None);
        }
        let tau_x = tlm_map.get_or_create(&deps[0]);
        let eq = LinearSystemSolver::from_parts(
            VariableRef::from(tau_x),
            Rc::clone(&self.matrix),
            self.coefficient.map(|ik| deps[ik].clone()),
            terms,
            Rc::clone(&self.factorization),
        )?;
        Ok(Some(Box::new(eq)))
    }

    fn reset_forward_solve(&mut self) {
        self.factorization.borrow_mut().clear();
    }

    fn reset_adjoint_jacobian_solve(&mut self) {
        self.factorization.borrow_mut().clear();
    }
}
