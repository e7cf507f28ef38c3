//! The fixed-point composite equation.

use tracing::{debug, info};

use super::FixedPointParameters;
use crate::equation::{
    dep_at, AdjointAction, DependencyList, Equation, EquationCore, NullSolver, TangentLinearMap,
};
use crate::error::{EquationError, EquationResult, SolvePhase};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Outcome of the most recent iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FixedPointStatus {
    /// No solve has run yet.
    #[default]
    Idle,
    /// A solve is in progress.
    Iterating,
    /// The last solve converged.
    Converged {
        /// Iterations performed
        iterations: usize,
    },
    /// The last solve failed.
    Failed,
}

/// A cyclic system of coupled equations solved by repeated substitution.
///
/// Every member has exactly one solution and solutions are pairwise
/// distinct. The composite solutions are the member solutions in member
/// order; its dependencies are the de-duplicated union of member
/// dependencies, plus the initial guess.
///
/// # Example
///
/// ```
/// use adjoint_core::{Equation, FixedPointParameters, FixedPointSolver, LinearCombinationSolver, Variable};
///
/// let c = Variable::new_static("c", vec![1.0]);
/// let x = Variable::new("x", 1);
/// let y = Variable::new("y", 1);
/// let eqs: Vec<Box<dyn Equation>> = vec![
///     Box::new(LinearCombinationSolver::new(&x, &[(0.5, &y), (1.0, &c)]).unwrap()),
///     Box::new(LinearCombinationSolver::scale(&y, 0.5, &x).unwrap()),
/// ];
/// let mut fp = FixedPointSolver::new(eqs, None, FixedPointParameters::new(1e-14, 1e-14)).unwrap();
/// fp.solve_in_place().unwrap();
/// assert!((x.value() - 4.0 / 3.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct FixedPointSolver {
    core: EquationCore,
    eqs: Vec<Box<dyn Equation>>,
    parameters: FixedPointParameters,
    initial_guess_index: Option<usize>,
    eq_dep_indices: Vec<Vec<usize>>,
    eq_nl_dep_indices: Vec<Vec<usize>>,
    /// `transpose_deps[i]` lists `(k, j)` where dependency `j` of member
    /// `k != i` is the solution of member `i`.
    transpose_deps: Option<Vec<Vec<(usize, usize)>>>,
    status: FixedPointStatus,
}

impl FixedPointSolver {
    /// Creates the composite equation.
    ///
    /// # Arguments
    ///
    /// * `eqs` - Member equations, in sweep order
    /// * `initial_guess` - Seed for the final member's solution
    /// * `parameters` - Convergence parameters
    ///
    /// # Errors
    ///
    /// - [`EquationError::MultipleSolutions`] if a member has more than one
    ///   solution
    /// - [`EquationError::DuplicateSolution`] if two members share a solution
    /// - [`EquationError::InvalidDefinition`] for an empty member list, an
    ///   initial guess with `nonzero_initial_guess = false`, or invalid
    ///   parameters
    pub fn new(
        eqs: Vec<Box<dyn Equation>>,
        initial_guess: Option<&Variable>,
        parameters: FixedPointParameters,
    ) -> EquationResult<Self> {
        parameters.validate()?;
        if eqs.is_empty() {
            return Err(EquationError::InvalidDefinition {
                message: "fixed point requires at least one equation".to_string(),
            });
        }
        if initial_guess.is_some() && !parameters.nonzero_initial_guess {
            return Err(EquationError::InvalidDefinition {
                message: "initial guess supplied with nonzero_initial_guess = false".to_string(),
            });
        }

        let mut x = Vec::with_capacity(eqs.len());
        for eq in &eqs {
            let count = eq.core().solution_count();
            if count != 1 {
                return Err(EquationError::MultipleSolutions { count });
            }
            if let Some(xi) = eq.core().x().next() {
                x.push(xi.clone());
            }
        }

        let mut deps = DependencyList::new();
        for xi in &x {
            if deps.position(xi.id()).is_some() {
                return Err(EquationError::DuplicateSolution {
                    name: xi.name().to_string(),
                });
            }
            deps.push(xi.clone());
        }

        let last_id = x[x.len() - 1].id();
        let initial_guess_index = match initial_guess {
            Some(guess) if guess.id() != last_id => Some(deps.push(VariableRef::from(guess))),
            _ => None,
        };

        let mut nl = DependencyList::new();
        let mut eq_dep_indices = Vec::with_capacity(eqs.len());
        let mut eq_nl_dep_indices = Vec::with_capacity(eqs.len());
        for eq in &eqs {
            eq_dep_indices.push(eq.core().deps().iter().map(|d| deps.push(d.clone())).collect());
            eq_nl_dep_indices.push(eq.core().nl_deps().map(|d| nl.push(d.clone())).collect());
        }

        let nl = nl.into_vec();
        let core = EquationCore::new(&x, deps.into_vec(), Some(&nl))?;
        let checkpoint_ic = Self::initial_conditions(&eqs, &parameters, initial_guess_index);
        let core = core.with_initial_conditions(checkpoint_ic)?;

        Ok(Self {
            core,
            eqs,
            parameters,
            initial_guess_index,
            eq_dep_indices,
            eq_nl_dep_indices,
            transpose_deps: None,
            status: FixedPointStatus::Idle,
        })
    }

    /// A member solution needs its pre-solve value when the member itself
    /// needs it, or when an earlier member reads it during the first sweep.
    /// The final solution is seeded by the solver unless it starts from its
    /// own current value.
    fn initial_conditions(
        eqs: &[Box<dyn Equation>],
        parameters: &FixedPointParameters,
        initial_guess_index: Option<usize>,
    ) -> Vec<bool> {
        let n = eqs.len();
        (0..n)
            .map(|i| {
                let core = eqs[i].core();
                let member_ic = core.checkpoint_ic().first().copied().unwrap_or(false);
                let read_before = core
                    .x()
                    .next()
                    .map(|xi| eqs[..i].iter().any(|e| e.core().dep_index(xi.id()).is_some()))
                    .unwrap_or(false);
                let needed = member_ic || read_before;
                if i + 1 == n {
                    parameters.nonzero_initial_guess && initial_guess_index.is_none() && needed
                } else {
                    needed
                }
            })
            .collect()
    }

    /// Convergence parameters.
    #[inline]
    pub fn parameters(&self) -> &FixedPointParameters {
        &self.parameters
    }

    /// Member equations.
    pub fn equations(&self) -> &[Box<dyn Equation>] {
        &self.eqs
    }

    /// Outcome of the most recent forward or adjoint solve.
    #[inline]
    pub fn status(&self) -> FixedPointStatus {
        self.status
    }

    fn transpose_deps(&mut self) -> Vec<Vec<(usize, usize)>> {
        if let Some(tdeps) = &self.transpose_deps {
            return tdeps.clone();
        }
        let n = self.eqs.len();
        let x_indices = self.core.x_indices().to_vec();
        let mut tdeps = vec![Vec::new(); n];
        for (k, indices) in self.eq_dep_indices.iter().enumerate() {
            for (j, &dep) in indices.iter().enumerate() {
                if let Some(i) = x_indices.iter().position(|&xi| xi == dep) {
                    if i != k {
                        tdeps[i].push((k, j));
                    }
                }
            }
        }
        debug!(members = n, "built fixed point transpose dependency map");
        self.transpose_deps = Some(tdeps.clone());
        tdeps
    }

    fn member_nl_deps(&self, nl_deps: &[Variable]) -> EquationResult<Vec<Vec<Variable>>> {
        self.eq_nl_dep_indices
            .iter()
            .map(|indices| {
                indices
                    .iter()
                    .map(|&p| dep_at(nl_deps, p).cloned())
                    .collect()
            })
            .collect()
    }

    fn last_name(&self) -> String {
        self.core
            .x()
            .last()
            .map(|x| x.name().to_string())
            .unwrap_or_default()
    }

    /// Applies the convergence test to `change_sq`, returning `true` once
    /// converged.
    fn check_convergence(
        &mut self,
        phase: SolvePhase,
        iteration: usize,
        change_sq: f64,
        tolerance_sq: &mut f64,
    ) -> EquationResult<bool> {
        if self.parameters.report {
            info!(
                phase = %phase,
                solution = %self.last_name(),
                iteration,
                change_norm = change_sq.sqrt(),
                "fixed point iteration"
            );
        }
        if !change_sq.is_finite() {
            self.status = FixedPointStatus::Failed;
            return Err(EquationError::NonFinite {
                phase,
                name: self.last_name(),
                iterations: iteration,
            });
        }
        if change_sq < *tolerance_sq || change_sq == 0.0 {
            self.status = FixedPointStatus::Converged {
                iterations: iteration,
            };
            return Ok(true);
        }
        if iteration >= self.parameters.maximum_iterations {
            self.status = FixedPointStatus::Failed;
            return Err(EquationError::NotConverged {
                phase,
                name: self.last_name(),
                iterations: iteration,
            });
        }
        if iteration == 1 {
            let relative_sq = change_sq * self.parameters.relative_tolerance.powi(2);
            *tolerance_sq = tolerance_sq.max(relative_sq);
        }
        Ok(false)
    }
}

fn change_norm_sq(previous: &[f64], current: &Variable) -> f64 {
    previous
        .iter()
        .zip(current.values().iter())
        .map(|(p, c)| (p - c) * (p - c))
        .sum()
}

impl Equation for FixedPointSolver {
    fn kind(&self) -> &'static str {
        "FixedPoint"
    }

    fn core(&self) -> &EquationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationCore {
        &mut self.core
    }

    fn forward_solve(&mut self, x: &[Variable], deps: Option<&[Variable]>) -> EquationResult<()> {
        let mut values = self.core.resolve_deps(deps)?;
        if x.len() != self.eqs.len() {
            return Err(EquationError::DimensionMismatch {
                expected: self.eqs.len(),
                found: x.len(),
            });
        }
        for (xi, &j) in x.iter().zip(self.core.x_indices()) {
            values[j] = xi.clone();
        }
        let member_deps: Vec<Vec<Variable>> = self
            .eq_dep_indices
            .iter()
            .map(|indices| indices.iter().map(|&j| values[j].clone()).collect())
            .collect();

        let n = x.len();
        let last = &x[n - 1];
        if self.parameters.nonzero_initial_guess {
            if let Some(g) = self.initial_guess_index {
                last.assign(dep_at(&values, g)?)?;
            }
        } else {
            last.zero();
        }

        self.status = FixedPointStatus::Iterating;
        let mut previous = vec![0.0; last.len()];
        let mut tolerance_sq = self.parameters.absolute_tolerance.powi(2);
        let mut iteration = 0;
        loop {
            iteration += 1;
            for (i, eq) in self.eqs.iter_mut().enumerate() {
                if let Err(err) = eq.forward_solve(std::slice::from_ref(&x[i]), Some(&member_deps[i])) {
                    self.status = FixedPointStatus::Failed;
                    return Err(err);
                }
            }
            let change_sq = change_norm_sq(&previous, last);
            if self.check_convergence(SolvePhase::Forward, iteration, change_sq, &mut tolerance_sq)? {
                return Ok(());
            }
            previous = last.to_vec();
        }
    }

    fn adjoint_derivative_action(
        &mut self,
        nl_deps: &[Variable],
        dep_index: usize,
        adj_x: &[Variable],
    ) -> EquationResult<AdjointAction> {
        if self.core.is_solution_index(dep_index) {
            return Ok(AdjointAction::None);
        }
        let dep = match self.core.deps().get(dep_index) {
            Some(dep) => dep,
            None => return Ok(AdjointAction::None),
        };
        let member_nl = self.member_nl_deps(nl_deps)?;
        let mut accumulated: Option<Variable> = None;
        for (i, eq) in self.eqs.iter_mut().enumerate() {
            let j = match self.eq_dep_indices[i].iter().position(|&d| d == dep_index) {
                Some(j) => j,
                None => continue,
            };
            let action = eq.adjoint_derivative_action(&member_nl[i], j, std::slice::from_ref(&adj_x[i]))?;
            if action.is_none() {
                continue;
            }
            let acc = accumulated.get_or_insert_with(|| dep.new_like());
            action.subtract_from(acc)?;
        }
        Ok(match accumulated {
            Some(acc) => AdjointAction::Scaled(-1.0, acc),
            None => AdjointAction::None,
        })
    }

    fn adjoint_jacobian_solve(
        &mut self,
        nl_deps: &[Variable],
        b: Vec<Variable>,
    ) -> EquationResult<Vec<Variable>> {
        let n = self.eqs.len();
        if b.len() != n {
            return Err(EquationError::DimensionMismatch {
                expected: n,
                found: b.len(),
            });
        }
        let tdeps = self.transpose_deps();
        let member_nl = self.member_nl_deps(nl_deps)?;
        let mut adj_x: Vec<Variable> = b.iter().map(Variable::copy).collect();

        self.status = FixedPointStatus::Iterating;
        let mut previous = vec![0.0; adj_x[n - 1].len()];
        let mut tolerance_sq = self.parameters.absolute_tolerance.powi(2);
        let mut iteration = 0;
        loop {
            iteration += 1;
            for i in (0..n).rev() {
                let i = (i + n - 1) % n;
                let rhs = b[i].copy();
                for &(k, j) in &tdeps[i] {
                    let action = self.eqs[k].adjoint_derivative_action(
                        &member_nl[k],
                        j,
                        std::slice::from_ref(&adj_x[k]),
                    )?;
                    action.subtract_from(&rhs)?;
                }
                let solved = self.eqs[i].adjoint_jacobian_solve(&member_nl[i], vec![rhs])?;
                adj_x[i] = solved.into_iter().next().ok_or(EquationError::DimensionMismatch {
                    expected: 1,
                    found: 0,
                })?;
            }
            let change_sq = change_norm_sq(&previous, &adj_x[n - 1]);
            if self.check_convergence(SolvePhase::Adjoint, iteration, change_sq, &mut tolerance_sq)? {
                return Ok(adj_x);
            }
            previous = adj_x[n - 1].to_vec();
        }
    }

    fn tangent_linear(
        &self,
        m: &[VariableId],
        dm: &[Variable],
        tlm_map: &mut TangentLinearMap,
    ) -> EquationResult<Option<Box<dyn Equation>>> {
        self.core.check_tangent_parameters(m)?;
        let active = (0..self.core.deps().len())
            .filter(|&j| !self.core.is_solution_index(j) && Some(j) != self.initial_guess_index)
            .any(|j| self.core.tangent_of(j, m, dm, tlm_map).is_some());
        if !active {
            return Ok(None);
        }

        let tau_x: Vec<Variable> = self.core.x().map(|x| tlm_map.get_or_create(x)).collect();
        let mut tlm_eqs: Vec<Box<dyn Equation>> = Vec::with_capacity(self.eqs.len());
        for (eq, tau) in self.eqs.iter().zip(&tau_x) {
            match eq.tangent_linear(m, dm, tlm_map)? {
                Some(tlm) => tlm_eqs.push(tlm),
                None => tlm_eqs.push(Box::new(NullSolver::new(tau)?)),
            }
        }
        let guess = self
            .initial_guess_index
            .and_then(|g| self.core.tangent_of(g, m, dm, tlm_map));
        let eq = FixedPointSolver::new(tlm_eqs, guess.as_ref(), self.parameters.clone())?;
        Ok(Some(Box::new(eq)))
    }

    fn reset_forward_solve(&mut self) {
        self.eqs.iter_mut().for_each(|eq| eq.reset_forward_solve());
    }

    fn reset_adjoint_derivative_action(&mut self) {
        self.eqs
            .iter_mut()
            .for_each(|eq| eq.reset_adjoint_derivative_action());
    }

    fn reset_adjoint_jacobian_solve(&mut self) {
        self.transpose_deps = None;
        self.eqs
            .iter_mut()
            .for_each(|eq| eq.reset_adjoint_jacobian_solve());
    }

    fn replace(&mut self) {
        self.core.replace();
        self.eqs.iter_mut().for_each(|eq| eq.replace());
        self.reset_forward_solve();
        self.reset_adjoint_derivative_action();
        self.reset_adjoint_jacobian_solve();
    }
}
