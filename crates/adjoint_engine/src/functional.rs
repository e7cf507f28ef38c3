//! Scalar objectives built up term by term.

use adjoint_core::{AssignmentSolver, LinearCombinationSolver, Variable};

use crate::error::AdjointResult;
use crate::manager::EquationManager;

/// A scalar objective accumulated from recorded terms.
///
/// Every [`assign`](Self::assign) or [`addto`](Self::addto) solves a new
/// variable, so a functional can be extended across blocks without
/// solving the same variable twice.
///
/// # Example
///
/// ```
/// use adjoint_core::{InnerProductSolver, Variable};
/// use adjoint_engine::{EquationManager, Functional};
///
/// let m = Variable::with_values("m", vec![1.0, 2.0]);
/// let mut manager = EquationManager::new();
/// manager.start().unwrap();
///
/// let mut functional = Functional::new("J");
/// for _ in 0..2 {
///     let term = Variable::new("term", 1);
///     manager.solve(InnerProductSolver::norm_sq(&term, &m).unwrap()).unwrap();
///     functional.addto(&mut manager, &term).unwrap();
///     manager.new_block().unwrap();
/// }
/// assert_eq!(functional.value(), 10.0);
///
/// let dj = manager.compute_gradient(&[functional.variable()], &[&m]).unwrap();
/// assert_eq!(dj[0][0].to_vec(), vec![4.0, 8.0]);
/// ```
#[derive(Clone, Debug)]
pub struct Functional {
    name: String,
    current: Variable,
    terms: usize,
}

impl Functional {
    /// Creates a zero functional.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let current = Variable::new(name.clone(), 1);
        Self {
            name,
            current,
            terms: 0,
        }
    }

    /// Variable holding the current value.
    #[inline]
    pub fn variable(&self) -> &Variable {
        &self.current
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.current.value()
    }

    /// Number of terms recorded so far.
    #[inline]
    pub fn terms(&self) -> usize {
        self.terms
    }

    /// Sets the functional to `term`.
    ///
    /// # Errors
    ///
    /// Equation errors if `term` is not a scalar; manager errors from the
    /// solve.
    pub fn assign(&mut self, manager: &mut EquationManager, term: &Variable) -> AdjointResult<()> {
        let next = Variable::new(self.name.clone(), 1);
        manager.solve(AssignmentSolver::new(&next, term)?)?;
        self.current = next;
        self.terms = 1;
        Ok(())
    }

    /// Adds `term` to the functional.
    pub fn addto(&mut self, manager: &mut EquationManager, term: &Variable) -> AdjointResult<()> {
        if self.terms == 0 {
            return self.assign(manager, term);
        }
        let next = Variable::new(self.name.clone(), 1);
        manager.solve(LinearCombinationSolver::new(
            &next,
            &[(1.0, &self.current), (1.0, term)],
        )?)?;
        self.current = next;
        self.terms += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_functional_is_zero() {
        let functional = Functional::new("J");
        assert_eq!(functional.value(), 0.0);
        assert_eq!(functional.terms(), 0);
    }

    #[test]
    fn test_assign_restarts() {
        let a = Variable::scalar("a", 2.0);
        let b = Variable::scalar("b", 5.0);
        let mut manager = EquationManager::new();
        let mut functional = Functional::new("J");
        functional.addto(&mut manager, &a).unwrap();
        functional.addto(&mut manager, &b).unwrap();
        assert_eq!(functional.value(), 7.0);
        functional.assign(&mut manager, &b).unwrap();
        assert_eq!(functional.value(), 5.0);
        assert_eq!(functional.terms(), 1);
    }

    #[test]
    fn test_non_scalar_term_rejected() {
        let v = Variable::with_values("v", vec![1.0, 2.0]);
        let mut manager = EquationManager::new();
        let mut functional = Functional::new("J");
        assert!(functional.addto(&mut manager, &v).is_err());
    }

    #[test]
    fn test_gradient_through_terms() {
        let a = Variable::scalar("a", 2.0);
        let mut manager = EquationManager::new();
        manager.start().unwrap();
        let mut functional = Functional::new("J");
        functional.addto(&mut manager, &a).unwrap();
        functional.addto(&mut manager, &a).unwrap();
        let dj = manager
            .compute_gradient(&[functional.variable()], &[&a])
            .unwrap();
        assert_eq!(dj[0][0].value(), 2.0);
    }
}
