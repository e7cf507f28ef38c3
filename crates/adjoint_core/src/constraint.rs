//! Dirichlet-type boundary constraints on solution components.

use crate::error::{EquationError, EquationResult};
use crate::variable::Variable;

/// Fixes selected components of a solution to prescribed values.
///
/// # Examples
///
/// ```
/// use adjoint_core::{DirichletConstraint, Variable};
///
/// let bc = DirichletConstraint::new(vec![0, 2], vec![1.0, -1.0]).unwrap();
/// let x = Variable::with_values("x", vec![5.0, 5.0, 5.0]);
/// bc.apply(&x).unwrap();
/// assert_eq!(x.to_vec(), vec![1.0, 5.0, -1.0]);
///
/// bc.homogenized().apply(&x).unwrap();
/// assert_eq!(x.to_vec(), vec![0.0, 5.0, 0.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DirichletConstraint {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl DirichletConstraint {
    /// Creates a constraint fixing `x[indices[i]] = values[i]`.
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> EquationResult<Self> {
        if indices.len() != values.len() {
            return Err(EquationError::DimensionMismatch {
                expected: indices.len(),
                found: values.len(),
            });
        }
        Ok(Self { indices, values })
    }

    /// Creates a constraint fixing the given components to zero.
    pub fn homogeneous(indices: Vec<usize>) -> Self {
        let values = vec![0.0; indices.len()];
        Self { indices, values }
    }

    /// Returns the same constraint with all prescribed values set to zero.
    pub fn homogenized(&self) -> Self {
        Self::homogeneous(self.indices.clone())
    }

    /// Constrained component indices.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Writes the prescribed values into `x`.
    pub fn apply(&self, x: &Variable) -> EquationResult<()> {
        let len = x.len();
        if let Some(&bad) = self.indices.iter().find(|&&i| i >= len) {
            return Err(EquationError::DimensionMismatch {
                expected: len,
                found: bad + 1,
            });
        }
        x.modify(|values| {
            for (&i, &v) in self.indices.iter().zip(&self.values) {
                values[i] = v;
            }
        });
        Ok(())
    }
}

/// Applies every constraint in order.
pub fn apply_constraints(constraints: &[DirichletConstraint], x: &Variable) -> EquationResult<()> {
    constraints.iter().try_for_each(|c| c.apply(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(DirichletConstraint::new(vec![0, 1], vec![1.0]).is_err());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let bc = DirichletConstraint::homogeneous(vec![3]);
        let x = Variable::new("x", 2);
        assert!(bc.apply(&x).is_err());
        assert_eq!(x.state(), 0);
    }

    #[test]
    fn test_apply_constraints_in_order() {
        let first = DirichletConstraint::new(vec![0], vec![1.0]).unwrap();
        let second = DirichletConstraint::new(vec![0], vec![2.0]).unwrap();
        let x = Variable::new("x", 1);
        apply_constraints(&[first, second], &x).unwrap();
        assert_eq!(x.value(), 2.0);
    }
}
