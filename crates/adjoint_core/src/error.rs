//! Error types for equation definition and solution.

use std::fmt;
use thiserror::Error;

use crate::variable::VariableId;

/// Phase of a fixed-point iteration, used in convergence errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolvePhase {
    /// Forward (primal or tangent-linear) iteration.
    Forward,
    /// Adjoint iteration.
    Adjoint,
}

impl fmt::Display for SolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePhase::Forward => write!(f, "forward"),
            SolvePhase::Adjoint => write!(f, "adjoint"),
        }
    }
}

/// Errors raised while defining or solving equations.
///
/// Definition errors are raised at construction; convergence errors abort
/// the enclosing differentiation run.
///
/// # Examples
///
/// ```
/// use adjoint_core::EquationError;
///
/// let err = EquationError::StaticSolution { name: "c".to_string() };
/// assert_eq!(
///     format!("{}", err),
///     "Static variable c cannot be the solution of an equation"
/// );
/// assert!(err.is_definition());
/// ```
#[derive(Debug, Error)]
pub enum EquationError {
    /// The same identity appears twice in a dependency list.
    #[error("Duplicate dependency: {name} ({id})")]
    DuplicateDependency {
        /// Variable name
        name: String,
        /// Variable identity
        id: VariableId,
    },

    /// A solution variable is missing from the dependency list.
    #[error("Solution {name} is not a dependency of its equation")]
    SolutionNotDependency {
        /// Variable name
        name: String,
    },

    /// A non-linear dependency is missing from the dependency list.
    #[error("Non-linear dependency {name} is not a dependency of its equation")]
    NonLinearDependencyNotInDeps {
        /// Variable name
        name: String,
    },

    /// A static variable was used as a solution.
    #[error("Static variable {name} cannot be the solution of an equation")]
    StaticSolution {
        /// Variable name
        name: String,
    },

    /// A variable excluded from checkpointing was used as a solution.
    #[error("Variable {name} is not checkpointed and cannot be the solution of an equation")]
    NonCheckpointedSolution {
        /// Variable name
        name: String,
    },

    /// The same identity is solved for twice.
    #[error("Duplicate solve for {name}")]
    DuplicateSolution {
        /// Variable name
        name: String,
    },

    /// A linear equation depends on its own solution.
    #[error("Non-linear dependency in linear equation: {name}")]
    SelfDependency {
        /// Variable name
        name: String,
    },

    /// An equation expected to solve for one variable solves for several.
    #[error("Equation must solve for exactly one variable, found {count}")]
    MultipleSolutions {
        /// Number of solution variables
        count: usize,
    },

    /// Any other inconsistency in an equation definition.
    #[error("Invalid equation definition: {message}")]
    InvalidDefinition {
        /// Description of the issue
        message: String,
    },

    /// A replaced equation was asked to use its own references.
    #[error("Equation references have been replaced; {operation} requires live variables")]
    Replaced {
        /// The operation that required live variables
        operation: &'static str,
    },

    /// A solution variable was requested as a differentiation parameter.
    #[error("Invalid tangent-linear parameter: {name} is a solution of the equation")]
    InvalidTangentLinearParameter {
        /// Variable name
        name: String,
    },

    /// Payload lengths do not agree.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Actual length
        found: usize,
    },

    /// A dependency index is out of range.
    #[error("Dependency index {index} out of range for {count} dependencies")]
    DependencyIndex {
        /// Requested index
        index: usize,
        /// Number of dependencies
        count: usize,
    },

    /// The dense backend met a zero pivot.
    #[error("Singular matrix: zero pivot in column {column}")]
    SingularMatrix {
        /// Column of the zero pivot
        column: usize,
    },

    /// A fixed-point change norm was NaN or infinite.
    #[error("Fixed point iteration ({phase} equation for {name}): non-finite change norm after {iterations} iteration(s)")]
    NonFinite {
        /// Iteration phase
        phase: SolvePhase,
        /// Name of the final solution variable
        name: String,
        /// Iterations performed
        iterations: usize,
    },

    /// A fixed-point iteration hit its iteration cap.
    #[error("Fixed point iteration ({phase} equation for {name}): did not converge after {iterations} iteration(s)")]
    NotConverged {
        /// Iteration phase
        phase: SolvePhase,
        /// Name of the final solution variable
        name: String,
        /// Iterations performed
        iterations: usize,
    },
}

impl EquationError {
    /// Returns `true` for errors raised while constructing an equation.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            EquationError::DuplicateDependency { .. }
                | EquationError::SolutionNotDependency { .. }
                | EquationError::NonLinearDependencyNotInDeps { .. }
                | EquationError::StaticSolution { .. }
                | EquationError::NonCheckpointedSolution { .. }
                | EquationError::DuplicateSolution { .. }
                | EquationError::SelfDependency { .. }
                | EquationError::MultipleSolutions { .. }
                | EquationError::InvalidDefinition { .. }
        )
    }

    /// Returns `true` for fixed-point convergence failures.
    pub fn is_convergence(&self) -> bool {
        matches!(
            self,
            EquationError::NonFinite { .. } | EquationError::NotConverged { .. }
        )
    }
}

/// Result type for equation operations.
pub type EquationResult<T> = Result<T, EquationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_error_display() {
        let err = EquationError::NotConverged {
            phase: SolvePhase::Adjoint,
            name: "u".to_string(),
            iterations: 10,
        };
        assert_eq!(
            format!("{}", err),
            "Fixed point iteration (adjoint equation for u): did not converge after 10 iteration(s)"
        );
        assert!(err.is_convergence());
        assert!(!err.is_definition());
    }

    #[test]
    fn test_definition_classification() {
        let err = EquationError::SelfDependency {
            name: "x".to_string(),
        };
        assert!(err.is_definition());
        assert!(!EquationError::Replaced { operation: "x" }.is_definition());
    }
}
