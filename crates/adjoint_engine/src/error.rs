//! Error types for the equation manager.
//!
//! [`ManagerError`] covers the manager's own state machine and trace
//! bookkeeping; [`AdjointError`] aggregates it with equation and checkpoint
//! errors so every manager operation returns one error type.

use adjoint_checkpoint::CheckpointError;
use adjoint_core::EquationError;
use thiserror::Error;

/// Annotation state of an [`EquationManager`](crate::EquationManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationState {
    /// Not recording.
    Stopped,
    /// Recording equations into the current block.
    Annotating,
    /// The trace is closed; only differentiation is possible.
    Final,
}

impl std::fmt::Display for AnnotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationState::Stopped => write!(f, "stopped"),
            AnnotationState::Annotating => write!(f, "annotating"),
            AnnotationState::Final => write!(f, "final"),
        }
    }
}

/// Errors raised by the manager's state machine and trace bookkeeping.
///
/// # Examples
///
/// ```
/// use adjoint_engine::ManagerError;
///
/// let err = ManagerError::DuplicateSolve { name: "u".to_string(), block: 3 };
/// assert_eq!(format!("{}", err), "Duplicate solve for u in block 3");
/// ```
#[derive(Debug, Error)]
pub enum ManagerError {
    /// An equation was added while the manager was not annotating.
    #[error("Cannot add equation {kind}: manager is not annotating")]
    NotAnnotating {
        /// Kind of the rejected equation
        kind: &'static str,
    },

    /// The requested lifecycle transition is not allowed.
    #[error("Invalid manager transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: AnnotationState,
        /// Requested state
        to: AnnotationState,
    },

    /// The same variable was solved twice in one block.
    #[error("Duplicate solve for {name} in block {block}")]
    DuplicateSolve {
        /// Variable name
        name: String,
        /// Block index
        block: usize,
    },

    /// A block was closed without any equation.
    #[error("Block {block} is empty")]
    EmptyBlock {
        /// Block index
        block: usize,
    },

    /// Replay needed a value that was neither checkpointed nor computed.
    #[error("No value available for {name} during replay")]
    MissingValue {
        /// Variable name
        name: String,
    },

    /// The reverse sweep reached a block without non-linear dependency data.
    #[error("No non-linear dependency data for block {block}")]
    MissingData {
        /// Block index
        block: usize,
    },

    /// A functional is not the solution of any recorded equation.
    #[error("Functional {name} is not computed by any recorded equation")]
    UnknownFunctional {
        /// Variable name
        name: String,
    },

    /// A tangent-linear direction index was never registered.
    #[error("No tangent-linear direction {index} is registered")]
    UnknownDirection {
        /// Direction index
        index: usize,
    },

    /// Parameter and direction lists have different lengths.
    #[error("{parameters} parameter(s) but {directions} direction(s)")]
    DirectionMismatch {
        /// Number of parameters
        parameters: usize,
        /// Number of directions
        directions: usize,
    },

    /// Configuration text could not be parsed or is inconsistent.
    #[error("Invalid manager configuration: {message}")]
    InvalidConfig {
        /// Description of the issue
        message: String,
    },

    /// Two equations of one time-stepping stage solve the same variable.
    #[error("Variable {name} is solved twice in the {stage} stage")]
    DuplicateStageSolve {
        /// Variable name
        name: String,
        /// Stage name
        stage: &'static str,
    },

    /// A time-stepping stage was run out of order.
    #[error("Cannot run the {stage} stage: time system is {state}")]
    InvalidStage {
        /// Requested stage
        stage: &'static str,
        /// Current state of the time system
        state: &'static str,
    },

    /// Equations of a time-stepping stage depend on each other cyclically.
    #[error("Circular dependency between equations solving {names:?}")]
    CircularDependency {
        /// Names of the solutions on the cycle
        names: Vec<String>,
    },
}

/// Any error raised while annotating, replaying or differentiating.
#[derive(Debug, Error)]
pub enum AdjointError {
    /// Equation definition or solve failure.
    #[error("Equation error: {0}")]
    Equation(#[from] EquationError),

    /// Checkpoint schedule or storage failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Manager state or bookkeeping failure.
    #[error("Manager error: {0}")]
    Manager(#[from] ManagerError),
}

/// Result type for manager operations.
pub type AdjointResult<T> = Result<T, AdjointError>;
