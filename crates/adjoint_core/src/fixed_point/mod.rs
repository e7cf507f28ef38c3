//! Coupled systems solved by fixed-point iteration.
//!
//! [`FixedPointSolver`] wraps an ordered list of single-solution equations
//! that read each other's solutions. The forward solve sweeps the members
//! until the change in the final member's solution falls below tolerance.
//! The adjoint solve iterates the transposed linearisation with the same
//! convergence test, sweeping the members in reverse cyclic order.

mod parameters;
mod solver;

pub use parameters::FixedPointParameters;
pub use solver::{FixedPointSolver, FixedPointStatus};
