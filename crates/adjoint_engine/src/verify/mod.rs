//! Derivative verification.
//!
//! Taylor remainder tests compare a model evaluated at perturbed
//! parameters `m + ε dm` against its derivative information. With a
//! correct gradient the remainder `|J(m + ε dm) - J(m) - ε dJ·dm|` shrinks
//! like `ε²`; adding the second-order term from a correct Hessian action
//! makes it shrink like `ε³`.
//!
//! A forward model is any `FnMut(&mut EquationManager, &Variable) ->
//! AdjointResult<Variable>` that solves its equations through the given
//! manager and returns the functional. Models must build fresh variables
//! on every call.
//!
//! # Example
//!
//! ```
//! use adjoint_core::{InnerProductSolver, Variable};
//! use adjoint_engine::verify::{gradient, taylor_test};
//! use adjoint_engine::{AdjointResult, EquationManager};
//!
//! fn forward(manager: &mut EquationManager, m: &Variable) -> AdjointResult<Variable> {
//!     let s = Variable::new("s", 1);
//!     let j = Variable::new("j", 1);
//!     manager.solve(InnerProductSolver::norm_sq(&s, m)?)?;
//!     manager.solve(InnerProductSolver::new(&j, 1.0, &s, &s)?)?;
//!     Ok(j)
//! }
//!
//! let m = Variable::with_values("m", vec![0.5, -1.0, 2.0]);
//! let (j, dj) = gradient(forward, &m).unwrap();
//! let order = taylor_test(forward, &m, j, &dj, None, 1).unwrap();
//! assert!(order > 1.9);
//! ```

mod hessian;
mod taylor;

pub use hessian::{gradient, hessian_action};
pub use taylor::{random_direction, taylor_test, taylor_test_tlm, PERTURBATIONS};
