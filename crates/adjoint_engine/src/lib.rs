//! # adjoint_engine: Annotation and Differentiation of Equation Traces
//!
//! ## Layer 3 (Engine) Role
//!
//! adjoint_engine records the equations a forward model solves and
//! differentiates the recorded trace:
//! - [`EquationManager`]: annotation into blocks, checkpointed replay,
//!   reverse-mode gradients and tangent-linear propagation (`manager`)
//! - [`Functional`]: scalar objectives built term by term (`functional`)
//! - [`TimeSystem`] and [`TimeFunction`]: one block per timestep
//!   (`timestepping`)
//! - Taylor remainder tests and Hessian actions (`verify`)
//! - [`ManagerConfig`]: TOML configuration (`config`)
//! - Error types: [`AdjointError`] aggregating equation, checkpoint and
//!   manager errors (`error`)
//!
//! ## Usage Examples
//!
//! ```rust
//! use adjoint_checkpoint::ScheduleConfig;
//! use adjoint_core::{InnerProductSolver, LinearCombinationSolver, Variable};
//! use adjoint_engine::{EquationManager, ManagerConfig};
//!
//! let config = ManagerConfig::default().with_schedule(ScheduleConfig::Binomial {
//!     blocks: 4,
//!     snapshots_in_ram: 1,
//!     snapshots_on_disk: 0,
//! });
//! let mut manager = EquationManager::from_config(config).unwrap();
//!
//! // u_{k+1} = 2 u_k, J = u_4 · u_4
//! let m = Variable::with_values("m", vec![1.0, -1.0]);
//! let mut u = m.clone();
//! manager.start().unwrap();
//! for step in 0..4 {
//!     let next = Variable::new(format!("u{}", step + 1), 2);
//!     manager.solve(LinearCombinationSolver::scale(&next, 2.0, &u).unwrap()).unwrap();
//!     if step == 3 {
//!         let j = Variable::new("j", 1);
//!         manager.solve(InnerProductSolver::norm_sq(&j, &next).unwrap()).unwrap();
//!         u = j;
//!     } else {
//!         manager.new_block().unwrap();
//!         u = next;
//!     }
//! }
//! manager.stop();
//!
//! let dj = manager.compute_gradient(&[&u], &[&m]).unwrap();
//! assert_eq!(dj[0][0].to_vec(), vec![512.0, -512.0]);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod functional;
pub mod manager;
pub mod timestepping;
pub mod verify;

pub use config::ManagerConfig;
pub use error::{AdjointError, AdjointResult, AnnotationState, ManagerError};
pub use functional::Functional;
pub use manager::{with_default_manager, EquationManager, GradientCallback, ManagerInfo};
pub use timestepping::{TimeFunction, TimeSystem};
