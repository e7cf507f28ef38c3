//! # adjoint_core: Variables and Equations for Algorithmic Differentiation
//!
//! ## Layer 1 (Foundation) Role
//!
//! adjoint_core is the bottom layer of the workspace, providing:
//! - Mutable variables with identity and a mutation counter (`variable`)
//! - Live references and identity-only placeholders (`reference`)
//! - The residual-form [`Equation`] trait and built-in equations (`equation`)
//! - Coupled systems solved by fixed-point iteration (`fixed_point`)
//! - Dirichlet constraints (`constraint`)
//! - State-keyed caches for derived data such as factorisations (`cache`)
//! - A dense reference linear algebra backend (`math`)
//! - Error types: [`EquationError`] (`error`)
//!
//! Layer 1 has no dependency on the other workspace crates.
//!
//! ## Usage Examples
//!
//! ```rust
//! use adjoint_core::{Equation, InnerProductSolver, LinearCombinationSolver, TangentLinearMap, Variable};
//!
//! let m = Variable::with_values("m", vec![1.0, 2.0]);
//! let u = Variable::new("u", 2);
//! let j = Variable::new("J", 1);
//!
//! let mut eq1 = LinearCombinationSolver::scale(&u, 3.0, &m).unwrap();
//! let mut eq2 = InnerProductSolver::norm_sq(&j, &u).unwrap();
//! eq1.solve_in_place().unwrap();
//! eq2.solve_in_place().unwrap();
//! assert_eq!(j.value(), 45.0);
//!
//! // Directional derivative of J along dm = (1, 0)
//! let dm = Variable::with_values("dm", vec![1.0, 0.0]);
//! let mut map = TangentLinearMap::new();
//! eq1.tangent_linear(&[m.id()], std::slice::from_ref(&dm), &mut map)
//!     .unwrap()
//!     .unwrap()
//!     .solve_in_place()
//!     .unwrap();
//! eq2.tangent_linear(&[m.id()], std::slice::from_ref(&dm), &mut map)
//!     .unwrap()
//!     .unwrap()
//!     .solve_in_place()
//!     .unwrap();
//! assert_eq!(map.get(j.id()).unwrap().value(), 18.0);
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod constraint;
pub mod equation;
pub mod error;
pub mod fixed_point;
pub mod math;
pub mod reference;
pub mod variable;

pub use cache::{shared_cache, KeyedCache, SharedCache, StateKey};
pub use constraint::{apply_constraints, DirichletConstraint};
pub use equation::{
    AdjointAction, AssignmentSolver, DependencyList, Equation, EquationClone, EquationCore,
    InnerProductSolver, LinearCombinationSolver, LinearSystemBuilder, LinearSystemSolver,
    NullSolver, SumSolver, TangentLinearMap,
};
pub use error::{EquationError, EquationResult, SolvePhase};
pub use fixed_point::{FixedPointParameters, FixedPointSolver, FixedPointStatus};
pub use reference::{Replacement, VariableRef};
pub use variable::{Variable, VariableFlags, VariableId};
