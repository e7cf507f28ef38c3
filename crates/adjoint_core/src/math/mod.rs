//! Reference numerical backend.

mod dense;

pub use dense::{DenseMatrix, LuFactorization};
