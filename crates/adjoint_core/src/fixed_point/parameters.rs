//! Convergence parameters.

use serde::{Deserialize, Serialize};

use crate::error::{EquationError, EquationResult};

fn default_maximum_iterations() -> usize {
    1000
}

fn default_nonzero_initial_guess() -> bool {
    true
}

/// Convergence parameters for [`FixedPointSolver`](super::FixedPointSolver).
///
/// Both tolerances are required. The relative tolerance is applied to the
/// change norm observed after the first iteration.
///
/// # Example
///
/// ```
/// use adjoint_core::FixedPointParameters;
///
/// let params = FixedPointParameters::new(1e-14, 1e-12).with_report(true);
/// assert_eq!(params.maximum_iterations, 1000);
/// assert!(params.nonzero_initial_guess);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedPointParameters {
    /// Absolute tolerance on the change norm.
    pub absolute_tolerance: f64,
    /// Relative tolerance on the change norm.
    pub relative_tolerance: f64,
    /// Iteration cap.
    #[serde(default = "default_maximum_iterations")]
    pub maximum_iterations: usize,
    /// Seed the final solution from the initial guess (or its current
    /// value) instead of zero.
    #[serde(default = "default_nonzero_initial_guess")]
    pub nonzero_initial_guess: bool,
    /// Log every iteration at info level.
    #[serde(default)]
    pub report: bool,
}

impl FixedPointParameters {
    /// Creates parameters with default iteration cap and reporting off.
    pub fn new(absolute_tolerance: f64, relative_tolerance: f64) -> Self {
        Self {
            absolute_tolerance,
            relative_tolerance,
            maximum_iterations: default_maximum_iterations(),
            nonzero_initial_guess: default_nonzero_initial_guess(),
            report: false,
        }
    }

    /// Sets the iteration cap.
    pub fn with_maximum_iterations(mut self, maximum_iterations: usize) -> Self {
        self.maximum_iterations = maximum_iterations;
        self
    }

    /// Sets whether the initial guess is used.
    pub fn with_nonzero_initial_guess(mut self, nonzero_initial_guess: bool) -> Self {
        self.nonzero_initial_guess = nonzero_initial_guess;
        self
    }

    /// Enables per-iteration logging.
    pub fn with_report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// [`EquationError::InvalidDefinition`] for negative or non-finite
    /// tolerances and a zero iteration cap.
    pub fn validate(&self) -> EquationResult<()> {
        for (name, tol) in [
            ("absolute_tolerance", self.absolute_tolerance),
            ("relative_tolerance", self.relative_tolerance),
        ] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(EquationError::InvalidDefinition {
                    message: format!("{} must be finite and non-negative, got {}", name, tol),
                });
            }
        }
        if self.maximum_iterations == 0 {
            return Err(EquationError::InvalidDefinition {
                message: "maximum_iterations must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let params: FixedPointParameters =
            serde_json::from_str(r#"{"absolute_tolerance": 1e-10, "relative_tolerance": 1e-8}"#)
                .unwrap();
        assert_eq!(params, FixedPointParameters::new(1e-10, 1e-8));
    }

    #[test]
    fn test_missing_tolerance_rejected() {
        let result: Result<FixedPointParameters, _> =
            serde_json::from_str(r#"{"absolute_tolerance": 1e-10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(FixedPointParameters::new(-1.0, 0.0).validate().is_err());
        assert!(FixedPointParameters::new(f64::NAN, 0.0).validate().is_err());
        assert!(FixedPointParameters::new(0.0, 0.0)
            .with_maximum_iterations(0)
            .validate()
            .is_err());
    }
}
