//! Verify command: Taylor remainder tests of the demonstration model.
//!
//! Three checks are run at the model's default parameter:
//!
//! - the adjoint gradient, expecting second-order remainders
//! - the adjoint gradient plus the Hessian action, expecting third order
//! - the online tangent-linear model, expecting second order

use adjoint_core::Variable;
use adjoint_engine::verify::{
    gradient, hessian_action, random_direction, taylor_test, taylor_test_tlm,
};
use adjoint_engine::EquationManager;
use tracing::info;

use crate::config::CliConfig;
use crate::model::DiffusionModel;
use crate::{CliError, Result};

const GRADIENT_ORDER: f64 = 1.9;
const HESSIAN_ORDER: f64 = 2.85;
const TANGENT_ORDER: f64 = 1.9;

/// Observed convergence orders.
#[derive(Clone, Copy, Debug)]
pub struct VerifyReport {
    /// Gradient remainder order
    pub gradient: f64,
    /// Hessian remainder order
    pub hessian: f64,
    /// Tangent-linear remainder order
    pub tangent: f64,
}

impl VerifyReport {
    fn check(&self) -> std::result::Result<(), CliError> {
        let checks = [
            ("gradient", self.gradient, GRADIENT_ORDER),
            ("hessian", self.hessian, HESSIAN_ORDER),
            ("tangent-linear", self.tangent, TANGENT_ORDER),
        ];
        for (check, order, expected) in checks {
            if order < expected {
                return Err(CliError::VerificationFailed {
                    check,
                    order,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Runs all three Taylor tests.
pub fn verify_model(model: &DiffusionModel, seed: u64) -> Result<VerifyReport> {
    let m = model.parameter();
    let forward = |manager: &mut EquationManager, m: &Variable| model.run(manager, m);

    let (j, dj) = gradient(forward, &m)?;
    info!(j, "Gradient computed");
    let gradient_order = taylor_test(forward, &m, j, &dj, None, seed)?;

    let dm = random_direction(&m, seed);
    let (j, dj, ddj) = hessian_action(forward, &m, &dm)?;
    let hessian_order = taylor_test(forward, &m, j, &dj, Some(&ddj), seed)?;

    let tangent_order = taylor_test_tlm(forward, &m, seed)?;

    Ok(VerifyReport {
        gradient: gradient_order,
        hessian: hessian_order,
        tangent: tangent_order,
    })
}

/// Runs the verify command.
pub fn run(config: &CliConfig) -> Result<()> {
    let model = DiffusionModel::new(&config.model);
    let report = verify_model(&model, config.model.seed)?;

    println!("========================================");
    println!("Taylor Remainder Verification");
    println!("========================================");
    println!("{:<16} {:>10} {:>10}", "Check", "Order", "Expected");
    println!("----------------------------------------");
    println!("{:<16} {:>10.4} {:>10}", "gradient", report.gradient, GRADIENT_ORDER);
    println!("{:<16} {:>10.4} {:>10}", "hessian", report.hessian, HESSIAN_ORDER);
    println!("{:<16} {:>10.4} {:>10}", "tangent-linear", report.tangent, TANGENT_ORDER);

    report.check()?;
    println!("All checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    #[test]
    fn test_small_model_verifies() {
        let model = DiffusionModel::new(&ModelConfig {
            size: 4,
            steps: 3,
            ..ModelConfig::default()
        });
        let report = verify_model(&model, 11).unwrap();
        report.check().unwrap();
    }

    #[test]
    fn test_low_order_rejected() {
        let report = VerifyReport {
            gradient: 2.0,
            hessian: 1.0,
            tangent: 2.0,
        };
        assert!(matches!(
            report.check(),
            Err(CliError::VerificationFailed { check: "hessian", .. })
        ));
    }
}
