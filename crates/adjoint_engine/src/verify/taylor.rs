//! Taylor remainder convergence tests.

use adjoint_core::Variable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::AdjointResult;
use crate::manager::EquationManager;

/// Number of perturbation sizes, `ε = 2⁻ᵏ · 10⁻²` for `k = 0..PERTURBATIONS`.
pub const PERTURBATIONS: usize = 5;

fn epsilons() -> impl Iterator<Item = f64> {
    (0..PERTURBATIONS).map(|k| 1.0e-2 * 0.5f64.powi(k as i32))
}

/// Direction shaped like `like` with components uniform in `[-1, 1)`.
///
/// Deterministic for a given `seed`.
pub fn random_direction(like: &Variable, seed: u64) -> Variable {
    let mut rng = StdRng::seed_from_u64(seed);
    let values = (0..like.len()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Variable::with_values(format!("d{}", like.name()), values)
}

/// Evaluates the model at `m + eps * dm` without recording.
fn perturbed<F>(forward: &mut F, m: &Variable, dm: &Variable, eps: f64) -> AdjointResult<f64>
where
    F: FnMut(&mut EquationManager, &Variable) -> AdjointResult<Variable>,
{
    let mut manager = EquationManager::new();
    let m_perturbed = m.copy();
    m_perturbed.axpy(eps, dm)?;
    Ok(forward(&mut manager, &m_perturbed)?.sum())
}

/// Minimum observed order between successive remainders.
///
/// Pairs where either remainder is zero carry no information and are
/// skipped; if none is left the result is infinite.
fn min_order(remainders: &[f64]) -> f64 {
    remainders
        .windows(2)
        .filter(|pair| pair[0] > 0.0 && pair[1] > 0.0)
        .map(|pair| (pair[0] / pair[1]).log2())
        .fold(f64::INFINITY, f64::min)
}

/// Taylor remainder test of a gradient, and optionally of a Hessian
/// action.
///
/// # Arguments
///
/// * `forward` - The model
/// * `m` - Parameter
/// * `j_val` - Functional value at `m`
/// * `dj` - Gradient at `m`
/// * `ddj` - Hessian action at `m` on `random_direction(m, seed)`
/// * `seed` - Seed of the perturbation direction
///
/// # Returns
///
/// The minimum order observed; close to 2 for a correct gradient, 3 with a
/// correct Hessian action.
pub fn taylor_test<F>(
    mut forward: F,
    m: &Variable,
    j_val: f64,
    dj: &Variable,
    ddj: Option<&Variable>,
    seed: u64,
) -> AdjointResult<f64>
where
    F: FnMut(&mut EquationManager, &Variable) -> AdjointResult<Variable>,
{
    let dm = random_direction(m, seed);
    let first = dj.inner(&dm)?;
    let second = ddj.map(|h| h.inner(&dm)).transpose()?;

    let mut remainders = Vec::with_capacity(PERTURBATIONS);
    for eps in epsilons() {
        let j = perturbed(&mut forward, m, &dm, eps)?;
        let mut remainder = j - j_val - eps * first;
        if let Some(second) = second {
            remainder -= 0.5 * eps * eps * second;
        }
        remainders.push(remainder.abs());
    }
    let order = min_order(&remainders);
    debug!(?remainders, order, "Taylor test");
    Ok(order)
}

/// Taylor remainder test of the tangent-linear model.
///
/// Runs `forward` once with a tangent-linear direction registered and
/// compares `J(m + ε dm) - J(m)` with `ε` times the tangent of `J`.
pub fn taylor_test_tlm<F>(mut forward: F, m: &Variable, seed: u64) -> AdjointResult<f64>
where
    F: FnMut(&mut EquationManager, &Variable) -> AdjointResult<Variable>,
{
    let dm = random_direction(m, seed);
    let mut manager = EquationManager::new();
    manager.add_tlm(&[m], &[&dm])?;
    manager.start_with(false, true)?;
    let j = forward(&mut manager, m)?;
    manager.stop();
    let j_val = j.sum();
    let tangent = manager.tlm(&j)?.sum();

    let mut remainders = Vec::with_capacity(PERTURBATIONS);
    for eps in epsilons() {
        let j = perturbed(&mut forward, m, &dm, eps)?;
        remainders.push((j - j_val - eps * tangent).abs());
    }
    let order = min_order(&remainders);
    debug!(?remainders, order, "Tangent-linear Taylor test");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_core::InnerProductSolver;

    fn quartic(manager: &mut EquationManager, m: &Variable) -> AdjointResult<Variable> {
        let s = Variable::new("s", 1);
        let j = Variable::new("j", 1);
        manager.solve(InnerProductSolver::norm_sq(&s, m)?)?;
        manager.solve(InnerProductSolver::norm_sq(&j, &s)?)?;
        Ok(j)
    }

    #[test]
    fn test_random_direction_deterministic() {
        let m = Variable::new("m", 4);
        let a = random_direction(&m, 7);
        let b = random_direction(&m, 7);
        let c = random_direction(&m, 8);
        assert_eq!(a.to_vec(), b.to_vec());
        assert_ne!(a.to_vec(), c.to_vec());
        assert!(a.to_vec().iter().all(|v| (-1.0..1.0).contains(v)));
        assert_eq!(a.name(), "dm");
    }

    #[test]
    fn test_min_order() {
        assert_eq!(min_order(&[8.0, 2.0, 0.5]), 2.0);
        assert_eq!(min_order(&[0.0, 0.0]), f64::INFINITY);
    }

    #[test]
    fn test_wrong_gradient_fails() {
        let m = Variable::with_values("m", vec![1.0, -0.5]);
        let wrong = Variable::with_values("dj", vec![1.0, 1.0]);
        let j = {
            let mut manager = EquationManager::new();
            quartic(&mut manager, &m).unwrap().value()
        };
        let order = taylor_test(quartic, &m, j, &wrong, None, 3).unwrap();
        assert!(order < 1.5);
    }

    #[test]
    fn test_tangent_linear_order() {
        let m = Variable::with_values("m", vec![1.0, -0.5, 0.25]);
        let order = taylor_test_tlm(quartic, &m, 11).unwrap();
        assert!(order > 1.9, "order {}", order);
    }
}
