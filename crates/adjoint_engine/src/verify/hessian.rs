//! First and second derivatives of a forward model.

use adjoint_core::Variable;

use crate::error::AdjointResult;
use crate::manager::EquationManager;

/// Records `forward` at `m` and returns `(J, dJ/dm)`.
pub fn gradient<F>(mut forward: F, m: &Variable) -> AdjointResult<(f64, Variable)>
where
    F: FnMut(&mut EquationManager, &Variable) -> AdjointResult<Variable>,
{
    let mut manager = EquationManager::new();
    manager.start()?;
    let j = forward(&mut manager, m)?;
    manager.stop();
    let gradients = manager.compute_gradient(&[&j], &[m])?;
    Ok((j.sum(), gradients[0][0].clone()))
}

/// Computes `(J, dJ/dm, H dm)` at `m`.
///
/// The model is recorded once with the tangent-linear direction `dm`
/// registered; one reverse sweep then differentiates both `J` and its
/// tangent `dJ/dm · dm`, whose gradient is the Hessian action.
///
/// # Example
///
/// ```
/// use adjoint_core::{InnerProductSolver, Variable};
/// use adjoint_engine::verify::hessian_action;
/// use adjoint_engine::{AdjointResult, EquationManager};
///
/// // J = (m·m)², H = 8 m mᵀ + 4 |m|² I
/// fn forward(manager: &mut EquationManager, m: &Variable) -> AdjointResult<Variable> {
///     let s = Variable::new("s", 1);
///     let j = Variable::new("j", 1);
///     manager.solve(InnerProductSolver::norm_sq(&s, m)?)?;
///     manager.solve(InnerProductSolver::norm_sq(&j, &s)?)?;
///     Ok(j)
/// }
///
/// let m = Variable::with_values("m", vec![1.0, 0.0]);
/// let dm = Variable::with_values("dm", vec![1.0, 0.0]);
/// let (j, dj, ddj) = hessian_action(forward, &m, &dm).unwrap();
/// assert_eq!(j, 1.0);
/// assert_eq!(dj.to_vec(), vec![4.0, 0.0]);
/// assert_eq!(ddj.to_vec(), vec![12.0, 0.0]);
/// ```
pub fn hessian_action<F>(
    mut forward: F,
    m: &Variable,
    dm: &Variable,
) -> AdjointResult<(f64, Variable, Variable)>
where
    F: FnMut(&mut EquationManager, &Variable) -> AdjointResult<Variable>,
{
    let mut manager = EquationManager::new();
    manager.add_tlm(&[m], &[dm])?;
    manager.start()?;
    let j = forward(&mut manager, m)?;
    manager.stop();
    let tangent = manager.tlm(&j)?;
    let gradients = manager.compute_gradient(&[&j, &tangent], &[m])?;
    Ok((j.sum(), gradients[0][0].clone(), gradients[1][0].clone()))
}
