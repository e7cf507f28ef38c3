//! Taylor remainder orders of gradients, Hessian actions and the
//! tangent-linear model for a nonlinear time-dependent model.

use adjoint_checkpoint::ScheduleConfig;
use adjoint_core::math::DenseMatrix;
use adjoint_core::{InnerProductSolver, LinearSystemBuilder, Variable};
use adjoint_engine::verify::{
    gradient, hessian_action, random_direction, taylor_test, taylor_test_tlm,
};
use adjoint_engine::{AdjointResult, EquationManager, Functional, ManagerConfig};

/// `(A + diag(m)) u_{n+1} = u_n + 0.1 u_n ⊙ u_n`,
/// `J = Σ_n u_n · u_n`.
fn forward(manager: &mut EquationManager, m: &Variable) -> AdjointResult<Variable> {
    let a = DenseMatrix::tridiagonal(3, -0.5, 2.0, -0.5);
    let mut u = Variable::new_static("u_0", vec![1.0, 0.5, 0.25]);
    let mut functional = Functional::new("J");
    for step in 0..3 {
        let next = Variable::new(format!("u_{}", step + 1), 3);
        manager.solve(
            LinearSystemBuilder::new(a.clone())
                .with_coefficient(m)
                .with_term(1.0, &u)
                .with_product(0.1, &u, m)
                .build(&next)?,
        )?;
        let term = Variable::new("term", 1);
        manager.solve(InnerProductSolver::norm_sq(&term, &next)?)?;
        functional.addto(manager, &term)?;
        manager.new_block()?;
        u = next;
    }
    Ok(functional.variable().clone())
}

fn parameter() -> Variable {
    Variable::with_values("m", vec![0.3, 0.7, 1.1])
}

#[test]
fn test_gradient_second_order() {
    let m = parameter();
    let (j, dj) = gradient(forward, &m).unwrap();
    let order = taylor_test(forward, &m, j, &dj, None, 17).unwrap();
    assert!(order > 1.9, "order {}", order);
}

#[test]
fn test_hessian_third_order() {
    let m = parameter();
    let dm = random_direction(&m, 17);
    let (j, dj, ddj) = hessian_action(forward, &m, &dm).unwrap();
    let order = taylor_test(forward, &m, j, &dj, Some(&ddj), 17).unwrap();
    assert!(order > 2.85, "order {}", order);
}

#[test]
fn test_tangent_linear_second_order() {
    let order = taylor_test_tlm(forward, &parameter(), 23).unwrap();
    assert!(order > 1.9, "order {}", order);
}

#[test]
fn test_checkpointed_gradient_second_order() {
    let m = parameter();
    let config = ManagerConfig::default().with_schedule(ScheduleConfig::Binomial {
        blocks: 3,
        snapshots_in_ram: 1,
        snapshots_on_disk: 0,
    });
    let mut manager = EquationManager::from_config(config).unwrap();
    manager.start().unwrap();
    let j = forward(&mut manager, &m).unwrap();
    let dj = manager.compute_gradient(&[&j], &[&m]).unwrap();
    let order = taylor_test(forward, &m, j.value(), &dj[0][0], None, 29).unwrap();
    assert!(order > 1.9, "order {}", order);
}
