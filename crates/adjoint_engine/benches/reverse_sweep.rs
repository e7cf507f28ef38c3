//! Benchmarks for the reverse sweep under different checkpoint schedules.

use std::rc::Rc;

use adjoint_checkpoint::ScheduleConfig;
use adjoint_core::math::DenseMatrix;
use adjoint_core::{AssignmentSolver, InnerProductSolver, LinearSystemBuilder, Variable};
use adjoint_engine::{EquationManager, ManagerConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const N: usize = 32;

/// Implicit diffusion, one block per step.
fn record(manager: &mut EquationManager, m: &Variable, steps: usize) -> Variable {
    let a = Rc::new(DenseMatrix::tridiagonal(N, -1.0, 2.5, -1.0));
    let mut u = Variable::new("u_0", N);
    manager.solve(AssignmentSolver::new(&u, m).unwrap()).unwrap();
    manager.new_block().unwrap();
    for step in 0..steps {
        let next = Variable::new(format!("u_{}", step + 1), N);
        let eq = LinearSystemBuilder::new(a.clone())
            .with_coefficient(m)
            .with_term(1.0, &u)
            .build(&next)
            .unwrap();
        manager.solve(eq).unwrap();
        manager.new_block().unwrap();
        u = next;
    }
    let j = Variable::new("j", 1);
    manager.solve(InnerProductSolver::norm_sq(&j, &u).unwrap()).unwrap();
    j
}

fn gradient(config: &ManagerConfig, steps: usize) -> Vec<f64> {
    let m = Variable::with_values("m", (0..N).map(|i| 0.1 + 0.01 * i as f64).collect());
    let mut manager = EquationManager::from_config(config.clone()).unwrap();
    manager.start().unwrap();
    let j = record(&mut manager, &m, steps);
    manager.stop();
    let dj = manager.compute_gradient(&[&j], &[&m]).unwrap();
    dj[0][0].to_vec()
}

fn benchmark_memory_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse_sweep_memory");
    let config = ManagerConfig::default();
    for steps in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            b.iter(|| gradient(black_box(&config), steps))
        });
    }
    group.finish();
}

fn benchmark_binomial_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse_sweep_binomial");
    for steps in [10, 50, 100] {
        for snapshots in [2, 5] {
            let config = ManagerConfig::default().with_schedule(ScheduleConfig::Binomial {
                blocks: steps + 2,
                snapshots_in_ram: snapshots,
                snapshots_on_disk: 0,
            });
            group.bench_with_input(
                BenchmarkId::new(format!("snapshots_{}", snapshots), steps),
                &steps,
                |b, &steps| b.iter(|| gradient(black_box(&config), steps)),
            );
        }
    }
    group.finish();
}

fn benchmark_annotation(c: &mut Criterion) {
    let m = Variable::with_values("m", vec![0.1; N]);
    c.bench_function("annotate_100_steps", |b| {
        b.iter(|| {
            let mut manager = EquationManager::new();
            manager.start().unwrap();
            black_box(record(&mut manager, &m, 100))
        })
    });
}

criterion_group!(
    benches,
    benchmark_memory_schedule,
    benchmark_binomial_schedule,
    benchmark_annotation
);
criterion_main!(benches);
