//! Benchmarks for the horizon optimizers.
//!
//! Run with: cargo bench -p control-optimize

#![allow(missing_docs, clippy::unwrap_used)]

use control_optimize::{
    BarrierConfig, BarrierFilter, ConvexConfig, ConvexHorizonSolver, HeuristicConfig,
    HorizonProblem, SafetyHeuristicSolver,
};
use control_types::{
    Control, CostWeights, MotionLimits, ObstacleObservation, Plant, SafetyParams, State, Workspace,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};

fn plant() -> Plant {
    Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-0.5, 1.5)).unwrap()
}

fn problem() -> HorizonProblem {
    HorizonProblem::new(
        State::new(Point3::new(0.3, 0.3, 0.3), Vector3::new(0.2, 0.2, 0.2)),
        State::at_rest(Point3::new(1.0, 1.0, 1.0)),
        ObstacleObservation::point(Point3::new(0.5, 0.5, 0.5)),
        0.05,
    )
}

fn bench_convex(c: &mut Criterion) {
    let mut group = c.benchmark_group("convex_horizon");
    let problem = problem();

    for horizon in [5, 10, 20] {
        let solver = ConvexHorizonSolver::new(
            plant(),
            CostWeights::default(),
            ConvexConfig::default().with_horizon(horizon),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("solve", horizon), &problem, |b, p| {
            b.iter(|| black_box(solver.solve_horizon(&p.state, &p.target)));
        });
    }

    group.finish();
}

fn bench_heuristic(c: &mut Criterion) {
    let mut group = c.benchmark_group("safety_heuristic");
    let problem = problem();

    for (name, config) in [
        ("default", HeuristicConfig::default()),
        ("realtime", HeuristicConfig::realtime()),
    ] {
        let mut solver =
            SafetyHeuristicSolver::new(plant(), CostWeights::default(), SafetyParams::default(), config)
                .unwrap();

        group.bench_function(name, |b| {
            b.iter(|| black_box(solver.solve_safe_horizon(&problem)));
        });
    }

    group.finish();
}

fn bench_barrier(c: &mut Criterion) {
    let filter = BarrierFilter::new(MotionLimits::new(1.0, 0.5), BarrierConfig::default()).unwrap();
    let obstacle = ObstacleObservation::point(Point3::origin());
    let state = State::new(Point3::new(-0.6, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0));

    c.bench_function("barrier_filter/correction", |b| {
        b.iter(|| {
            black_box(filter.filter_control(&state, &Control::new(1.0, 0.0, 0.0), &obstacle, 0.2))
        });
    });

    c.bench_function("barrier_filter/pass_through", |b| {
        b.iter(|| {
            black_box(filter.filter_control(&state, &Control::new(-1.0, 0.0, 0.0), &obstacle, 0.2))
        });
    });
}

criterion_group!(benches, bench_convex, bench_heuristic, bench_barrier);
criterion_main!(benches);
