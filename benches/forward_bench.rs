use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use normprod::core::{DistributionPair, EngineConfig, MonteCarloConfig};
use normprod::engines::{ForwardCdfEngine, InverseCdfSolver};
use normprod::mc::MonteCarloValidator;
use rayon::ThreadPoolBuilder;
use std::hint::black_box;

fn reference_pair() -> DistributionPair {
    DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).expect("reference pair should be valid")
}

fn bench_forward(c: &mut Criterion) {
    let engine = ForwardCdfEngine::default();
    let mut group = c.benchmark_group("forward_cdf");

    let cases = [
        ("positive_domain", DistributionPair::new(100.0, 5.0, 30.0, 1.6).expect("valid pair"), 3_100.0),
        ("reference_node", reference_pair(), 3_633.0),
        ("straddles_zero", DistributionPair::new(20.0, 30.0, 300.0, 150.0).expect("valid pair"), 6_000.0),
    ];
    for (name, pair, threshold) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(engine.evaluate(black_box(&pair), black_box(threshold)).probability))
        });
    }
    group.finish();
}

fn bench_inverse(c: &mut Criterion) {
    let mut cfg = EngineConfig::default();
    cfg.solver.verification_samples = 0;
    let solver = InverseCdfSolver::from_config(&cfg);
    let pair = reference_pair();
    let mut group = c.benchmark_group("inverse_cdf");
    group.sample_size(20);

    for p in [0.5_f64, 0.98] {
        group.bench_with_input(BenchmarkId::new("target", p), &p, |b, &p| {
            b.iter(|| {
                let sol = solver.solve(black_box(&pair), black_box(p)).expect("valid target");
                black_box(sol.threshold)
            })
        });
    }
    group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
    let pair = reference_pair();
    let validator = MonteCarloValidator::new(MonteCarloConfig::default());
    let mut group = c.benchmark_group("monte_carlo_1m");
    group.sample_size(10);

    for threads in [1_usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("rayon_threads", threads), &threads, |b, &threads| {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .expect("thread pool should build");
            b.iter(|| black_box(pool.install(|| validator.estimate(&pair, 3_633.0, 1_000_000))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_forward, bench_inverse, bench_monte_carlo);
criterion_main!(benches);
