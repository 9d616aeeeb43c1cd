use normprod::core::{DistributionPair, EngineConfig, SolveMethod};
use normprod::engines::InverseCdfSolver;

fn solver(verification_samples: usize) -> InverseCdfSolver {
    let mut cfg = EngineConfig::default();
    cfg.solver.verification_samples = verification_samples;
    InverseCdfSolver::from_config(&cfg)
}

#[test]
fn inverse_then_forward_recovers_target() {
    let solver = solver(0);
    let pairs = [
        DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).unwrap(),
        DistributionPair::new(20.0, 30.0, 300.0, 150.0).unwrap(),
        DistributionPair::new(-15.0, 4.0, 8.0, 2.0).unwrap(),
        DistributionPair::new(0.0, 1.0, 1.0, 1.0).unwrap(),
    ];
    for pair in pairs {
        for p in [0.02, 0.25, 0.5, 0.75, 0.98] {
            let sol = solver.solve(&pair, p).unwrap();
            let back = solver.forward().evaluate(&pair, sol.threshold).probability;
            assert!((back - p).abs() < 1e-3, "{pair:?} p={p}: {sol:?}");
            assert_eq!(sol.method, SolveMethod::Bracketed, "{pair:?} p={p}");
        }
    }
}

#[test]
fn thresholds_increase_with_target() {
    let solver = solver(0);
    let pair = DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).unwrap();
    let thresholds: Vec<f64> = [0.1, 0.5, 0.9, 0.98, 0.999]
        .iter()
        .map(|&p| solver.solve(&pair, p).unwrap().threshold)
        .collect();
    assert!(thresholds.windows(2).all(|w| w[0] < w[1]), "{thresholds:?}");
}

#[test]
fn monte_carlo_verification_agrees_at_service_level() {
    let solver = solver(1_000_000);
    let pair = DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).unwrap();
    let sol = solver.solve(&pair, 0.98).unwrap();
    let v = sol.verification.unwrap();
    assert!(v.abs_error < 5.0 * v.mc_stderr + 1e-4, "{v:?}");
    assert!(sol.threshold > pair.mean() + 2.0 * pair.std_dev());
}
