use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use normprod::batch::{
    BatchMode, BatchScheduler, CellStatus, JsonParameterSource, MemorySink, ParameterCell,
    ParameterRecord, SharedResultBuffer,
};
use normprod::core::EngineConfig;

fn config(max_concurrency: usize) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.batch.max_concurrency = max_concurrency;
    cfg.solver.verification_samples = 2_000;
    cfg.monte_carlo.chunk_size = 512;
    cfg
}

fn random_cells(n: usize, seed: u64) -> Vec<ParameterCell> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let mu_x = rng.random_range(20.0..200.0);
            let sigma_x = rng.random_range(1.0..60.0);
            let mu_y = rng.random_range(5.0..40.0);
            let sigma_y = rng.random_range(0.2..6.0);
            ParameterRecord {
                sheet: format!("Plan{}", i % 3),
                row: i / 10,
                column: i % 10,
                mu_x: Some(mu_x),
                // Every 97th cell carries an invalid scale.
                sigma_x: Some(if i % 97 == 13 { 0.0 } else { sigma_x }),
                mu_x_secondary: Some(mu_x * rng.random_range(0.5..1.5)),
                sigma_x_secondary: Some(sigma_x * rng.random_range(0.5..1.5)),
                mu_y: Some(mu_y),
                sigma_y: Some(sigma_y),
                mu_x_reference: Some(mu_x * rng.random_range(0.8..1.2)),
                sigma_x_reference: Some(sigma_x),
                sigma_y_reference: Some(sigma_y * 1.5),
                reorder_threshold: Some(mu_x * mu_y * rng.random_range(0.8..1.4)),
                reference_threshold: Some(mu_x * mu_y * rng.random_range(0.8..1.4)),
            }
            .into_cell()
        })
        .collect()
}

fn assert_matches_isolated(mode: BatchMode) {
    let scheduler = BatchScheduler::new(config(50)).unwrap();
    let mut cells = random_cells(1_000, 2024);
    let buffer = SharedResultBuffer::default();

    let summary = scheduler.run(&mut cells, mode, &buffer);

    assert_eq!(summary.cells, 1_000);
    assert_eq!(summary.ok + summary.degraded + summary.failed, 1_000);
    assert!(summary.peak_in_flight <= 50);
    assert_eq!(buffer.len(), 1_000);
    assert_eq!(scheduler.gate().in_flight(), 0);

    let rows = buffer.rows();
    for cell in &cells {
        let isolated = scheduler.evaluate_cell(cell, mode);
        assert_eq!(cell.results, isolated, "{:?}", cell.address);
        let row = rows
            .iter()
            .find(|r| r.address == cell.address)
            .expect("every cell is committed");
        assert_eq!(*row, cell.to_row(mode));
    }

    let failed: Vec<_> = cells
        .iter()
        .filter(|c| c.results.primary.status == CellStatus::Failed)
        .collect();
    assert!(!failed.is_empty());
    assert!(failed.iter().all(|c| c.results.primary.value == 0.0));
}

#[test]
fn thousand_thresholds_cells_match_isolated_runs() {
    assert_matches_isolated(BatchMode::ThresholdsAndDeviations);
}

#[test]
fn thousand_probability_cells_match_isolated_runs() {
    assert_matches_isolated(BatchMode::Probabilities);
}

#[test]
fn results_do_not_depend_on_concurrency_limit() {
    let mut narrow = random_cells(120, 9);
    let mut wide = narrow.clone();

    BatchScheduler::new(config(1)).unwrap().run(
        &mut narrow,
        BatchMode::Probabilities,
        &SharedResultBuffer::default(),
    );
    BatchScheduler::new(config(64)).unwrap().run(
        &mut wide,
        BatchMode::Probabilities,
        &SharedResultBuffer::default(),
    );
    assert_eq!(narrow, wide);
}

#[test]
fn json_records_run_end_to_end() {
    let json = r#"[
        { "sheet": "Plan1", "row": 2, "column": 5,
          "mu_x": 100.0, "sigma_x": 35.8305, "mu_y": 30.0, "sigma_y": 1.6433,
          "mu_x_secondary": 90.0, "sigma_x_secondary": 30.0 },
        { "sheet": "Plan1", "row": 3, "column": 5, "mu_x": "oops" }
    ]"#;
    let scheduler = BatchScheduler::new(config(4)).unwrap();
    let mut sink = MemorySink::default();

    // A record with a non-numeric field rejects the whole payload.
    let err = scheduler.run_with(
        &mut JsonParameterSource::new(json.as_bytes()),
        &mut sink,
        BatchMode::ThresholdsAndDeviations,
    );
    assert!(err.is_err());
    assert!(sink.batches.is_empty());

    let json = json.replace(r#""mu_x": "oops""#, r#""mu_x": null"#);
    let summary = scheduler
        .run_with(
            &mut JsonParameterSource::new(json.as_bytes()),
            &mut sink,
            BatchMode::ThresholdsAndDeviations,
        )
        .unwrap();
    assert_eq!(summary.cells, 2);
    assert_eq!(summary.failed, 1);
    let rows = &sink.batches[0];
    assert_eq!(rows[0].status, CellStatus::Ok);
    assert!(rows[0].threshold.unwrap() > 3_000.0);
    assert_eq!(rows[1].status, CellStatus::Failed);
    assert_eq!(rows[1].threshold, Some(0.0));
}
