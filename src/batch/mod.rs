//! Bounded-concurrency batch evaluation over a table of network nodes.
//!
//! Every [`ParameterCell`] spawns two independent tasks on a dedicated rayon pool:
//!
//! | mode                         | primary view task             | secondary task                       |
//! |------------------------------|-------------------------------|--------------------------------------|
//! | [`BatchMode::ThresholdsAndDeviations`] | inverse threshold at the target probability | `sigma_z` of the secondary view |
//! | [`BatchMode::Probabilities`] | `P(Z <= reorder_threshold)`   | reference-view `P(Z <= reference_threshold)` |
//!
//! An [`AdmissionGate`] is acquired on the dispatching thread before each spawn, so at
//! most `max_concurrency` tasks are in flight. Each task writes only the result slot
//! it owns. A task that errors or panics is isolated: its slot is zeroed with
//! [`CellStatus::Failed`] and an `error!` event carries the cell coordinates and
//! parameters. When all tasks finish, the cells are committed to a
//! [`SharedResultBuffer`] under one lock.
//!
//! # Examples
//! ```rust
//! use normprod::batch::{BatchMode, BatchScheduler, ParameterRecord, SharedResultBuffer};
//! use normprod::core::EngineConfig;
//!
//! let mut cfg = EngineConfig::default();
//! cfg.solver.verification_samples = 0;
//! cfg.batch.max_concurrency = 4;
//! let scheduler = BatchScheduler::new(cfg).unwrap();
//!
//! let record = ParameterRecord {
//!     mu_x: Some(100.0),
//!     sigma_x: Some(20.0),
//!     mu_x_secondary: Some(90.0),
//!     sigma_x_secondary: Some(15.0),
//!     mu_y: Some(30.0),
//!     sigma_y: Some(2.0),
//!     ..ParameterRecord::default()
//! };
//! let mut cells = vec![record.into_cell()];
//! let buffer = SharedResultBuffer::default();
//! let summary = scheduler.run(&mut cells, BatchMode::ThresholdsAndDeviations, &buffer);
//! assert_eq!(summary.failed, 0);
//! assert_eq!(buffer.rows().len(), 1);
//! ```

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

pub mod gate;
pub mod table;

pub use gate::{AdmissionGate, Permit};
pub use table::{
    JsonParameterSource, JsonResultSink, MemorySink, ParameterRecord, ParameterSource, ResultRow,
    ResultSink,
};

use crate::core::{BatchConfig, DistributionPair, EngineConfig, EngineError};
use crate::engines::{ForwardCdfEngine, InverseCdfSolver};

/// Which pair of quantities a run computes. Modes are exclusive per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    ThresholdsAndDeviations,
    Probabilities,
}

/// Position of a cell in the external table.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct CellAddress {
    pub sheet: String,
    pub row: usize,
    pub column: usize,
}

/// Sanitized numeric inputs of one cell. Three pair views share `mu_y`.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct CellInputs {
    pub mu_x: f64,
    pub sigma_x: f64,
    pub mu_x_secondary: f64,
    pub sigma_x_secondary: f64,
    pub mu_y: f64,
    pub sigma_y: f64,
    pub mu_x_reference: f64,
    pub sigma_x_reference: f64,
    pub sigma_y_reference: f64,
    pub reorder_threshold: f64,
    pub reference_threshold: f64,
}

/// Unvalidated `(mu_x, sigma_x, mu_y, sigma_y)` of one view.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewParams {
    mu_x: f64,
    sigma_x: f64,
    mu_y: f64,
    sigma_y: f64,
}

impl ViewParams {
    fn pair(self) -> Result<DistributionPair, EngineError> {
        DistributionPair::new(self.mu_x, self.sigma_x, self.mu_y, self.sigma_y)
    }
}

impl CellInputs {
    fn primary_view(&self) -> ViewParams {
        ViewParams {
            mu_x: self.mu_x,
            sigma_x: self.sigma_x,
            mu_y: self.mu_y,
            sigma_y: self.sigma_y,
        }
    }

    fn secondary_view(&self) -> ViewParams {
        ViewParams {
            mu_x: self.mu_x_secondary,
            sigma_x: self.sigma_x_secondary,
            ..self.primary_view()
        }
    }

    fn reference_view(&self) -> ViewParams {
        ViewParams {
            mu_x: self.mu_x_reference,
            sigma_x: self.sigma_x_reference,
            mu_y: self.mu_y,
            sigma_y: self.sigma_y_reference,
        }
    }

    /// View the given task reads in `mode`.
    fn task_view(&self, mode: BatchMode, kind: TaskKind) -> ViewParams {
        match (mode, kind) {
            (_, TaskKind::Primary) => self.primary_view(),
            (BatchMode::ThresholdsAndDeviations, TaskKind::Secondary) => self.secondary_view(),
            (BatchMode::Probabilities, TaskKind::Secondary) => self.reference_view(),
        }
    }

    /// `(mu_x, sigma_x, mu_y, sigma_y)`.
    pub fn primary(&self) -> Result<DistributionPair, EngineError> {
        self.primary_view().pair()
    }

    /// `(mu_x_secondary, sigma_x_secondary, mu_y, sigma_y)`.
    pub fn secondary(&self) -> Result<DistributionPair, EngineError> {
        self.secondary_view().pair()
    }

    /// `(mu_x_reference, sigma_x_reference, mu_y, sigma_y_reference)`.
    pub fn reference(&self) -> Result<DistributionPair, EngineError> {
        self.reference_view().pair()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    #[default]
    Pending,
    Ok,
    /// Computed through a fallback path.
    Degraded,
    /// Task errored or panicked; value is `0.0`.
    Failed,
}

impl CellStatus {
    fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Degraded => 1,
            Self::Pending => 2,
            Self::Failed => 3,
        }
    }
}

/// Value written by one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct TaskOutput {
    pub value: f64,
    pub status: CellStatus,
}

impl TaskOutput {
    fn failed() -> Self {
        Self {
            value: 0.0,
            status: CellStatus::Failed,
        }
    }
}

/// Result slots of one cell. The two slots are written by different tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct CellResults {
    pub primary: TaskOutput,
    pub secondary: TaskOutput,
}

impl CellResults {
    /// Worst status of the two slots.
    pub fn status(&self) -> CellStatus {
        if self.primary.status.severity() >= self.secondary.status.severity() {
            self.primary.status
        } else {
            self.secondary.status
        }
    }
}

/// One node of the network plus the bookkeeping to write its results back.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParameterCell {
    pub address: CellAddress,
    pub inputs: CellInputs,
    pub results: CellResults,
}

impl ParameterCell {
    pub fn new(address: CellAddress, inputs: CellInputs) -> Self {
        Self {
            address,
            inputs,
            results: CellResults::default(),
        }
    }

    pub fn to_row(&self, mode: BatchMode) -> ResultRow {
        let (p, s) = (self.results.primary.value, self.results.secondary.value);
        let (threshold, std_dev, probability, reference_probability) = match mode {
            BatchMode::ThresholdsAndDeviations => (Some(p), Some(s), None, None),
            BatchMode::Probabilities => (None, None, Some(p), Some(s)),
        };
        ResultRow {
            address: self.address.clone(),
            threshold,
            std_dev,
            probability,
            reference_probability,
            status: self.results.status(),
        }
    }
}

/// Committed rows of every batch run against it, in commit order.
///
/// Writes that span many cells go through a single lock. One commit adds exactly one
/// row per cell, even when cells share an address; it replaces rows that earlier
/// commits left at any of its addresses.
#[derive(Debug, Default)]
pub struct SharedResultBuffer {
    rows: Mutex<Vec<ResultRow>>,
}

impl SharedResultBuffer {
    pub fn commit(&self, cells: &[ParameterCell], mode: BatchMode) {
        let fresh: Vec<ResultRow> = cells.iter().map(|cell| cell.to_row(mode)).collect();
        let addresses: BTreeSet<&CellAddress> = fresh.iter().map(|row| &row.address).collect();

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.retain(|row| !addresses.contains(&row.address));
        rows.extend(fresh.iter().cloned());
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub cells: usize,
    pub ok: usize,
    pub degraded: usize,
    pub failed: usize,
    /// Highest number of tasks in flight during this run. Runs that overlap on one
    /// scheduler share its gate and see each other's tasks.
    pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Primary,
    Secondary,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs `task` with panics and errors converted into a failed slot. `view` is what
/// the task read, for the log event.
fn isolate<F>(address: &CellAddress, view: ViewParams, kind: TaskKind, task: F) -> TaskOutput
where
    F: FnOnce() -> Result<TaskOutput, EngineError>,
{
    let err = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(output)) => return output,
        Ok(Err(err)) => err,
        Err(payload) => EngineError::TaskFailed(panic_message(payload.as_ref())),
    };
    error!(
        sheet = %address.sheet,
        row = address.row,
        column = address.column,
        task = ?kind,
        mu_x = view.mu_x,
        sigma_x = view.sigma_x,
        mu_y = view.mu_y,
        sigma_y = view.sigma_y,
        error = %err,
        "cell task failed"
    );
    TaskOutput::failed()
}

/// Dispatches cell tasks on a dedicated pool behind an [`AdmissionGate`].
#[derive(Debug)]
pub struct BatchScheduler {
    solver: InverseCdfSolver,
    config: BatchConfig,
    gate: AdmissionGate,
    pool: rayon::ThreadPool,
}

impl BatchScheduler {
    /// Validates `config` and starts the worker pool.
    ///
    /// # Errors
    /// [`EngineError::InvalidConfig`] for an invalid config or when the pool cannot be
    /// built.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let batch = config.batch;
        let threads = if batch.worker_threads == 0 {
            let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
            batch.max_concurrency.min(cores)
        } else {
            batch.worker_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("normprod-worker-{i}"))
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("worker pool: {e}")))?;

        Ok(Self {
            solver: InverseCdfSolver::from_config(&config),
            config: batch,
            gate: AdmissionGate::new(batch.max_concurrency),
            pool,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn forward(&self) -> &ForwardCdfEngine {
        self.solver.forward()
    }

    fn compute(&self, kind: TaskKind, mode: BatchMode, inputs: &CellInputs) -> Result<TaskOutput, EngineError> {
        match (mode, kind) {
            (BatchMode::ThresholdsAndDeviations, TaskKind::Primary) => {
                let pair = inputs.task_view(mode, kind).pair()?;
                let solution = self.solver.solve(&pair, self.config.target_probability)?;
                Ok(TaskOutput {
                    value: solution.threshold,
                    status: if solution.degraded() { CellStatus::Degraded } else { CellStatus::Ok },
                })
            }
            (BatchMode::ThresholdsAndDeviations, TaskKind::Secondary) => Ok(TaskOutput {
                value: inputs.task_view(mode, kind).pair()?.std_dev(),
                status: CellStatus::Ok,
            }),
            (BatchMode::Probabilities, TaskKind::Primary) => {
                let pair = inputs.task_view(mode, kind).pair()?;
                Ok(self.probability(&pair, inputs.reorder_threshold))
            }
            (BatchMode::Probabilities, TaskKind::Secondary) => {
                let pair = inputs.task_view(mode, kind).pair()?;
                Ok(self.probability(&pair, inputs.reference_threshold))
            }
        }
    }

    fn probability(&self, pair: &DistributionPair, c: f64) -> TaskOutput {
        let r = self.forward().evaluate(pair, c);
        TaskOutput {
            value: r.probability,
            status: if r.degraded { CellStatus::Degraded } else { CellStatus::Ok },
        }
    }

    /// Computes a single cell on the calling thread, outside the pool and the gate.
    pub fn evaluate_cell(&self, cell: &ParameterCell, mode: BatchMode) -> CellResults {
        let run = |kind| {
            let view = cell.inputs.task_view(mode, kind);
            isolate(&cell.address, view, kind, || self.compute(kind, mode, &cell.inputs))
        };
        CellResults {
            primary: run(TaskKind::Primary),
            secondary: run(TaskKind::Secondary),
        }
    }

    /// Fills every cell's result slots, then commits all cells to `buffer`.
    ///
    /// Always completes with one result per cell; failures are isolated per task.
    pub fn run(&self, cells: &mut [ParameterCell], mode: BatchMode, buffer: &SharedResultBuffer) -> BatchSummary {
        info!(
            cells = cells.len(),
            ?mode,
            max_concurrency = self.gate.limit(),
            threads = self.worker_threads(),
            "batch started"
        );

        self.gate.reset_peak();
        self.pool.in_place_scope(|scope| {
            for cell in cells.iter_mut() {
                let ParameterCell {
                    address,
                    inputs,
                    results,
                } = cell;
                let (address, inputs) = (&*address, &*inputs);
                let CellResults { primary, secondary } = results;

                for (kind, slot) in [(TaskKind::Primary, primary), (TaskKind::Secondary, secondary)] {
                    let permit = self.gate.acquire();
                    scope.spawn(move |_| {
                        let _permit = permit;
                        let view = inputs.task_view(mode, kind);
                        *slot = isolate(address, view, kind, || self.compute(kind, mode, inputs));
                    });
                }
            }
        });

        let mut summary = BatchSummary {
            cells: cells.len(),
            peak_in_flight: self.gate.peak(),
            ..BatchSummary::default()
        };
        for cell in cells.iter() {
            match cell.results.status() {
                CellStatus::Ok => summary.ok += 1,
                CellStatus::Degraded => summary.degraded += 1,
                CellStatus::Failed | CellStatus::Pending => summary.failed += 1,
            }
        }

        buffer.commit(cells, mode);
        info!(
            cells = summary.cells,
            ok = summary.ok,
            degraded = summary.degraded,
            failed = summary.failed,
            "batch committed"
        );
        summary
    }

    /// Loads records from `source`, runs them, and writes the committed rows to `sink`.
    pub fn run_with<S, K>(&self, source: &mut S, sink: &mut K, mode: BatchMode) -> Result<BatchSummary, EngineError>
    where
        S: ParameterSource + ?Sized,
        K: ResultSink + ?Sized,
    {
        let mut cells: Vec<ParameterCell> = source.load()?.into_iter().map(ParameterRecord::into_cell).collect();
        let buffer = SharedResultBuffer::default();
        let summary = self.run(&mut cells, mode, &buffer);
        sink.write_batch(&buffer.rows())?;
        Ok(summary)
    }
}
