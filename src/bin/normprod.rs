//! Command-line front end for the product-of-normals engines.
//!
//! Reports are written as JSON to stdout (or `--output`); logs go to stderr and are
//! filtered with `RUST_LOG`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use normprod::analysis::{MomentComparison, RadicandAnalysis, RadicandTransform, compare_moments};
use normprod::batch::{BatchMode, BatchScheduler, JsonParameterSource, JsonResultSink};
use normprod::core::{DistributionPair, EngineConfig, EngineError, IntegrationResult, InverseSolution};
use normprod::engines::{ForwardCdfEngine, InverseCdfSolver, gaussian_approximation};
use normprod::mc::{Agreement, MonteCarloValidator};

#[derive(Parser, Debug)]
#[command(name = "normprod", version, about = "Product-of-normals CDF, inverse CDF and batch runner")]
struct Cli {
    /// JSON engine config; missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate P(X * Y <= c) for one pair.
    Forward(ForwardArgs),
    /// Solve for c with P(X * Y <= c) = p.
    Inverse(InverseArgs),
    /// Run a table of parameter records.
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct PairArgs {
    #[arg(long, allow_hyphen_values = true)]
    mu_x: f64,
    #[arg(long)]
    sigma_x: f64,
    #[arg(long, allow_hyphen_values = true)]
    mu_y: f64,
    #[arg(long)]
    sigma_y: f64,
}

impl PairArgs {
    fn pair(&self) -> Result<DistributionPair, EngineError> {
        DistributionPair::new(self.mu_x, self.sigma_x, self.mu_y, self.sigma_y)
    }
}

#[derive(Args, Debug)]
struct ForwardArgs {
    #[command(flatten)]
    pair: PairArgs,
    /// Threshold c.
    #[arg(long, allow_hyphen_values = true)]
    c: f64,
    /// Monte Carlo draws for the cross-check and moment comparison; 0 skips both.
    #[arg(long, default_value_t = 0)]
    mc_samples: usize,
    /// Also report W = sqrt(s * X * Y) with this scale.
    #[arg(long)]
    radicand_scale: Option<f64>,
}

#[derive(Args, Debug)]
struct InverseArgs {
    #[command(flatten)]
    pair: PairArgs,
    /// Target probability in (0, 1).
    #[arg(long, default_value_t = 0.98)]
    p: f64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Thresholds,
    Probabilities,
}

impl From<ModeArg> for BatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Thresholds => BatchMode::ThresholdsAndDeviations,
            ModeArg::Probabilities => BatchMode::Probabilities,
        }
    }
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// JSON array of parameter records.
    #[arg(long)]
    input: PathBuf,
    /// Result file; stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ModeArg::Thresholds)]
    mode: ModeArg,
    /// Overrides `batch.max_concurrency`.
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
struct ForwardReport {
    pair: DistributionPair,
    c: f64,
    mean: f64,
    std_dev: f64,
    result: IntegrationResult,
    gaussian_approximation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    monte_carlo: Option<Agreement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moments: Option<MomentComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    radicand: Option<RadicandAnalysis>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, EngineError> {
    match path {
        Some(path) => EngineConfig::from_path(path),
        None => Ok(EngineConfig::default()),
    }
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<(), EngineError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn run_forward(config: EngineConfig, args: ForwardArgs) -> Result<(), EngineError> {
    let pair = args.pair.pair()?;
    let engine = ForwardCdfEngine::new(config.integration);
    let result = engine.evaluate(&pair, args.c);

    let (monte_carlo, moments) = if args.mc_samples > 0 {
        let validator = MonteCarloValidator::new(config.monte_carlo);
        let agreement = validator.compare(&pair, args.c, result.probability, args.mc_samples);
        let empirical = validator.sample_moments(&pair, args.mc_samples);
        (Some(agreement), Some(compare_moments(&pair, &empirical)))
    } else {
        (None, None)
    };

    let radicand = match args.radicand_scale {
        Some(scale) => Some(RadicandTransform::new(scale)?.analyze(&engine, &pair, args.c)),
        None => None,
    };

    write_json(&ForwardReport {
        pair,
        c: args.c,
        mean: pair.mean(),
        std_dev: pair.std_dev(),
        result,
        gaussian_approximation: gaussian_approximation(&pair, args.c),
        monte_carlo,
        moments,
        radicand,
    })
}

fn run_inverse(config: EngineConfig, args: InverseArgs) -> Result<(), EngineError> {
    let pair = args.pair.pair()?;
    let solution: InverseSolution = InverseCdfSolver::from_config(&config).solve(&pair, args.p)?;
    write_json(&solution)
}

fn run_batch(mut config: EngineConfig, args: BatchArgs) -> Result<(), EngineError> {
    if let Some(limit) = args.max_concurrency {
        config.batch.max_concurrency = limit;
    }
    let scheduler = BatchScheduler::new(config)?;

    let input = File::open(&args.input)
        .map_err(|e| EngineError::Io(format!("{}: {e}", args.input.display())))?;
    let mut source = JsonParameterSource::new(BufReader::new(input));
    let mode = BatchMode::from(args.mode);

    let summary = match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
            let mut sink = JsonResultSink::new(BufWriter::new(file));
            scheduler.run_with(&mut source, &mut sink, mode)?
        }
        None => {
            let mut sink = JsonResultSink::new(io::stdout().lock());
            scheduler.run_with(&mut source, &mut sink, mode)?
        }
    };
    info!(?summary, "batch finished");
    Ok(())
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Commands::Forward(args) => run_forward(config, args),
        Commands::Inverse(args) => run_inverse(config, args),
        Commands::Batch(args) => run_batch(config, args),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
