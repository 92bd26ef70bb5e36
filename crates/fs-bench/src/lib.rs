//! Benchmark framework for recycle convergence.
//!
//! Every benchmark builds a fresh flowsheet per run and simulates it with
//! each requested convergence method; wall-clock times and convergence
//! reports are aggregated per method.

pub mod error;
pub mod flowsheets;

use std::time::Instant;

use fs_system::{ConvergenceConfig, ConvergenceMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use error::{BenchError, BenchResult};
pub use flowsheets::BenchFlowsheet;

/// A benchmark scenario definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkScenario {
    /// Unique identifier for this benchmark.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub notes: Option<String>,
}

/// A scenario with the function building its flowsheet.
#[derive(Clone)]
pub struct Benchmark {
    pub scenario: BenchmarkScenario,
    pub build: fn() -> BenchResult<BenchFlowsheet>,
}

impl std::fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmark")
            .field("scenario", &self.scenario)
            .finish()
    }
}

/// A single run's timing and outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_time_s: f64,
    pub build_time_s: f64,
    pub converge_time_s: f64,
    pub iterations: usize,
    pub converged: bool,
    pub mol_error: f64,
    pub t_error: f64,
}

/// Aggregated statistics for multiple runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub run_count: usize,
    pub total_time_median_s: f64,
    pub total_time_min_s: f64,
    pub total_time_max_s: f64,
    pub converge_time_median_s: f64,
    pub converge_time_min_s: f64,
    pub converge_time_max_s: f64,
    pub iterations_median: Option<usize>,
    pub all_converged: bool,
}

/// Runs of one scenario under one convergence method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: String,
    pub runs: Vec<RunMetrics>,
    pub aggregate: AggregateMetrics,
}

/// Complete benchmark result for a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub scenario: BenchmarkScenario,
    pub methods: Vec<MethodResult>,
}

/// Collection of benchmark results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    pub timestamp: String,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkSuite {
    pub fn to_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Build and simulate `benchmark` once with `config`.
pub fn run_once(benchmark: &Benchmark, config: &ConvergenceConfig) -> BenchResult<RunMetrics> {
    let start = Instant::now();
    let mut bench = (benchmark.build)()?;
    let build_time_s = start.elapsed().as_secs_f64();
    *bench.system.config_mut() = config.clone();

    let converge_start = Instant::now();
    let report = bench
        .system
        .simulate(&mut bench.flowsheet)
        .map_err(|source| BenchError::Run {
            id: benchmark.scenario.id.clone(),
            source,
        })?;
    let converge_time_s = converge_start.elapsed().as_secs_f64();
    debug!(
        benchmark = %benchmark.scenario.id,
        method = %config.method,
        iterations = report.iterations,
        "benchmark run"
    );
    Ok(RunMetrics {
        total_time_s: start.elapsed().as_secs_f64(),
        build_time_s,
        converge_time_s,
        iterations: report.iterations,
        converged: report.converged,
        mol_error: report.mol_error,
        t_error: report.t_error,
    })
}

/// Run a benchmark `times` times with each of `methods`.
pub fn run_scenario(
    benchmark: &Benchmark,
    methods: &[ConvergenceMethod],
    times: usize,
    config: &ConvergenceConfig,
) -> BenchResult<BenchmarkResult> {
    let mut results = Vec::with_capacity(methods.len());
    for &method in methods {
        let config = config.clone().with_method(method);
        let runs = (0..times)
            .map(|_| run_once(benchmark, &config))
            .collect::<BenchResult<Vec<_>>>()?;
        let aggregate = compute_aggregates(&runs);
        info!(
            benchmark = %benchmark.scenario.id,
            %method,
            median_s = aggregate.total_time_median_s,
            "benchmark finished"
        );
        results.push(MethodResult {
            method: method.to_string(),
            runs,
            aggregate,
        });
    }
    Ok(BenchmarkResult {
        scenario: benchmark.scenario.clone(),
        methods: results,
    })
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

pub fn compute_aggregates(runs: &[RunMetrics]) -> AggregateMetrics {
    if runs.is_empty() {
        return AggregateMetrics::default();
    }
    let total = sorted(runs.iter().map(|r| r.total_time_s).collect());
    let converge = sorted(runs.iter().map(|r| r.converge_time_s).collect());
    let mut iterations: Vec<_> = runs.iter().map(|r| r.iterations).collect();
    iterations.sort_unstable();
    let mid = runs.len() / 2;
    AggregateMetrics {
        run_count: runs.len(),
        total_time_median_s: total[mid],
        total_time_min_s: total[0],
        total_time_max_s: total[runs.len() - 1],
        converge_time_median_s: converge[mid],
        converge_time_min_s: converge[0],
        converge_time_max_s: converge[runs.len() - 1],
        iterations_median: iterations.get(mid).copied(),
        all_converged: runs.iter().all(|r| r.converged),
    }
}

fn benchmark(
    id: &str,
    name: &str,
    notes: &str,
    build: fn() -> BenchResult<BenchFlowsheet>,
) -> Benchmark {
    Benchmark {
        scenario: BenchmarkScenario {
            id: id.to_string(),
            name: name.to_string(),
            notes: Some(notes.to_string()),
        },
        build,
    }
}

/// Default set of benchmark scenarios.
pub fn default_benchmarks() -> Vec<Benchmark> {
    vec![
        benchmark(
            "alcohol_narrow_flash",
            "Alcohol flash narrow",
            "Heptanol/octanol stage at boilup 1 with liquid recycle",
            flowsheets::alcohol_narrow_flash,
        ),
        benchmark(
            "alcohol_wide_flash",
            "Alcohol flash wide",
            "Propanol/octanol stage at boilup 1 with liquid recycle",
            flowsheets::alcohol_wide_flash,
        ),
        benchmark(
            "hydrocarbon_narrow_flash",
            "Hydrocarbon flash narrow",
            "Heptane/octane stage at boilup 1 with liquid recycle",
            flowsheets::hydrocarbon_narrow_flash,
        ),
        benchmark(
            "hydrocarbon_wide_flash",
            "Hydrocarbon flash wide",
            "Propane/octane stage at boilup 1 with liquid recycle",
            flowsheets::hydrocarbon_wide_flash,
        ),
        benchmark(
            "pentane_hexane_column",
            "Pentane/hexane column",
            "Five stages, reflux 2, boilup 2, half the bottoms recycled",
            flowsheets::pentane_hexane_column,
        ),
    ]
}

pub fn find_benchmark(id: &str) -> BenchResult<Benchmark> {
    default_benchmarks()
        .into_iter()
        .find(|b| b.scenario.id == id)
        .ok_or_else(|| BenchError::UnknownBenchmark { id: id.to_string() })
}
