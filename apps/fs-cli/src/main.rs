use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fs_bench::{BenchError, default_benchmarks, find_benchmark, run_scenario};
use fs_system::{ConvergenceConfig, ConvergenceMethod, SystemError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fs-cli")]
#[command(about = "Recycle convergence and equilibrium-stage benchmarks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available benchmarks
    List,
    /// Simulate a benchmark and print timing and convergence statistics
    Run {
        /// Benchmark id (see `list`)
        id: String,
        /// Convergence method (fixed-point, wegstein or aitken); all when omitted
        #[arg(short, long)]
        method: Option<String>,
        /// YAML file with a convergence configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of runs per method
        #[arg(short, long, default_value_t = 1)]
        runs: usize,
    },
    /// Print the default convergence configuration as YAML
    Config,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Bench(#[from] BenchError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => cmd_list(),
        Commands::Run {
            id,
            method,
            config,
            runs,
        } => cmd_run(&id, method.as_deref(), config.as_deref(), runs),
        Commands::Config => cmd_config(),
    }
}

fn cmd_list() -> CliResult<()> {
    println!("Benchmarks:");
    for bench in default_benchmarks() {
        let s = &bench.scenario;
        println!("  {:<26} {}", s.id, s.name);
        if let Some(notes) = &s.notes {
            println!("  {:<26} {}", "", notes);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> CliResult<ConvergenceConfig> {
    let Some(path) = path else {
        return Ok(ConvergenceConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ConvergenceConfig = serde_yaml::from_str(&text)?;
    config.validate()?;
    info!(path = %path.display(), "loaded convergence configuration");
    Ok(config)
}

fn cmd_run(id: &str, method: Option<&str>, config: Option<&Path>, runs: usize) -> CliResult<()> {
    let bench = find_benchmark(id)?;
    let config = load_config(config)?;
    let methods = match method {
        Some(m) => vec![m.parse::<ConvergenceMethod>()?],
        None => ConvergenceMethod::ALL.to_vec(),
    };
    let result = run_scenario(&bench, &methods, runs.max(1), &config)?;

    println!("{}", result.scenario.name);
    for m in &result.methods {
        let agg = &m.aggregate;
        let last = m.runs.last();
        println!(
            "  {:<12} median {:.4}s, min {:.4}s, max {:.4}s",
            m.method, agg.converge_time_median_s, agg.converge_time_min_s, agg.converge_time_max_s
        );
        if let Some(run) = last {
            println!(
                "  {:<12} {} iterations, flow error {:.2e} kmol/hr, temperature error {:.2e} K{}",
                "",
                run.iterations,
                run.mol_error,
                run.t_error,
                if run.converged { "" } else { " (not converged)" }
            );
        }
    }
    Ok(())
}

fn cmd_config() -> CliResult<()> {
    print!("{}", serde_yaml::to_string(&ConvergenceConfig::default())?);
    Ok(())
}
