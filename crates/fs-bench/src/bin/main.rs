//! Standalone benchmark runner.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use fs_bench::{BenchmarkSuite, default_benchmarks, run_scenario};
use fs_system::{ConvergenceConfig, ConvergenceMethod};
use tracing_subscriber::EnvFilter;

const RUNS: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let crate_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let repo_root = crate_path
        .parent()
        .and_then(|p| p.parent())
        .ok_or("Could not determine repo root")?
        .to_path_buf();

    println!("Recycle Convergence Benchmark Suite");
    println!("===================================\n");

    let benchmarks = default_benchmarks();
    println!(
        "Running {} benchmarks x {} methods, {RUNS} runs each...\n",
        benchmarks.len(),
        ConvergenceMethod::ALL.len()
    );

    let config = ConvergenceConfig::default();
    let mut results = Vec::new();
    for (idx, bench) in benchmarks.iter().enumerate() {
        print!("[{}/{}] {} ... ", idx + 1, benchmarks.len(), bench.scenario.name);
        std::io::Write::flush(&mut std::io::stdout())?;
        match run_scenario(bench, &ConvergenceMethod::ALL, RUNS, &config) {
            Ok(result) => {
                println!("OK");
                results.push(result);
            }
            Err(e) => {
                println!("FAILED");
                eprintln!("  Error: {e}");
            }
        }
    }

    println!("\nSummary");
    println!("=======\n");
    for result in &results {
        println!("{}", result.scenario.name);
        for m in &result.methods {
            let agg = &m.aggregate;
            println!(
                "  {:<12} {:.4}s (median), min: {:.4}s, max: {:.4}s, iterations: {}{}",
                m.method,
                agg.converge_time_median_s,
                agg.converge_time_min_s,
                agg.converge_time_max_s,
                agg.iterations_median.unwrap_or(0),
                if agg.all_converged { "" } else { " (not converged)" }
            );
        }
        println!();
    }

    let timestamp = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?.as_secs();
    let suite = BenchmarkSuite {
        timestamp: format!("timestamp_{timestamp}"),
        results,
    };
    let dir = repo_root.join("benchmarks");
    fs::create_dir_all(&dir)?;
    let path = dir.join("baseline.json");
    fs::write(&path, suite.to_json()?)?;
    println!("Baseline saved to: {}", path.display());
    Ok(())
}
