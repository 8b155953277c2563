//! Run one benchmark sweep.
//!
//! ```text
//! kernel-sweep <histogram_variants | cuda_block_sizes | omp_thread_scaling | CONFIG.json>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::Parser;
use kernel_sweep::config::SweepConfig;
use kernel_sweep::runner::ProcessRunner;
use kernel_sweep::sweep::Sweep;
use tracing_subscriber::EnvFilter;

/// Benchmark sweep orchestrator for compute-kernel variants
#[derive(Parser, Debug)]
#[command(name = "kernel-sweep")]
#[command(version)]
#[command(about = "Run a benchmark sweep and write the result matrix as CSV")]
struct Cli {
    /// Preset name (histogram_variants, cuda_block_sizes, omp_thread_scaling)
    /// or path to a JSON sweep configuration
    #[arg(value_name = "PRESET|CONFIG")]
    target: String,
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(target: &str) -> Result<SweepConfig> {
    if let Some(config) = SweepConfig::preset(target) {
        return Ok(config);
    }
    SweepConfig::from_json_file(target)
        .with_context(|| format!("Failed to load sweep config `{target}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = load_config(&cli.target)?;

    let output = Sweep::new(&config, ProcessRunner::new())
        .run()
        .await
        .context("Sweep aborted")?;

    let sentinels = output.matrix().sentinels().count();
    if sentinels > 0 {
        tracing::warn!(sentinels, "some cells have no measurement, see the log above");
    }
    Ok(())
}
