//! Sweep configuration
//!
//! A [`SweepConfig`] is built once (from a preset or a JSON file),
//! validated, and then only ever borrowed by the orchestrator.
//!
//! ## Example
//!
//! ```rust
//! use kernel_sweep::config::SweepConfig;
//!
//! let config = SweepConfig::histogram_variants();
//! config.validate()?;
//! assert_eq!(config.columns(), vec!["CPU_Seq", "CPU_OMP", "GPU_CUDA"]);
//! # Ok::<(), kernel_sweep::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default thread-count variable honoured by OpenMP variants
pub const DEFAULT_THREAD_ENV: &str = "OMP_NUM_THREADS";

/// Characters a column label may not contain, since labels are written unquoted
const CSV_RESERVED: [char; 4] = [',', '"', '\n', '\r'];

/// Array lengths 10^2 .. 10^7 shared by every preset
const DEFAULT_ARRAY_LENS: [u64; 6] = [100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000];

/// One benchmarked executable and the column it fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Column label (e.g. `CPU_OMP`)
    pub name: String,
    /// Path to the executable
    pub executable: PathBuf,
}

impl VariantSpec {
    /// Create a variant.
    #[must_use]
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
        }
    }
}

/// Fixed toolchain options for building one artifact per axis value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Compiler executable (e.g. `nvcc`)
    pub compiler: PathBuf,
    /// Kernel source file
    pub source: PathBuf,
    /// Artifact path prefix; the axis value is appended as `_<value>`
    pub output_prefix: PathBuf,
    /// Name of the build-time constant (e.g. `BLOCK_SIZE`)
    pub define: String,
    /// Target architecture (e.g. `sm_86`)
    pub arch: String,
    /// Optimization flag (e.g. `-O3`)
    pub opt_level: String,
    /// Flags placed before the source path (e.g. `-g`)
    #[serde(default)]
    pub extra_flags: Vec<String>,
    /// Link arguments placed after the output path (e.g. `-lcudart`)
    #[serde(default)]
    pub link_args: Vec<String>,
}

impl BuildOptions {
    /// `nvcc` options used for the CUDA histogram kernel.
    #[must_use]
    pub fn nvcc(source: impl Into<PathBuf>, output_prefix: impl Into<PathBuf>) -> Self {
        Self {
            compiler: PathBuf::from("nvcc"),
            source: source.into(),
            output_prefix: output_prefix.into(),
            define: "BLOCK_SIZE".to_string(),
            arch: "sm_86".to_string(),
            opt_level: "-O3".to_string(),
            extra_flags: vec!["-g".to_string()],
            link_args: vec!["-lcudart".to_string(), "-lm".to_string()],
        }
    }
}

/// What the secondary (column) axis of a sweep is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepKind {
    /// One column per prebuilt executable
    Variants {
        /// Executables to compare
        variants: Vec<VariantSpec>,
    },
    /// One column per build-time block size
    BlockSize {
        /// Block sizes to build and run
        block_sizes: Vec<u32>,
        /// Toolchain options
        build: BuildOptions,
    },
    /// One column per thread count, set through an environment variable
    ThreadScaling {
        /// Thread-parallel executable
        executable: PathBuf,
        /// Thread counts to run
        thread_counts: Vec<u32>,
        /// Variable carrying the thread count
        #[serde(default = "default_thread_env")]
        thread_env: String,
    },
}

fn default_thread_env() -> String {
    DEFAULT_THREAD_ENV.to_string()
}

const fn default_run_timeout_secs() -> u64 {
    120
}

const fn default_build_timeout_secs() -> u64 {
    600
}

/// Immutable description of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Sweep name used in logs and the summary
    pub name: String,
    /// Secondary axis
    #[serde(flatten)]
    pub kind: SweepKind,
    /// Primary axis: `--array-len` values
    pub array_lens: Vec<u64>,
    /// `--nb-bins` values
    pub nb_bins: Vec<u32>,
    /// `--nb-repeat`, warm-up included
    pub nb_repeat: u32,
    /// Wall-clock budget per benchmark run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Wall-clock budget per toolchain invocation
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
    /// Pause between consecutive runs
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Result matrix destination
    pub output_csv: PathBuf,
    /// Optional JSON summary destination
    #[serde(default)]
    pub summary_json: Option<PathBuf>,
}

impl SweepConfig {
    /// CPU sequential vs OpenMP vs CUDA comparison.
    #[must_use]
    pub fn histogram_variants() -> Self {
        Self {
            name: "histogram_variants".to_string(),
            kind: SweepKind::Variants {
                variants: vec![
                    VariantSpec::new("CPU_Seq", "./histogram"),
                    VariantSpec::new("CPU_OMP", "./histogram_omp"),
                    VariantSpec::new("GPU_CUDA", "./histogram_cuda"),
                ],
            },
            array_lens: DEFAULT_ARRAY_LENS.to_vec(),
            nb_bins: vec![1024],
            nb_repeat: 6,
            run_timeout_secs: default_run_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            cooldown_ms: 1_000,
            output_csv: PathBuf::from("./perf/benchmark_results.csv"),
            summary_json: Some(PathBuf::from("./perf/benchmark_results.json")),
        }
    }

    /// CUDA block-size tuning: one `nvcc` build per block size.
    #[must_use]
    pub fn cuda_block_sizes() -> Self {
        let mut array_lens = DEFAULT_ARRAY_LENS.to_vec();
        array_lens.push(50_000_000);
        Self {
            name: "cuda_block_sizes".to_string(),
            kind: SweepKind::BlockSize {
                block_sizes: vec![64, 128, 256, 512, 1024],
                build: BuildOptions::nvcc("./histogram_cuda.cu", "./histogram_cuda"),
            },
            array_lens,
            nb_bins: vec![1024],
            nb_repeat: 6,
            run_timeout_secs: default_run_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            cooldown_ms: 500,
            output_csv: PathBuf::from("./perf/block_size_optimization_results.csv"),
            summary_json: Some(PathBuf::from("./perf/block_size_optimization_results.json")),
        }
    }

    /// OpenMP scaling over `OMP_NUM_THREADS`.
    #[must_use]
    pub fn omp_thread_scaling() -> Self {
        Self {
            name: "omp_thread_scaling".to_string(),
            kind: SweepKind::ThreadScaling {
                executable: PathBuf::from("./histogram_omp"),
                thread_counts: vec![1, 2, 4, 8, 12, 16, 20, 24],
                thread_env: default_thread_env(),
            },
            array_lens: DEFAULT_ARRAY_LENS.to_vec(),
            nb_bins: vec![5],
            nb_repeat: 10,
            run_timeout_secs: default_run_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            cooldown_ms: 0,
            output_csv: PathBuf::from("./perf/omp_scaling_data.csv"),
            summary_json: Some(PathBuf::from("./perf/omp_scaling_data.json")),
        }
    }

    /// Look up a preset by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "histogram_variants" => Some(Self::histogram_variants()),
            "cuda_block_sizes" => Some(Self::cuda_block_sizes()),
            "omp_thread_scaling" => Some(Self::omp_thread_scaling()),
            _ => None,
        }
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// [`validate`](Self::validate).
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Run timeout as a [`Duration`].
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Build timeout as a [`Duration`].
    #[must_use]
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Cool-down delay as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Result-matrix column labels, in sweep order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        match &self.kind {
            SweepKind::Variants { variants } => variants.iter().map(|v| v.name.clone()).collect(),
            SweepKind::BlockSize { block_sizes, .. } => {
                block_sizes.iter().map(|bs| block_size_label(*bs)).collect()
            }
            SweepKind::ThreadScaling { thread_counts, .. } => {
                thread_counts.iter().map(|n| thread_count_label(*n)).collect()
            }
        }
    }

    /// Check the configuration before any process is launched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on empty axes, a repeat count below 2,
    /// zero timeouts, or column labels that are duplicated or would not fit
    /// in one CSV field.
    pub fn validate(&self) -> Result<()> {
        let secondary_empty = match &self.kind {
            SweepKind::Variants { variants } => variants.is_empty(),
            SweepKind::BlockSize { block_sizes, .. } => block_sizes.is_empty(),
            SweepKind::ThreadScaling { thread_counts, .. } => thread_counts.is_empty(),
        };
        if secondary_empty {
            return Err(invalid("secondary axis has no values"));
        }
        if self.array_lens.is_empty() {
            return Err(invalid("array_lens is empty"));
        }
        if self.nb_bins.is_empty() {
            return Err(invalid("nb_bins is empty"));
        }
        if self.nb_repeat < 2 {
            return Err(invalid(format!(
                "nb_repeat must be at least 2 (warm-up + one measured run), got {}",
                self.nb_repeat
            )));
        }
        if self.run_timeout_secs == 0 || self.build_timeout_secs == 0 {
            return Err(invalid("timeouts must be non-zero"));
        }

        let columns = self.columns();
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.is_empty() || column.contains(CSV_RESERVED) {
                return Err(invalid(format!(
                    "column label {column:?} is empty or contains a comma, quote or line break"
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(invalid(format!("duplicate column `{column}`")));
            }
        }

        let mut seen_bins = HashSet::with_capacity(self.nb_bins.len());
        if !self.nb_bins.iter().all(|b| seen_bins.insert(*b)) {
            return Err(invalid("duplicate nb_bins value"));
        }
        let mut seen_lens = HashSet::with_capacity(self.array_lens.len());
        if !self.array_lens.iter().all(|l| seen_lens.insert(*l)) {
            return Err(invalid("duplicate array_lens value"));
        }
        Ok(())
    }
}

/// Column label for a block-size cell.
#[must_use]
pub fn block_size_label(block_size: u32) -> String {
    format!("BS_{block_size}")
}

/// Column label for a thread-count cell.
#[must_use]
pub fn thread_count_label(threads: u32) -> String {
    format!("T_{threads}")
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}
