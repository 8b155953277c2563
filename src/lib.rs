//! # kernel-sweep: Benchmark Sweeps for Interchangeable Compute Kernels
//!
//! Drives comparative timing of kernel variants (sequential, OpenMP, CUDA,
//! block-size tuned) that are invoked as external processes:
//!
//! 1. enumerate the configuration space ([`space`])
//! 2. build one artifact per block size when needed ([`build`])
//! 3. run each point with a timeout ([`runner`])
//! 4. parse the telemetry rows printed on stdout ([`telemetry`])
//! 5. drop the warm-up and average the rest ([`aggregate`])
//! 6. write a rectangular CSV matrix with `N/A` sentinels ([`store`])
//!
//! Built artifacts are removed at the end of every sweep ([`cleanup`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use kernel_sweep::config::SweepConfig;
//! use kernel_sweep::runner::ProcessRunner;
//! use kernel_sweep::sweep::Sweep;
//!
//! # async fn example() -> kernel_sweep::Result<()> {
//! let config = SweepConfig::histogram_variants();
//! let output = Sweep::new(&config, ProcessRunner::new()).run().await?;
//! for (row, column, _) in output.matrix().sentinels() {
//!     println!("missing: array_len={} {column}", row.array_len);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod build;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod space;
pub mod store;
pub mod sweep;
pub mod telemetry;

pub use error::{Error, FailureKind, Result};
