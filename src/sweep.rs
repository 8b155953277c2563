//! Sweep orchestration
//!
//! ```text
//! ConfigSpace → (VariantBuilder) → Executor → telemetry::parse → aggregate → ResultMatrix
//!                                                     ArtifactSet::cleanup (always)
//! ```
//!
//! Points are processed one at a time in enumeration order. Any failure of
//! a single point becomes a sentinel cell; only persisting the result matrix
//! can abort the sweep.
//!
//! # Example
//!
//! ```rust,no_run
//! use kernel_sweep::config::SweepConfig;
//! use kernel_sweep::runner::ProcessRunner;
//! use kernel_sweep::sweep::Sweep;
//!
//! # async fn example() -> kernel_sweep::Result<()> {
//! let config = SweepConfig::omp_thread_scaling();
//! let output = Sweep::new(&config, ProcessRunner::new()).run().await?;
//! println!("{}", output.matrix().to_csv());
//! # Ok(())
//! # }
//! ```

use crate::aggregate::{aggregate, AggregatedResult};
use crate::build::{Artifact, VariantBuilder};
use crate::cleanup::ArtifactSet;
use crate::config::{SweepConfig, SweepKind};
use crate::report::{CellOutcome, SweepReport, SweepStatus};
use crate::runner::{Executor, Invocation};
use crate::space::{enumerate, row_keys, ConfigurationPoint, Target};
use crate::store::{Cell, ResultMatrix};
use crate::telemetry;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Results of a finished sweep.
#[derive(Debug, Clone)]
pub struct SweepOutput {
    matrix: ResultMatrix,
    report: SweepReport,
}

impl SweepOutput {
    /// The persisted result matrix.
    #[must_use]
    pub const fn matrix(&self) -> &ResultMatrix {
        &self.matrix
    }

    /// Per-cell report.
    #[must_use]
    pub const fn report(&self) -> &SweepReport {
        &self.report
    }

    /// Split into matrix and report.
    #[must_use]
    pub fn into_parts(self) -> (ResultMatrix, SweepReport) {
        (self.matrix, self.report)
    }
}

/// One sweep over a validated configuration.
pub struct Sweep<'a, E> {
    config: &'a SweepConfig,
    executor: E,
}

impl<'a, E: Executor> Sweep<'a, E> {
    /// Bind a configuration to an executor.
    #[must_use]
    pub const fn new(config: &'a SweepConfig, executor: E) -> Self {
        Self { config, executor }
    }

    /// Run every configuration point and persist the result matrix.
    ///
    /// Artifacts built during the sweep are removed before this returns,
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] before doing any work if the
    /// configuration is invalid, and [`Error::ResultWrite`] if the result
    /// matrix cannot be written.
    pub async fn run(&self) -> Result<SweepOutput> {
        self.config.validate()?;
        let mut artifacts = ArtifactSet::new();
        let result = self.run_points(&mut artifacts).await;
        artifacts.cleanup();
        result
    }

    async fn run_points(&self, artifacts: &mut ArtifactSet) -> Result<SweepOutput> {
        let config = self.config;
        let mut report = SweepReport::new(&config.name);
        report.start();

        let points = enumerate(config);
        info!(
            sweep = %config.name,
            points = points.len(),
            nb_repeat = config.nb_repeat,
            "starting sweep (first repetition of each run is a discarded warm-up)"
        );

        let built = match &config.kind {
            SweepKind::BlockSize { block_sizes, build } => {
                let builder = VariantBuilder::new(build, config.build_timeout());
                let built = builder.build_all(&self.executor, block_sizes, artifacts).await;
                let ok = built.values().filter(|b| b.is_ok()).count();
                if ok == 0 {
                    warn!("no artifact could be built; every cell will be a sentinel");
                }
                built
            }
            SweepKind::Variants { .. } | SweepKind::ThreadScaling { .. } => BTreeMap::new(),
        };

        let mut matrix = ResultMatrix::new(&row_keys(config), config.columns());
        let mut launched = false;
        for point in points {
            let measured = match self.invocation(&point, &built) {
                Ok(invocation) => {
                    if launched && !config.cooldown().is_zero() {
                        debug!(cooldown_ms = config.cooldown_ms, "cooling down");
                        tokio::time::sleep(config.cooldown()).await;
                    }
                    launched = true;
                    self.measure(&invocation, &point).await
                }
                Err(e) => Err(e),
            };

            let (cell, outcome) = match measured {
                Ok((result, unparsed_rows)) => {
                    log_measurement(&point, &result);
                    (
                        Cell::Measured(result),
                        CellOutcome::Measured {
                            result,
                            unparsed_rows,
                        },
                    )
                }
                Err(e) => {
                    let kind = e.kind();
                    warn!(point = %point, kind = %kind, error = %e, "configuration failed");
                    (
                        Cell::Missing(kind),
                        CellOutcome::Failed {
                            kind,
                            message: e.to_string(),
                        },
                    )
                }
            };
            matrix.set(point.row_key(), &point.variant, cell)?;
            report.record(point, outcome);
        }

        summarize(&report);

        if let Err(e) = matrix.write_csv(&config.output_csv) {
            error!(error = %e, "could not persist result matrix");
            report.complete(SweepStatus::Failed);
            return Err(e);
        }
        info!(path = %config.output_csv.display(), "results saved");
        report.complete(SweepStatus::Completed);

        if let Some(path) = &config.summary_json {
            match report.write_json(path) {
                Ok(()) => info!(path = %path.display(), "summary saved"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not write summary"),
            }
        }

        Ok(SweepOutput { matrix, report })
    }

    /// Resolve the executable and environment for one point.
    fn invocation(
        &self,
        point: &ConfigurationPoint,
        built: &BTreeMap<u32, Result<Artifact>>,
    ) -> Result<Invocation> {
        let program = match &point.target {
            Target::Executable(path) => path.clone(),
            Target::Built { block_size } => match built.get(block_size) {
                Some(Ok(artifact)) => artifact.path().to_path_buf(),
                Some(Err(e)) => return Err(self.unavailable(*block_size, e.to_string())),
                None => return Err(self.unavailable(*block_size, "never built".to_string())),
            },
        };

        let mut invocation = Invocation::new(program, self.config.run_timeout()).args(point.args());
        if let (SweepKind::ThreadScaling { thread_env, .. }, Some(threads)) =
            (&self.config.kind, point.threads)
        {
            invocation = invocation.env(thread_env.clone(), threads.to_string());
        }
        Ok(invocation)
    }

    fn unavailable(&self, block_size: u32, diagnostics: String) -> Error {
        let axis = match &self.config.kind {
            SweepKind::BlockSize { build, .. } => build.define.clone(),
            SweepKind::Variants { .. } | SweepKind::ThreadScaling { .. } => "block_size".to_string(),
        };
        Error::BuildFailure {
            axis,
            value: block_size,
            diagnostics,
        }
    }

    /// Execute, parse and aggregate one point.
    async fn measure(
        &self,
        invocation: &Invocation,
        point: &ConfigurationPoint,
    ) -> Result<(AggregatedResult, usize)> {
        info!(point = %point, command = %invocation.display_command(), "running");
        let outcome = self.executor.execute(invocation).await?;
        debug!(outcome = outcome.label(), "process finished");

        let stdout = outcome.into_stdout(invocation)?;
        let telemetry = telemetry::parse(&stdout)?;
        if telemetry.unparsed_rows() > 0 {
            warn!(point = %point, unparsed = telemetry.unparsed_rows(), "skipped malformed telemetry rows");
        }
        if telemetry.is_empty() {
            return Err(Error::EmptyTelemetry);
        }
        let result = aggregate(telemetry.records(), point.nb_repeat as usize)?;
        Ok((result, telemetry.unparsed_rows()))
    }
}

fn log_measurement(point: &ConfigurationPoint, result: &AggregatedResult) {
    debug!(point = %point, warm_up_seconds = result.warm_up_seconds(), "warm-up discarded");
    if result.check_failures() > 0 {
        warn!(
            point = %point,
            check_failures = result.check_failures(),
            "repetitions failed verification"
        );
    }
    info!(
        point = %point,
        mean_seconds = result.mean_seconds(),
        samples = result.samples(),
        "measured"
    );
}

fn summarize(report: &SweepReport) {
    let total = report.cells().len();
    let failed = report.failures().count();
    info!(
        sweep = %report.sweep(),
        measured = total - failed,
        sentinels = failed,
        "sweep finished"
    );
    for cell in report.failures() {
        if let Some(kind) = cell.failure() {
            warn!(point = %cell.point, kind = %kind, "sentinel cell");
        }
    }
    for cell in report.check_failures() {
        warn!(point = %cell.point, "measured cell has verification failures");
    }
}
