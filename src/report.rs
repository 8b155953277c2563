//! Sweep Report - run record and per-cell outcomes of one sweep

use crate::aggregate::AggregatedResult;
use crate::error::FailureKind;
use crate::space::ConfigurationPoint;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lifecycle status of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepStatus {
    /// Created but not started.
    Pending,
    /// Configuration points are being processed.
    Running,
    /// Every point processed and results persisted.
    Completed,
    /// Results could not be persisted.
    Failed,
}

/// Outcome recorded for one configuration point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CellOutcome {
    /// Aggregated measurement.
    Measured {
        /// Aggregate statistics
        result: AggregatedResult,
        /// Telemetry rows that could not be parsed
        unparsed_rows: usize,
    },
    /// Sentinel with its cause.
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Error message
        message: String,
    },
}

/// One configuration point and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// The swept point
    pub point: ConfigurationPoint,
    /// Its outcome
    #[serde(flatten)]
    pub outcome: CellOutcome,
}

impl CellRecord {
    /// Failure kind, if this cell is a sentinel.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureKind> {
        match &self.outcome {
            CellOutcome::Measured { .. } => None,
            CellOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Record of a whole sweep, serialized as the JSON summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    sweep: String,
    status: SweepStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    cells: Vec<CellRecord>,
}

impl SweepReport {
    /// Create a pending report.
    #[must_use]
    pub fn new(sweep: impl Into<String>) -> Self {
        Self {
            sweep: sweep.into(),
            status: SweepStatus::Pending,
            started_at: None,
            ended_at: None,
            cells: Vec::new(),
        }
    }

    /// Sweep name.
    #[must_use]
    pub fn sweep(&self) -> &str {
        &self.sweep
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SweepStatus {
        self.status
    }

    /// Start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, if finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Cells in enumeration order.
    #[must_use]
    pub fn cells(&self) -> &[CellRecord] {
        &self.cells
    }

    /// Cells that ended as sentinels.
    pub fn failures(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells.iter().filter(|c| c.failure().is_some())
    }

    /// Cells measured with at least one failed verification check.
    pub fn check_failures(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells.iter().filter(|c| {
            matches!(&c.outcome, CellOutcome::Measured { result, .. } if result.check_failures() > 0)
        })
    }

    /// Mark the sweep as running.
    pub fn start(&mut self) {
        self.status = SweepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Append a processed cell.
    pub fn record(&mut self, point: ConfigurationPoint, outcome: CellOutcome) {
        self.cells.push(CellRecord { point, outcome });
    }

    /// Finish with the given status.
    pub fn complete(&mut self, status: SweepStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Write the report as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or serialized.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
