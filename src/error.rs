//! Error types for kernel-sweep
//!
//! Every per-configuration failure is an [`Error`] that the orchestrator
//! downgrades to a sentinel cell. Only [`Error::ResultWrite`] and
//! [`Error::InvalidConfig`] ever abort a sweep.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// kernel-sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Toolchain exited non-zero while building one axis value
    #[error("Build failed for {axis}={value}:\n{diagnostics}")]
    BuildFailure {
        /// Name of the build-time constant (e.g. `BLOCK_SIZE`)
        axis: String,
        /// Axis value that failed to build
        value: u32,
        /// Toolchain diagnostic stream (stderr)
        diagnostics: String,
    },

    /// Executable (or toolchain) missing on disk or in `PATH`
    #[error("Executable not found: {}\nDid you build the kernels first?", .0.display())]
    ExecutableNotFound(PathBuf),

    /// Child exceeded its wall-clock budget and was killed
    #[error("Process timed out after {:.1}s: {}", .timeout.as_secs_f64(), .program.display())]
    ProcessTimeout {
        /// Program that was killed
        program: PathBuf,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Child ran but reported a hard failure
    #[error("Process exited with {}: {stderr}", exit_code_label(.code))]
    NonZeroExit {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Header missing or no data rows in the telemetry stream
    #[error("No telemetry rows found on standard output")]
    EmptyTelemetry,

    /// Fewer records parsed than the expected repeat count
    #[error("Insufficient samples: parsed {parsed}, expected at least {expected}")]
    InsufficientSamples {
        /// Expected repeat count
        expected: usize,
        /// Records actually parsed
        parsed: usize,
    },

    /// Repetition indices not strictly increasing
    #[error("Out-of-order telemetry: rep {found} after rep {previous}")]
    OutOfOrderTelemetry {
        /// Last accepted repetition index
        previous: u64,
        /// Offending repetition index
        found: u64,
    },

    /// First telemetry row is not the warm-up repetition
    #[error("Missing warm-up: first telemetry row is rep {found}, expected rep 0")]
    MissingWarmUp {
        /// Repetition index of the first parsed row
        found: u64,
    },

    /// Sweep configuration rejected before any work started
    #[error("Invalid sweep configuration: {0}")]
    InvalidConfig(String),

    /// Result file could not be persisted (fatal)
    #[error("Failed to write results to {}: {source}", .path.display())]
    ResultWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[allow(clippy::ref_option)]
fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("code {c}"))
}

impl Error {
    /// Classify this error as the failure kind recorded in a sentinel cell.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::BuildFailure { .. } => FailureKind::BuildFailure,
            Self::ExecutableNotFound(_) => FailureKind::ExecutableNotFound,
            Self::ProcessTimeout { .. } => FailureKind::ProcessTimeout,
            Self::NonZeroExit { .. } => FailureKind::NonZeroExit,
            Self::EmptyTelemetry => FailureKind::EmptyTelemetry,
            Self::InsufficientSamples { .. } => FailureKind::InsufficientSamples,
            Self::OutOfOrderTelemetry { .. } | Self::MissingWarmUp { .. } => {
                FailureKind::InvalidTelemetry
            }
            Self::InvalidConfig(_) | Self::ResultWrite { .. } | Self::Io(_) | Self::Json(_) => {
                FailureKind::Internal
            }
        }
    }
}

/// Why a result-matrix cell holds a sentinel instead of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The artifact for this column never built
    BuildFailure,
    /// Executable missing
    ExecutableNotFound,
    /// Killed after exceeding the run timeout
    ProcessTimeout,
    /// Non-zero exit or killed by signal
    NonZeroExit,
    /// No telemetry rows
    EmptyTelemetry,
    /// Too few repetitions parsed
    InsufficientSamples,
    /// Telemetry violated the ordering contract
    InvalidTelemetry,
    /// Spawn or other IO failure inside the engine
    Internal,
}

impl FailureKind {
    /// Stable label used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildFailure => "build_failure",
            Self::ExecutableNotFound => "executable_not_found",
            Self::ProcessTimeout => "process_timeout",
            Self::NonZeroExit => "non_zero_exit",
            Self::EmptyTelemetry => "empty_telemetry",
            Self::InsufficientSamples => "insufficient_samples",
            Self::InvalidTelemetry => "invalid_telemetry",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
