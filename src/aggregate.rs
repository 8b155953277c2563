//! Warm-up-aware aggregation of repetition records
//!
//! Policy:
//! - the repetition with index 0 is the warm-up and never enters the mean
//! - fewer records than the expected repeat count rejects the whole cell
//! - check failures are counted over every record but do not exclude a
//!   record from the mean

use crate::telemetry::RepetitionRecord;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Statistics for one configuration point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    mean_seconds: f64,
    samples: usize,
    check_failures: usize,
    warm_up_seconds: f64,
}

impl AggregatedResult {
    /// Arithmetic mean of the non-warm-up timings.
    #[must_use]
    pub const fn mean_seconds(&self) -> f64 {
        self.mean_seconds
    }

    /// Number of timings in the mean.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Repetitions (warm-up included) reporting a non-zero check status.
    #[must_use]
    pub const fn check_failures(&self) -> usize {
        self.check_failures
    }

    /// Timing of the discarded warm-up.
    #[must_use]
    pub const fn warm_up_seconds(&self) -> f64 {
        self.warm_up_seconds
    }
}

/// Aggregate parsed records against the expected repeat count.
///
/// # Errors
///
/// - [`Error::EmptyTelemetry`] when `records` is empty
/// - [`Error::MissingWarmUp`] when the first record is not rep 0
/// - [`Error::InsufficientSamples`] when fewer than `expected_repeat`
///   records were parsed, or when nothing is left after dropping the warm-up
pub fn aggregate(records: &[RepetitionRecord], expected_repeat: usize) -> Result<AggregatedResult> {
    let Some(warm_up) = records.first() else {
        return Err(Error::EmptyTelemetry);
    };
    if !warm_up.is_warm_up() {
        return Err(Error::MissingWarmUp { found: warm_up.rep });
    }
    if records.len() < expected_repeat {
        return Err(Error::InsufficientSamples {
            expected: expected_repeat,
            parsed: records.len(),
        });
    }

    let (sum, samples) = records[1..]
        .iter()
        .fold((0.0_f64, 0_usize), |(sum, n), r| (sum + r.timing, n + 1));
    if samples == 0 {
        return Err(Error::InsufficientSamples {
            expected: expected_repeat.max(2),
            parsed: records.len(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_seconds = sum / samples as f64;
    Ok(AggregatedResult {
        mean_seconds,
        samples,
        check_failures: records.iter().filter(|r| r.check_failed()).count(),
        warm_up_seconds: warm_up.timing,
    })
}
