//! Telemetry stream parsing
//!
//! Kernels print a comma-separated header followed by one row per
//! repetition, e.g.
//!
//! ```text
//! array_len,nb_bins,nb_repeat,rep,timing,check_status
//! 1000,5,3,0,1.234000e-03,0
//! 1000,5,3,1,1.100000e-03,0
//! ```
//!
//! Columns are matched by name. `rep`, `timing` and `check_status` are
//! required; `nb_bins`, `nb_repeat` and `input_size` (or `array_len`) are
//! echoed into the record when present.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Column holding the repetition index
pub const REP_COLUMN: &str = "rep";
/// Column holding elapsed seconds
pub const TIMING_COLUMN: &str = "timing";
/// Column holding the verification status
pub const CHECK_COLUMN: &str = "check_status";

/// One parsed telemetry row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionRecord {
    /// Repetition index; 0 is the warm-up
    pub rep: u64,
    /// Elapsed time in seconds
    pub timing: f64,
    /// 0 = verification passed
    pub check_status: i32,
    /// Echoed bin count
    pub nb_bins: Option<u32>,
    /// Echoed repeat count
    pub nb_repeat: Option<u32>,
    /// Echoed input size
    pub input_size: Option<u64>,
}

impl RepetitionRecord {
    /// Record with only the required fields.
    #[must_use]
    pub const fn new(rep: u64, timing: f64, check_status: i32) -> Self {
        Self {
            rep,
            timing,
            check_status,
            nb_bins: None,
            nb_repeat: None,
            input_size: None,
        }
    }

    /// `true` when the kernel reported its result as incorrect.
    #[must_use]
    pub const fn check_failed(&self) -> bool {
        self.check_status != 0
    }

    /// `true` for the warm-up repetition.
    #[must_use]
    pub const fn is_warm_up(&self) -> bool {
        self.rep == 0
    }
}

/// Parsed stream: records in emission order plus the skipped-row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    records: Vec<RepetitionRecord>,
    unparsed_rows: usize,
}

impl Telemetry {
    /// Records in repetition order.
    #[must_use]
    pub fn records(&self) -> &[RepetitionRecord] {
        &self.records
    }

    /// Consume into the record vector.
    #[must_use]
    pub fn into_records(self) -> Vec<RepetitionRecord> {
        self.records
    }

    /// Rows that were present but could not be parsed.
    #[must_use]
    pub const fn unparsed_rows(&self) -> usize {
        self.unparsed_rows
    }

    /// `true` when no record was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Column positions resolved from the header line.
struct Layout {
    rep: usize,
    timing: usize,
    check_status: usize,
    nb_bins: Option<usize>,
    nb_repeat: Option<usize>,
    input_size: Option<usize>,
}

impl Layout {
    fn from_header(line: &str) -> Option<Self> {
        let names: Vec<&str> = line.split(',').map(str::trim).collect();
        let find = |name: &str| names.iter().position(|n| *n == name);
        Some(Self {
            rep: find(REP_COLUMN)?,
            timing: find(TIMING_COLUMN)?,
            check_status: find(CHECK_COLUMN)?,
            nb_bins: find("nb_bins"),
            nb_repeat: find("nb_repeat"),
            input_size: find("input_size").or_else(|| find("array_len")),
        })
    }

    fn parse_row(&self, line: &str) -> Option<RepetitionRecord> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |idx: usize| fields.get(idx).copied();
        let optional = |idx: Option<usize>| idx.and_then(field);

        let timing: f64 = field(self.timing)?.parse().ok()?;
        if !timing.is_finite() {
            return None;
        }
        Some(RepetitionRecord {
            rep: field(self.rep)?.parse().ok()?,
            timing,
            check_status: field(self.check_status)?.parse().ok()?,
            nb_bins: optional(self.nb_bins).and_then(|v| v.parse().ok()),
            nb_repeat: optional(self.nb_repeat).and_then(|v| v.parse().ok()),
            input_size: optional(self.input_size).and_then(|v| v.parse().ok()),
        })
    }
}

/// Parse a kernel's standard output.
///
/// Lines before the header (e.g. a banner) are ignored; the header is the
/// first line naming all required columns. A missing header or a header
/// with no rows yields an empty [`Telemetry`], not an error. Malformed
/// rows are skipped and counted.
///
/// # Errors
///
/// Returns [`Error::MissingWarmUp`] if the first parsed row is not rep 0,
/// and [`Error::OutOfOrderTelemetry`] if repetition indices are not
/// strictly increasing.
pub fn parse(stdout: &str) -> Result<Telemetry> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(layout) = lines.by_ref().find_map(Layout::from_header) else {
        return Ok(Telemetry::default());
    };

    let mut telemetry = Telemetry::default();
    for line in lines {
        let Some(record) = layout.parse_row(line) else {
            telemetry.unparsed_rows += 1;
            continue;
        };
        match telemetry.records.last() {
            None if !record.is_warm_up() => {
                return Err(Error::MissingWarmUp { found: record.rep });
            }
            Some(previous) if record.rep <= previous.rep => {
                return Err(Error::OutOfOrderTelemetry {
                    previous: previous.rep,
                    found: record.rep,
                });
            }
            _ => {}
        }
        telemetry.records.push(record);
    }
    Ok(telemetry)
}
