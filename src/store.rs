//! Result matrix and CSV persistence
//!
//! The row keys and column labels are fixed when the matrix is created.
//! Every cell starts out as a sentinel, so a row exists for each key even
//! if nothing in it was ever measured.
//!
//! ## Output format
//!
//! ```text
//! array_len,CPU_Seq,CPU_OMP,GPU_CUDA
//! 100,1e-5,N/A,0.00025
//! ```
//!
//! An `nb_bins` key column is added after `array_len` when the sweep
//! declares more than one bin count.

use crate::aggregate::AggregatedResult;
use crate::error::FailureKind;
use crate::space::RowKey;
use crate::{Error, Result};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

/// Text written in place of a missing measurement
pub const SENTINEL: &str = "N/A";

/// One matrix cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// A valid aggregated measurement
    Measured(AggregatedResult),
    /// No measurement; the reason is kept for the summary
    Missing(FailureKind),
    /// Not yet processed
    Pending,
}

impl Cell {
    /// Mean timing, if measured.
    #[must_use]
    pub const fn mean_seconds(&self) -> Option<f64> {
        match self {
            Self::Measured(result) => Some(result.mean_seconds()),
            Self::Missing(_) | Self::Pending => None,
        }
    }

    /// `true` unless the cell holds a measurement.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Measured(_))
    }

    fn render(&self) -> String {
        self.mean_seconds()
            .map_or_else(|| SENTINEL.to_string(), |mean| format!("{mean:?}"))
    }
}

/// One row: key plus one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    key: RowKey,
    cells: Vec<Cell>,
}

impl MatrixRow {
    /// Row key.
    #[must_use]
    pub const fn key(&self) -> RowKey {
        self.key
    }

    /// Cells in column order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Rectangular result matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMatrix {
    columns: Vec<String>,
    rows: Vec<MatrixRow>,
    show_bins: bool,
}

impl ResultMatrix {
    /// Create a matrix with every cell pending.
    #[must_use]
    pub fn new(row_keys: &[RowKey], columns: Vec<String>) -> Self {
        let show_bins = row_keys
            .first()
            .is_some_and(|first| row_keys.iter().any(|k| k.nb_bins != first.nb_bins));
        let rows = row_keys
            .iter()
            .map(|&key| MatrixRow {
                key,
                cells: vec![Cell::Pending; columns.len()],
            })
            .collect();
        Self {
            columns,
            rows,
            show_bins,
        }
    }

    /// Column labels.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in sweep order.
    #[must_use]
    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    /// Look up one cell.
    #[must_use]
    pub fn get(&self, key: RowKey, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.iter().find(|r| r.key == key)?.cells.get(col)
    }

    /// Store a cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the key or column was not declared
    /// when the matrix was created.
    pub fn set(&mut self, key: RowKey, column: &str, cell: Cell) -> Result<()> {
        let col = self
            .column_index(column)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown column `{column}`")))?;
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown row {key:?}")))?;
        row.cells[col] = cell;
        Ok(())
    }

    /// Cells not holding a measurement, as `(row, column, cell)`.
    pub fn sentinels(&self) -> impl Iterator<Item = (RowKey, &str, &Cell)> + '_ {
        self.rows.iter().flat_map(move |row| {
            row.cells
                .iter()
                .zip(&self.columns)
                .filter(|(cell, _)| cell.is_sentinel())
                .map(move |(cell, column)| (row.key, column.as_str(), cell))
        })
    }

    /// Render the matrix as CSV text.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::from("array_len");
        if self.show_bins {
            out.push_str(",nb_bins");
        }
        for column in &self.columns {
            out.push(',');
            out.push_str(column);
        }
        out.push('\n');

        for row in &self.rows {
            let _ = write!(out, "{}", row.key.array_len);
            if self.show_bins {
                let _ = write!(out, ",{}", row.key.nb_bins);
            }
            for cell in &row.cells {
                out.push(',');
                out.push_str(&cell.render());
            }
            out.push('\n');
        }
        out
    }

    /// Persist as CSV, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResultWrite`] if the file cannot be created or written.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(path)?;
            file.write_all(self.to_csv().as_bytes())?;
            file.sync_all()
        };
        write().map_err(|source| Error::ResultWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}
