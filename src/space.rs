//! Configuration space enumeration
//!
//! Enumeration is a pure function of the declared axis lists. Order is
//! array length (outer), bin count, then the secondary axis (inner), which
//! is exactly the row-major order of the result matrix.

use crate::config::{block_size_label, thread_count_label, SweepConfig, SweepKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Non-variant axes identifying one result-matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// `--array-len`
    pub array_len: u64,
    /// `--nb-bins`
    pub nb_bins: u32,
}

/// How the executable for a point is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Prebuilt executable on disk
    Executable(PathBuf),
    /// Artifact built for this block size
    Built {
        /// Block size constant
        block_size: u32,
    },
}

/// One immutable sweep cell.
///
/// Axes unused by a sweep kind are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationPoint {
    /// Column label (variant name, `BS_<n>` or `T_<n>`)
    pub variant: String,
    /// Where the executable comes from
    pub target: Target,
    /// `--array-len`
    pub array_len: u64,
    /// `--nb-bins`
    pub nb_bins: u32,
    /// `--nb-repeat`
    pub nb_repeat: u32,
    /// Thread count, thread-scaling sweeps only
    pub threads: Option<u32>,
    /// Block size, block-size sweeps only
    pub block_size: Option<u32>,
}

impl ConfigurationPoint {
    /// Row this point lands in.
    #[must_use]
    pub const fn row_key(&self) -> RowKey {
        RowKey {
            array_len: self.array_len,
            nb_bins: self.nb_bins,
        }
    }

    /// Argument vector per the kernel CLI contract.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "--array-len".to_string(),
            self.array_len.to_string(),
            "--nb-bins".to_string(),
            self.nb_bins.to_string(),
            "--nb-repeat".to_string(),
            self.nb_repeat.to_string(),
        ]
    }
}

impl std::fmt::Display for ConfigurationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} array_len={} nb_bins={} nb_repeat={}",
            self.variant, self.array_len, self.nb_bins, self.nb_repeat
        )?;
        if let Some(threads) = self.threads {
            write!(f, " threads={threads}")?;
        }
        if let Some(block_size) = self.block_size {
            write!(f, " block_size={block_size}")?;
        }
        Ok(())
    }
}

/// Row keys in matrix order.
#[must_use]
pub fn row_keys(config: &SweepConfig) -> Vec<RowKey> {
    config
        .array_lens
        .iter()
        .flat_map(|&array_len| {
            config
                .nb_bins
                .iter()
                .map(move |&nb_bins| RowKey { array_len, nb_bins })
        })
        .collect()
}

/// Every configuration point, in stable sweep order.
#[must_use]
pub fn enumerate(config: &SweepConfig) -> Vec<ConfigurationPoint> {
    let mut points = Vec::new();
    for key in row_keys(config) {
        let base = |variant: String, target: Target| ConfigurationPoint {
            variant,
            target,
            array_len: key.array_len,
            nb_bins: key.nb_bins,
            nb_repeat: config.nb_repeat,
            threads: None,
            block_size: None,
        };
        match &config.kind {
            SweepKind::Variants { variants } => {
                points.extend(variants.iter().map(|v| {
                    base(v.name.clone(), Target::Executable(v.executable.clone()))
                }));
            }
            SweepKind::BlockSize { block_sizes, .. } => {
                points.extend(block_sizes.iter().map(|&block_size| ConfigurationPoint {
                    block_size: Some(block_size),
                    ..base(block_size_label(block_size), Target::Built { block_size })
                }));
            }
            SweepKind::ThreadScaling {
                executable,
                thread_counts,
                ..
            } => {
                points.extend(thread_counts.iter().map(|&threads| ConfigurationPoint {
                    threads: Some(threads),
                    ..base(
                        thread_count_label(threads),
                        Target::Executable(executable.clone()),
                    )
                }));
            }
        }
    }
    points
}
