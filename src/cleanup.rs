//! Scoped release of built artifacts
//!
//! [`ArtifactSet`] owns every path a sweep asked the toolchain to produce.
//! Paths are registered before the toolchain runs, so partial outputs of a
//! failed build are removed too. Release happens on [`ArtifactSet::cleanup`]
//! or, failing that, on drop.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Artifact paths owned by one sweep run.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a path that a build may create.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Registered paths.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every registered file that exists; returns how many were removed.
    ///
    /// Idempotent: paths never created are skipped, and the set is empty
    /// afterwards so a second call (or the drop) is a no-op.
    pub fn cleanup(&mut self) -> usize {
        if self.paths.is_empty() {
            return 0;
        }
        let removed = self.paths.drain(..).filter(|p| remove_artifact(p)).count();
        info!(removed, "temporary artifacts cleaned up");
        removed
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_artifact(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed artifact");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove artifact");
            false
        }
    }
}
