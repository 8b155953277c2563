//! Per-axis-value artifact builds
//!
//! Each block size is compiled separately by passing the value as a
//! `-D<DEFINE>=<value>` constant. A failed build only marks its own column
//! as unavailable.

use crate::cleanup::ArtifactSet;
use crate::config::BuildOptions;
use crate::runner::{ExecutionOutcome, Executor, Invocation};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A built, runnable kernel bound to one axis value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    value: u32,
    path: PathBuf,
}

impl Artifact {
    /// Axis value the artifact was built for.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Executable path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds one artifact per axis value through an [`Executor`].
#[derive(Debug, Clone)]
pub struct VariantBuilder<'a> {
    options: &'a BuildOptions,
    timeout: Duration,
}

impl<'a> VariantBuilder<'a> {
    /// Create a builder for fixed toolchain options.
    #[must_use]
    pub const fn new(options: &'a BuildOptions, timeout: Duration) -> Self {
        Self { options, timeout }
    }

    /// Output path for an axis value: `<prefix>_<value>`.
    #[must_use]
    pub fn artifact_path(&self, value: u32) -> PathBuf {
        let mut name = self.options.output_prefix.clone().into_os_string();
        name.push(format!("_{value}"));
        PathBuf::from(name)
    }

    /// Toolchain invocation for an axis value.
    ///
    /// `<compiler> -D<DEFINE>=<v> -arch=<arch> <extra..> <opt> <source> -o <out> <link..>`
    #[must_use]
    pub fn invocation(&self, value: u32) -> Invocation {
        let opts = self.options;
        Invocation::new(&opts.compiler, self.timeout)
            .arg(format!("-D{}={value}", opts.define))
            .arg(format!("-arch={}", opts.arch))
            .args(opts.extra_flags.iter().cloned())
            .arg(opts.opt_level.clone())
            .arg(opts.source.display().to_string())
            .arg("-o")
            .arg(self.artifact_path(value).display().to_string())
            .args(opts.link_args.iter().cloned())
    }

    /// Build one axis value.
    ///
    /// The output path is registered with `artifacts` before the toolchain
    /// starts when nothing exists there yet, so partial outputs are removed.
    /// A file already at that path is only taken over once the build
    /// succeeds and has replaced it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildFailure`] on a non-zero toolchain exit or a
    /// toolchain timeout, [`Error::ExecutableNotFound`] if the compiler is
    /// missing, or the executor's own error.
    pub async fn build<E: Executor>(
        &self,
        executor: &E,
        value: u32,
        artifacts: &mut ArtifactSet,
    ) -> Result<Artifact> {
        let path = self.artifact_path(value);
        if path.exists() {
            debug!(path = %path.display(), "artifact path already exists, not owned until rebuilt");
        } else {
            artifacts.register(&path);
        }

        let invocation = self.invocation(value);
        info!(define = %self.options.define, value, command = %invocation.display_command(), "building variant");
        match executor.execute(&invocation).await? {
            ExecutionOutcome::Success { .. } => {
                artifacts.register(&path);
                Ok(Artifact { value, path })
            }
            ExecutionOutcome::NonZeroExit { stderr, .. } => Err(self.failure(value, stderr)),
            ExecutionOutcome::Timeout => Err(self.failure(
                value,
                format!("toolchain timed out after {:.1}s", self.timeout.as_secs_f64()),
            )),
            ExecutionOutcome::NotFound => Err(Error::ExecutableNotFound(self.options.compiler.clone())),
        }
    }

    /// Build every value in order; a failure never stops the remaining builds.
    pub async fn build_all<E: Executor>(
        &self,
        executor: &E,
        values: &[u32],
        artifacts: &mut ArtifactSet,
    ) -> BTreeMap<u32, Result<Artifact>> {
        let mut built = BTreeMap::new();
        for &value in values {
            let result = self.build(executor, value, artifacts).await;
            if let Err(e) = &result {
                warn!(define = %self.options.define, value, error = %e, "build failed");
            }
            built.insert(value, result);
        }
        built
    }

    fn failure(&self, value: u32, diagnostics: String) -> Error {
        Error::BuildFailure {
            axis: self.options.define.clone(),
            value,
            diagnostics,
        }
    }
}
