//! Compiles a test directory into the executable that embeds the filter.

use std::{future::Future, path::Path, process::Stdio};

use tokio::process::Command;

use crate::error::BuildError;

/// Turns a test directory's sources into an executable at `exe`.
pub trait ProgramBuilder: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the build tool cannot run or reports failure.
    fn build(
        &self,
        source_dir: &Path,
        exe: &Path,
    ) -> impl Future<Output = Result<(), BuildError>> + Send;
}

/// Builds Go test programs with `go build -o <exe> .`.
#[derive(Debug, Clone)]
pub struct GoBuilder {
    go: String,
}

impl GoBuilder {
    /// Uses the `go` binary found on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary("go")
    }

    #[must_use]
    pub fn with_binary(go: impl Into<String>) -> Self {
        Self { go: go.into() }
    }
}

impl Default for GoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder for GoBuilder {
    async fn build(&self, source_dir: &Path, exe: &Path) -> Result<(), BuildError> {
        tracing::debug!("building {} into {}", source_dir.display(), exe.display());

        let output = Command::new(&self.go)
            .arg("build")
            .arg("-o")
            .arg(exe)
            .arg(".")
            .current_dir(source_dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Err(BuildError::Failed {
            status: output.status,
            output: String::from_utf8_lossy(&combined).into_owned(),
        })
    }
}
