use std::{os::unix::fs::PermissionsExt, path::Path};

use miltertest::{BuildError, ProgramBuilder};

/// "Builds" a test program by writing a shell script to the target path.
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    body: String,
}

impl ShellBuilder {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// A program that never exits on its own.
    pub fn long_running() -> Self {
        Self::new("exec sleep 30")
    }
}

impl ProgramBuilder for ShellBuilder {
    async fn build(&self, _source_dir: &Path, exe: &Path) -> Result<(), BuildError> {
        let script = format!("#!/bin/sh\n{}\n", self.body);
        tokio::fs::write(exe, script).await?;
        tokio::fs::set_permissions(exe, std::fs::Permissions::from_mode(0o755)).await?;
        Ok(())
    }
}

/// A builder whose build step always fails.
#[derive(Debug, Clone, Copy)]
pub struct BrokenBuilder;

impl ProgramBuilder for BrokenBuilder {
    async fn build(&self, _source_dir: &Path, _exe: &Path) -> Result<(), BuildError> {
        Err(BuildError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "compiler missing",
        )))
    }
}
