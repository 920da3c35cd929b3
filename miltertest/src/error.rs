//! Errors surfaced by the directory lifecycle.

use std::{io, path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

use crate::{directory::Phase, exit::ExitReport};

/// Renders the last connection error of a readiness wait, if there was one.
fn last_attempt(last: Option<&io::Error>) -> String {
    last.map_or_else(String::new, |err| format!(" (last attempt: {err})"))
}

/// Why a port never became connectable.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The caller's cancellation fired first, typically because the program exited.
    #[error("readiness wait cancelled{}", last_attempt(.last.as_ref()))]
    Cancelled { last: Option<io::Error> },

    #[error("port not connectable after {limit:?}{}", last_attempt(.last.as_ref()))]
    TimedOut {
        limit: Duration,
        last: Option<io::Error>,
    },
}

impl WaitError {
    /// The error of the most recent connection attempt.
    pub const fn last(&self) -> Option<&io::Error> {
        match self {
            Self::Cancelled { last } | Self::TimedOut { last, .. } => last.as_ref(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to run the build tool: {0}")]
    Io(#[from] io::Error),

    /// The build tool ran and reported failure.
    #[error("build failed with {status}:\n{output}")]
    Failed { status: ExitStatus, output: String },
}

#[derive(Debug, Error)]
pub enum StartError {
    /// The program exited with the skip code: the directory does not apply.
    #[error("test skipped")]
    Skipped,

    #[error("failed to create scratch directory {path}: {source}")]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to launch test program: {0}")]
    Spawn(#[source] io::Error),

    /// The program exited during the startup grace period.
    #[error("test program exited during startup: {report}")]
    ExitedEarly { report: ExitReport },

    /// The port never became connectable; the program has been stopped.
    #[error("test program not ready: {0}")]
    NotReady(#[from] WaitError),

    /// [`stop`](crate::TestDirectory::stop) already ran for this directory.
    #[error("test directory already stopped")]
    Stopped,

    /// `start` ran before; only one program is launched per directory.
    #[error("test directory already started, currently {phase}")]
    AlreadyStarted { phase: Phase },
}

impl StartError {
    /// `true` for the distinguished skip signal, which is not a failure.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Tests were requested from a directory whose program is not serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("test directory is {phase}, not ready")]
pub struct NotReadyError {
    pub phase: Phase,
}
