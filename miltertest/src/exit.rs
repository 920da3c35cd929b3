//! Classification of how the program under test terminated.

use std::{
    fmt::{self, Display, Formatter},
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
};

use nix::sys::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit status 0, or terminated by the `SIGTERM` the harness sends.
    Clean,
    /// Exited with the configured skip code.
    Skip,
    Unexpected,
}

/// Exit status of the program together with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// `None` when the status could not be collected.
    pub status: Option<ExitStatus>,
    pub class: ExitClass,
}

impl ExitReport {
    pub fn classify(status: ExitStatus, skip_code: i32) -> Self {
        let class = if status.code() == Some(skip_code) {
            ExitClass::Skip
        } else if status.success() || status.signal() == Some(Signal::SIGTERM as i32) {
            ExitClass::Clean
        } else {
            ExitClass::Unexpected
        };

        Self {
            status: Some(status),
            class,
        }
    }

    /// Report for a program whose exit status could not be awaited.
    pub const fn lost() -> Self {
        Self {
            status: None,
            class: ExitClass::Unexpected,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.class == ExitClass::Skip
    }

    /// `true` unless the program ended in a way the harness does not expect.
    pub fn is_expected(&self) -> bool {
        self.class != ExitClass::Unexpected
    }
}

impl Display for ExitReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}"),
            None => f.write_str("exit status unavailable"),
        }
    }
}
