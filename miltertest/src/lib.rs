//! Drives filter test programs through their lifecycle.
//!
//! A [`TestDirectory`] builds a program embedding the filter under test,
//! launches it, waits for its milter port and replays each [`TestCase`]
//! script through the SMTP step driver. Per-case states and per-directory
//! failure flags, exit reports and captured output are left for an external
//! reporter to aggregate.
//!
//! Process supervision relies on Unix signals.

pub mod build;
pub mod case;
pub mod directory;
pub mod error;
pub mod exit;
pub mod port;

pub use build::{GoBuilder, ProgramBuilder};
pub use case::{TestCase, TestState};
pub use directory::{Phase, TestDirectory};
pub use error::{BuildError, NotReadyError, StartError, WaitError};
pub use exit::{ExitClass, ExitReport};
pub use port::wait_for_port;
