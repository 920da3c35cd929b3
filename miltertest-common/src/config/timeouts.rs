//! Timing contract between the harness and the program under test.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Timeouts {
    /// Delay after launch before checking whether the program already exited.
    ///
    /// Default: 1000 milliseconds
    #[serde(default = "defaults::startup_grace_ms")]
    pub startup_grace_ms: u64,

    /// Upper bound on waiting for the milter port to accept connections.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::readiness_secs")]
    pub readiness_secs: u64,

    /// Bound on each SMTP read or write. `None` leaves the exchange unbounded.
    ///
    /// Default: unset
    #[serde(default)]
    pub command_secs: Option<u64>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_grace_ms: defaults::startup_grace_ms(),
            readiness_secs: defaults::readiness_secs(),
            command_secs: None,
        }
    }
}

impl Timeouts {
    pub const fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub const fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn command(&self) -> Option<Duration> {
        self.command_secs.map(Duration::from_secs)
    }
}

mod defaults {
    pub const fn startup_grace_ms() -> u64 {
        1000
    }

    pub const fn readiness_secs() -> u64 {
        10
    }
}
