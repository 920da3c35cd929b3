//! Harness configuration.
//!
//! The harness reads a single RON document describing where scratch builds go,
//! which ports the subprocess under test and the SMTP front end listen on, and
//! the timing and exit-code contract with the subprocess.
//!
//! ```ron
//! (
//!     scratch_dir: "/tmp/miltertest",
//!     milter_port: 7044,
//!     smtp_port: Some(2525),
//!     timeouts: (readiness_secs: 5),
//!     exit_codes: (skip: 42),
//! )
//! ```

pub mod timeouts;

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use timeouts::Timeouts;

use crate::error::ConfigError;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "MILTERTEST_CONFIG";

const DEFAULT_CONFIG: &str = "./miltertest.config.ron";

/// Exit status contract with the program under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExitCodes {
    /// The program exits with this code when the test does not apply.
    #[serde(default = "defaults::skip_exit_code")]
    pub skip: i32,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            skip: defaults::skip_exit_code(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root for per-directory build output (`<scratch_dir>/test-<index>`).
    #[serde(default = "defaults::scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Port handed to the program under test and awaited for readiness.
    #[serde(default = "defaults::milter_port")]
    pub milter_port: u16,

    /// SMTP endpoint the scripts are replayed against. Falls back to
    /// `milter_port` when unset.
    #[serde(default)]
    pub smtp_port: Option<u16>,

    #[serde(default = "defaults::host")]
    pub host: String,

    /// Name presented for SNI during STARTTLS.
    #[serde(default = "defaults::server_domain")]
    pub server_domain: String,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub exit_codes: ExitCodes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_dir: defaults::scratch_dir(),
            milter_port: defaults::milter_port(),
            smtp_port: None,
            host: defaults::host(),
            server_domain: defaults::server_domain(),
            timeouts: Timeouts::default(),
            exit_codes: ExitCodes::default(),
        }
    }
}

impl Config {
    /// Parses a RON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or a value is invalid.
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the RON document at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails to parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&content)
    }

    /// Finds and loads the configuration using the following precedence:
    /// 1. `MILTERTEST_CONFIG` environment variable
    /// 2. `./miltertest.config.ron`
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found or the one found fails to load.
    pub fn locate() -> Result<Self, ConfigError> {
        Self::locate_in(
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            Path::new(DEFAULT_CONFIG),
        )
    }

    /// Loads `override_path` if given, otherwise `default_path` if it exists.
    fn locate_in(override_path: Option<PathBuf>, default_path: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = override_path {
            if !path.exists() {
                return Err(ConfigError::MissingOverride(path));
            }
            return Self::from_file(path);
        }

        if default_path.exists() {
            return Self::from_file(default_path);
        }

        Err(ConfigError::NotFound(format!(
            "  - {CONFIG_ENV} environment variable\n  - {}",
            default_path.display()
        )))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.milter_port == 0 {
            return Err(ConfigError::Invalid {
                field: "milter_port",
                reason: "must not be zero".to_string(),
            });
        }

        if self.smtp_port == Some(0) {
            return Err(ConfigError::Invalid {
                field: "smtp_port",
                reason: "must not be zero".to_string(),
            });
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Port the step driver connects to.
    pub fn smtp_port(&self) -> u16 {
        self.smtp_port.unwrap_or(self.milter_port)
    }

    /// `host:port` string for the given port.
    pub fn address(&self, port: u16) -> String {
        format!("{}:{port}", self.host)
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join("miltertest")
    }

    pub const fn milter_port() -> u16 {
        7044
    }

    pub fn host() -> String {
        "127.0.0.1".to_string()
    }

    pub fn server_domain() -> String {
        "localhost".to_string()
    }

    pub const fn skip_exit_code() -> i32 {
        42
    }
}
