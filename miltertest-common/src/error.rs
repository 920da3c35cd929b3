//! Error types for the miltertest-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while locating or loading a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid RON for [`Config`](crate::Config).
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// `MILTERTEST_CONFIG` points somewhere that does not exist.
    #[error("MILTERTEST_CONFIG points to non-existent file: {0}")]
    MissingOverride(PathBuf),

    /// None of the default locations held a config file.
    #[error("No configuration file found. Tried:\n{0}")]
    NotFound(String),

    /// A value parsed but makes no sense.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
