//! Error types for the SMTP client.

use std::{io, time::Duration};

use thiserror::Error;

/// Errors that can occur when using the SMTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// The server answered with a code the command does not accept.
    #[error("SMTP error: {code} - {message}")]
    SmtpError {
        code: u16,
        enhanced_code: Option<String>,
        message: String,
    },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// A command was issued in a state where it cannot be sent.
    #[error("Invalid command sequence: {0}")]
    Sequence(&'static str),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// A read or write exceeded the configured command timeout.
    #[error("SMTP exchange timed out after {0:?}")]
    Timeout(Duration),
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
