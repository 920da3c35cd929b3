//! Test support for driving scripted sessions against a mock SMTP server.

pub mod mock_server;

pub use mock_server::{MockSmtpServer, SmtpCommand};
