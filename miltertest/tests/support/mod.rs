//! Test support: a stand-in SMTP front end, a builder producing shell
//! programs instead of compiled filters, and a log capture.
#![allow(dead_code)] // Test utility module - not all helpers used in every test

pub mod program;
pub mod smtp;

pub use logs::LogCapture;
pub use program::{BrokenBuilder, ShellBuilder};
pub use smtp::FrontEnd;
