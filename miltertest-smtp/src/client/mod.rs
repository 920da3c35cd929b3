//! SMTP client used to drive a session step by step.
//!
//! The client follows the usual submission client conventions:
//!
//! - The server greeting is read lazily, on the first command.
//! - Commands that need a prior greeting exchange issue `EHLO` implicitly.
//! - `EHLO` falls back to `HELO` when the server does not implement it.
//! - A reply outside the expected codes becomes [`ClientError::SmtpError`],
//!   carrying the code, the RFC 2034 enhanced code (if any) and the text.
//!
//! ```no_run
//! use miltertest_smtp::{SmtpClient, Transcript, client::ClientOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect(
//!     "127.0.0.1:2525",
//!     ClientOptions::new("localhost").with_transcript(Transcript::new()),
//! )
//! .await?;
//!
//! client.hello("client.example.com").await?;
//! client.mail("sender@example.com").await?;
//! client.rcpt("recipient@example.com").await?;
//! client.data().await?;
//! client.write_data(b"Subject: Test\r\n\r\nHello World").await?;
//! client.close_data().await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod data;
mod error;
mod response;
mod smtp_client;
mod tls;

pub use data::DotStuffer;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine, split_enhanced_code};
pub use smtp_client::{ClientOptions, SmtpClient};
