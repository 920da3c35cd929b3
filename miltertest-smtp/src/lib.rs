//! Replays scripted SMTP sessions against a live endpoint.
//!
//! [`client::SmtpClient`] speaks the protocol; [`StepDriver`] maps each
//! [`InputStep`](miltertest_common::InputStep) onto client calls and turns
//! server rejections into ordinary [`SessionOutcome`](miltertest_common::SessionOutcome)s.

pub mod client;
pub mod driver;
pub mod transcript;

pub use client::{ClientError, SmtpClient};
pub use driver::{DriveError, QUEUED_CODE, QUEUED_MESSAGE, StepDriver};
pub use transcript::Transcript;
