//! Replays a script of [`InputStep`]s against a live SMTP endpoint.
//!
//! A rejection by the server is a legitimate outcome of a filter test, not a
//! driver failure: every [`ClientError::SmtpError`] is folded into a
//! [`SessionOutcome`] attributed to the stage where it happened. Only
//! transport problems and malformed scripts surface as [`DriveError`].

use std::time::Duration;

use miltertest_common::{DecisionStep, InputStep, SessionOutcome, internal, script::password_for};
use miltertest_tracing::traced;
use thiserror::Error;

use crate::{
    client::{ClientError, ClientOptions, SmtpClient},
    transcript::Transcript,
};

/// Status reported once the final DATA block was accepted.
pub const QUEUED_CODE: u16 = 250;
pub const QUEUED_MESSAGE: &str = "OK: queued";

#[derive(Debug, Error)]
pub enum DriveError {
    /// The connection, TLS layer or socket I/O failed.
    #[error("transport failure at {step}: {source}")]
    Transport {
        step: DecisionStep,
        #[source]
        source: ClientError,
    },

    #[error("unknown step {0}")]
    UnknownStep(String),

    /// The script ran out of steps before a BODY step finished the message.
    #[error("incomplete input sequence")]
    IncompleteSequence,

    /// A BODY step ran without a preceding HEADER step.
    #[error("BODY step without an open DATA stream")]
    DataNotOpen,
}

impl DriveError {
    /// The protocol stage this failure is attributed to.
    pub const fn step(&self) -> DecisionStep {
        match self {
            Self::Transport { step, .. } => *step,
            Self::UnknownStep(_) | Self::DataNotOpen => DecisionStep::Any,
            Self::IncompleteSequence => DecisionStep::Eom,
        }
    }
}

/// Folds an SMTP rejection into an outcome; anything else is a transport error.
fn settle(err: ClientError, step: DecisionStep) -> Result<SessionOutcome, DriveError> {
    match err {
        ClientError::SmtpError { code, message, .. } => {
            Ok(SessionOutcome::new(code, message, step))
        }
        source => Err(DriveError::Transport { step, source }),
    }
}

/// Drives one SMTP session per [`send`](Self::send) call.
#[derive(Debug, Clone)]
pub struct StepDriver {
    addr: String,
    options: ClientOptions,
}

impl StepDriver {
    /// Creates a driver targeting `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            options: ClientOptions::new("localhost"),
        }
    }

    /// Name presented for SNI during STARTTLS.
    #[must_use]
    pub fn with_server_domain(mut self, domain: impl Into<String>) -> Self {
        self.options.server_domain = domain.into();
        self
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Buffer receiving both directions of the session traffic.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.options.transcript = transcript;
        self
    }

    pub const fn transcript(&self) -> &Transcript {
        &self.options.transcript
    }

    /// Replays `steps` in order over a fresh connection.
    ///
    /// Returns the terminal status once a BODY step completes the message or
    /// the server rejects a step. The connection is released on every path.
    ///
    /// # Errors
    ///
    /// Returns a [`DriveError`] for transport failures, unknown steps, a BODY
    /// step without HEADER, or a script that ends before any BODY step.
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self, steps), fields(addr = %self.addr)), timing(precision = "ms"))]
    pub async fn send(&self, steps: &[InputStep]) -> Result<SessionOutcome, DriveError> {
        let mut client = SmtpClient::connect(&self.addr, self.options.clone())
            .await
            .map_err(|source| DriveError::Transport {
                step: DecisionStep::Any,
                source,
            })?;

        for step in steps {
            internal!("step {}", step.kind());

            let (result, stage) = match step {
                InputStep::Helo(name) => (client.hello(name).await, DecisionStep::Helo),
                InputStep::StartTls => (client.starttls().await, DecisionStep::Any),
                InputStep::Auth(user) => (
                    client.auth_plain(user, password_for(user)).await,
                    DecisionStep::Any,
                ),
                InputStep::From(addr) => (client.mail(addr).await, DecisionStep::From),
                InputStep::To(addr) => (client.rcpt(addr).await, DecisionStep::To),
                InputStep::Reset => (client.reset().await, DecisionStep::Any),
                InputStep::Header(content) => {
                    if let Err(err) = client.data().await {
                        return settle(err, DecisionStep::Data);
                    }
                    (client.write_data(content).await, DecisionStep::Any)
                }
                InputStep::Body(content) => {
                    if !client.is_data_open() {
                        return Err(DriveError::DataNotOpen);
                    }
                    if let Err(err) = client.write_data(content).await {
                        return settle(err, DecisionStep::Any);
                    }
                    if let Err(err) = client.close_data().await {
                        return settle(err, DecisionStep::Eom);
                    }

                    if let Err(err) = client.quit().await {
                        tracing::debug!("QUIT after accepted message failed: {err}");
                    }
                    return Ok(SessionOutcome::new(
                        QUEUED_CODE,
                        QUEUED_MESSAGE,
                        DecisionStep::Eom,
                    ));
                }
                InputStep::Unknown(kind) => return Err(DriveError::UnknownStep(kind.clone())),
            };

            if let Err(err) = result {
                return settle(err, stage);
            }
        }

        Err(DriveError::IncompleteSequence)
    }
}
