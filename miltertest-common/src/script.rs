//! The declarative step language replayed against the SMTP front end, and the
//! outcome it produces.
//!
//! Loading scripts from disk is someone else's job; this module only fixes the
//! shape the loader hands over.

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

/// Username of the second credential fixture.
pub const SECOND_USER: &str = "user2@example.com";

/// Password used for every AUTH identity other than [`SECOND_USER`].
pub const DEFAULT_PASSWORD: &str = "password1";

/// Password used for [`SECOND_USER`].
pub const SECOND_PASSWORD: &str = "password2";

/// Picks the fixture password for an AUTH identity.
pub fn password_for(user: &str) -> &'static str {
    if user == SECOND_USER {
        SECOND_PASSWORD
    } else {
        DEFAULT_PASSWORD
    }
}

/// One instruction of a script. Steps run strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStep {
    /// Greet the server with the given name.
    Helo(String),
    StartTls,
    /// Authenticate (PLAIN) as the given identity.
    Auth(String),
    /// Envelope sender.
    From(String),
    /// One envelope recipient.
    To(String),
    Reset,
    /// Open the DATA stream and write the header block.
    Header(Vec<u8>),
    /// Write the rest of the message and finish the transaction.
    Body(Vec<u8>),
    /// A step kind the loader produced but the driver does not know.
    Unknown(String),
}

impl InputStep {
    /// Builds a step from the loose record a test loader produces.
    pub fn from_parts(what: &str, arg: &str, addr: &str, data: &[u8]) -> Self {
        match what {
            "HELO" => Self::Helo(arg.to_string()),
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(arg.to_string()),
            "FROM" => Self::From(addr.to_string()),
            "TO" => Self::To(addr.to_string()),
            "RESET" => Self::Reset,
            "HEADER" => Self::Header(data.to_vec()),
            "BODY" => Self::Body(data.to_vec()),
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Helo(_) => "HELO",
            Self::StartTls => "STARTTLS",
            Self::Auth(_) => "AUTH",
            Self::From(_) => "FROM",
            Self::To(_) => "TO",
            Self::Reset => "RESET",
            Self::Header(_) => "HEADER",
            Self::Body(_) => "BODY",
            Self::Unknown(kind) => kind,
        }
    }
}

/// The protocol stage a response or failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecisionStep {
    #[default]
    Any,
    Helo,
    From,
    To,
    Data,
    Eom,
}

impl Display for DecisionStep {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Any => "ANY",
            Self::Helo => "HELO",
            Self::From => "FROM",
            Self::To => "TO",
            Self::Data => "DATA",
            Self::Eom => "EOM",
        })
    }
}

/// Terminal status of a replayed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub code: u16,
    pub message: String,
    pub step: DecisionStep,
}

impl SessionOutcome {
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>, step: DecisionStep) -> Self {
        Self {
            code,
            message: message.into(),
            step,
        }
    }
}

impl Display for SessionOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {} @ {}", self.code, self.message, self.step)
    }
}

/// Result of comparing an outcome against what a test expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Skip(String),
    Fail(String),
}

/// Comparison of an observed outcome with the expected decision. Test-case
/// models provide their own; [`ExpectedDecision`] covers the plain case.
pub trait Judge: Send + Sync {
    fn judge(&self, outcome: &SessionOutcome) -> Verdict;
}

/// Expects a specific status code at a specific stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDecision {
    pub code: u16,
    /// [`DecisionStep::Any`] matches every stage.
    pub step: DecisionStep,
    pub message_prefix: Option<String>,
}

impl ExpectedDecision {
    #[must_use]
    pub const fn new(code: u16, step: DecisionStep) -> Self {
        Self {
            code,
            step,
            message_prefix: None,
        }
    }

    #[must_use]
    pub fn with_message_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_prefix = Some(prefix.into());
        self
    }
}

impl Judge for ExpectedDecision {
    fn judge(&self, outcome: &SessionOutcome) -> Verdict {
        if self.step != DecisionStep::Any && self.step != outcome.step {
            return Verdict::Fail(format!(
                "expected decision at {} but got {outcome}",
                self.step
            ));
        }

        if self.code != outcome.code {
            return Verdict::Fail(format!("expected code {} but got {outcome}", self.code));
        }

        if let Some(prefix) = &self.message_prefix
            && !outcome.message.starts_with(prefix.as_str())
        {
            return Verdict::Fail(format!(
                "expected message starting with {prefix:?} but got {outcome}"
            ));
        }

        Verdict::Pass
    }
}

/// A parsed test: the steps to replay and how to judge the result.
#[derive(Clone)]
pub struct Script {
    pub steps: Vec<InputStep>,
    pub expected: Arc<dyn Judge>,
}

impl Script {
    #[must_use]
    pub fn new(steps: Vec<InputStep>, expected: impl Judge + 'static) -> Self {
        Self {
            steps,
            expected: Arc::new(expected),
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Script")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
