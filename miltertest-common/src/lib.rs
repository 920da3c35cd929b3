pub mod config;
pub mod error;
pub mod logging;
pub mod mta;
pub mod script;

pub use tracing;

pub use config::Config;
pub use error::ConfigError;
pub use mta::Mta;
pub use script::{DecisionStep, ExpectedDecision, InputStep, Judge, Script, SessionOutcome, Verdict};
