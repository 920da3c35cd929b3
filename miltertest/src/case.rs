//! A single scripted SMTP session and its verdict.

use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
    sync::Arc,
};

use miltertest_common::{Script, SessionOutcome, Verdict};
use miltertest_smtp::{DriveError, StepDriver, Transcript};

use crate::directory::DirectoryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestState {
    #[default]
    Ready,
    Ok,
    Skipped,
    Failed,
}

impl Display for TestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// One script from a test directory. Its state is set exactly once.
pub struct TestCase {
    index: usize,
    path: PathBuf,
    script: Script,
    transcript: Transcript,
    state: TestState,
    directory: Arc<DirectoryState>,
}

impl TestCase {
    pub(crate) fn new(
        index: usize,
        path: PathBuf,
        script: Script,
        directory: Arc<DirectoryState>,
    ) -> Self {
        Self {
            index,
            path,
            script,
            transcript: Transcript::new(),
            state: TestState::Ready,
            directory,
        }
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the script, for log lines.
    pub fn filename(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }

    pub const fn script(&self) -> &Script {
        &self.script
    }

    pub const fn state(&self) -> TestState {
        self.state
    }

    /// Both directions of every session this case drove.
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Replays the script through `driver`, mirroring traffic into this
    /// case's transcript.
    ///
    /// # Errors
    ///
    /// Returns the driver's error for transport failures and malformed scripts.
    pub async fn send(&self, driver: &StepDriver) -> Result<SessionOutcome, DriveError> {
        driver
            .clone()
            .with_transcript(self.transcript.clone())
            .send(&self.script.steps)
            .await
    }

    /// Sends the script, judges the outcome and records the resulting state.
    pub async fn run(&mut self, driver: &StepDriver) -> TestState {
        match self.send(driver).await {
            Ok(outcome) => match self.script.expected.judge(&outcome) {
                Verdict::Pass => self.mark_ok(outcome),
                Verdict::Skip(reason) => self.mark_skipped(reason),
                Verdict::Fail(reason) => self.mark_failed(reason),
            },
            Err(err) => {
                let step = err.step();
                self.mark_failed(format_args!("{err} (at {step})"));
            }
        }

        self.state
    }

    pub fn mark_ok(&mut self, note: impl Display) {
        if self.settle(TestState::Ok) {
            tracing::info!(case = %self.filename(), "ok: {note}");
        }
    }

    pub fn mark_skipped(&mut self, reason: impl Display) {
        if self.settle(TestState::Skipped) {
            tracing::info!(case = %self.filename(), "skipped: {reason}");
        }
    }

    /// Fails the case, flags its directory and dumps the SMTP transcript.
    pub fn mark_failed(&mut self, reason: impl Display) {
        if self.settle(TestState::Failed) {
            self.directory.mark_failed_test();

            let case = self.filename();
            let dir = self.directory.path().display();
            tracing::warn!(%case, %dir, "FAILED: {reason}");
            tracing::warn!(%case, "SMTP transaction:\n{}", self.transcript);
        }
    }

    /// Moves out of `Ready`. Returns `false` if the state was already set.
    fn settle(&mut self, state: TestState) -> bool {
        if self.state != TestState::Ready {
            tracing::debug!(
                case = %self.filename(),
                "ignoring transition to {state}: already {}",
                self.state
            );
            return false;
        }

        self.state = state;
        true
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
