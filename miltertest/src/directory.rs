//! One test directory: a program embedding the filter under test, plus the
//! scripted cases replayed against it.
//!
//! The program is built into a private scratch directory, launched with the
//! harness's network parameters, and supervised by a background task that
//! captures its combined output and exit status. Readiness is established by
//! polling the milter port; an exit of the program cancels that wait.

use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use miltertest_common::{Config, Mta, Script, internal};
use miltertest_smtp::StepDriver;
use miltertest_tracing::traced;
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::{OnceCell, watch},
    task::JoinHandle,
};

use crate::{
    build::ProgramBuilder,
    case::TestCase,
    error::{NotReadyError, StartError},
    exit::ExitReport,
    port::wait_for_port,
};

/// File name of the built program inside the scratch directory.
pub const EXECUTABLE: &str = "test.exe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Built,
    Launched,
    /// The milter port accepted a connection.
    Ready,
    Stopped,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Built => "built",
            Self::Launched => "launched",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Default)]
struct Status {
    exit: Option<ExitReport>,
    failed_test: bool,
}

/// State shared between a directory, its cases and its supervising task.
#[derive(Debug)]
pub(crate) struct DirectoryState {
    path: PathBuf,
    mta: Arc<Mta>,
    status: Mutex<Status>,
    output: Mutex<Vec<u8>>,
}

impl DirectoryState {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn mark_failed_test(&self) {
        self.status.lock().failed_test = true;
        self.mta.mark_failed_test();
    }

    fn has_failed_test(&self) -> bool {
        self.status.lock().failed_test
    }

    fn exit_report(&self) -> Option<ExitReport> {
        self.status.lock().exit
    }

    /// Stores the exit report and returns whether a case had failed by then.
    fn record_exit(&self, report: ExitReport) -> bool {
        let mut status = self.status.lock();
        status.exit = Some(report);
        status.failed_test
    }
}

/// The supervised program.
struct Process {
    pid: Option<u32>,
    exited: watch::Receiver<bool>,
    drain: JoinHandle<()>,
}

impl Process {
    fn terminate(&self) {
        if *self.exited.borrow() {
            return;
        }

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };

        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to {pid} failed: {err}");
        }
    }
}

pub struct TestDirectory {
    index: usize,
    config: Arc<Config>,
    state: Arc<DirectoryState>,
    cases: Vec<TestCase>,
    phase: Phase,
    process: Mutex<Option<Process>>,
    stopped: OnceCell<()>,
}

impl TestDirectory {
    #[must_use]
    pub fn new(index: usize, path: impl Into<PathBuf>, config: Arc<Config>, mta: Arc<Mta>) -> Self {
        Self {
            index,
            config,
            state: Arc::new(DirectoryState {
                path: path.into(),
                mta,
                status: Mutex::default(),
                output: Mutex::default(),
            }),
            cases: Vec::new(),
            phase: Phase::Uninitialized,
            process: Mutex::new(None),
            stopped: OnceCell::new(),
        }
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        self.state.path()
    }

    pub fn mta(&self) -> &Mta {
        &self.state.mta
    }

    /// Where the program is built: `<scratch_dir>/test-<index>`.
    pub fn scratch_dir(&self) -> PathBuf {
        self.config.scratch_dir.join(format!("test-{}", self.index))
    }

    pub fn phase(&self) -> Phase {
        if self.stopped.initialized() {
            Phase::Stopped
        } else {
            self.phase
        }
    }

    /// Adds a case; cases run in the order they were added.
    pub fn add_case(&mut self, path: impl Into<PathBuf>, script: Script) -> &mut TestCase {
        let index = self.cases.len();
        self.cases.push(TestCase::new(
            index,
            path.into(),
            script,
            Arc::clone(&self.state),
        ));
        &mut self.cases[index]
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// How the program terminated, once it has.
    pub fn exit_report(&self) -> Option<ExitReport> {
        self.state.exit_report()
    }

    pub fn has_failed_test(&self) -> bool {
        self.state.has_failed_test()
    }

    /// Flags this directory, and its MTA, as containing a failed case.
    pub fn mark_failed_test(&self) {
        self.state.mark_failed_test();
    }

    /// Combined stdout and stderr captured from the program so far.
    pub fn output(&self) -> Vec<u8> {
        self.state.output.lock().clone()
    }

    /// Builds and launches the program, then waits for its milter port.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::Skipped`] if the program exits with the skip
    /// code. Any other error means the directory is broken; the program has
    /// been stopped before the error is returned.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(dir = %self.path().display())), timing(precision = "ms"))]
    pub async fn start(&mut self, builder: &impl ProgramBuilder) -> Result<(), StartError> {
        if self.stopped.initialized() {
            return Err(StartError::Stopped);
        }
        if self.phase != Phase::Uninitialized {
            return Err(StartError::AlreadyStarted { phase: self.phase });
        }

        let scratch = self.scratch_dir();
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|source| StartError::ScratchDir {
                path: scratch.clone(),
                source,
            })?;

        let exe = scratch.join(EXECUTABLE);
        builder.build(self.path(), &exe).await?;
        self.phase = Phase::Built;

        let port = self.config.milter_port;
        let mut child = Command::new(&exe)
            .arg("-network")
            .arg("tcp")
            .arg("-address")
            .arg(format!(":{port}"))
            .arg("-tags")
            .arg(self.mta().joined_tags())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(StartError::Spawn)?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (exited_tx, mut exited) = watch::channel(false);
        let drain = tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            Arc::clone(&self.state),
            self.config.exit_codes.skip,
            exited_tx,
        ));
        *self.process.lock() = Some(Process {
            pid,
            exited: exited.clone(),
            drain,
        });
        self.phase = Phase::Launched;
        internal!(level = DEBUG, "launched {} as pid {pid:?}", exe.display());

        tokio::time::sleep(self.config.timeouts.startup_grace()).await;

        if let Some(report) = self.exit_report() {
            self.stop().await;
            return Err(if report.is_skip() {
                StartError::Skipped
            } else {
                StartError::ExitedEarly { report }
            });
        }

        let cancelled = async move {
            let _ = exited.wait_for(|done| *done).await;
        };
        let addr = self.config.address(port);
        if let Err(err) = wait_for_port(&addr, self.config.timeouts.readiness(), cancelled).await {
            self.stop().await;
            if self.exit_report().is_some_and(|report| report.is_skip()) {
                return Err(StartError::Skipped);
            }
            return Err(err.into());
        }

        self.phase = Phase::Ready;
        Ok(())
    }

    /// Runs every case in order against the SMTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`NotReadyError`] unless [`start`](Self::start) succeeded
    /// and the directory has not been stopped since.
    pub async fn run_tests(&mut self) -> Result<(), NotReadyError> {
        let phase = self.phase();
        if phase != Phase::Ready {
            return Err(NotReadyError { phase });
        }

        let driver = StepDriver::new(self.config.address(self.config.smtp_port()))
            .with_server_domain(self.config.server_domain.clone())
            .with_command_timeout(self.config.timeouts.command());

        for case in &mut self.cases {
            case.run(&driver).await;
        }

        Ok(())
    }

    /// Terminates the program with `SIGTERM` and waits until its output has
    /// been captured. Only the first call does anything; later and concurrent
    /// calls wait for it to finish.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(dir = %self.path().display())))]
    pub async fn stop(&self) {
        self.stopped.get_or_init(|| self.terminate()).await;
    }

    async fn terminate(&self) {
        let process = self.process.lock().take();
        let Some(process) = process else {
            return;
        };

        process.terminate();
        if let Err(err) = process.drain.await {
            tracing::warn!(dir = %self.path().display(), "output capture failed: {err}");
        }
    }
}

impl Drop for TestDirectory {
    fn drop(&mut self) {
        if let Some(process) = self.process.get_mut().take() {
            process.terminate();
        }
    }
}

impl fmt::Debug for TestDirectory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDirectory")
            .field("index", &self.index)
            .field("path", &self.path())
            .field("phase", &self.phase())
            .field("cases", &self.cases.len())
            .finish_non_exhaustive()
    }
}

/// Owns the child until it exits: drains both pipes, records the exit report,
/// then wakes anyone waiting on `exited`.
async fn supervise(
    mut child: Child,
    stdout: Option<impl AsyncRead + Unpin>,
    stderr: Option<impl AsyncRead + Unpin>,
    state: Arc<DirectoryState>,
    skip_code: i32,
    exited: watch::Sender<bool>,
) {
    tokio::join!(capture(stdout, &state), capture(stderr, &state));

    let report = match child.wait().await {
        Ok(status) => ExitReport::classify(status, skip_code),
        Err(err) => {
            tracing::warn!(dir = %state.path().display(), "failed to wait for test program: {err}");
            ExitReport::lost()
        }
    };

    let failed_test = state.record_exit(report);
    exited.send_replace(true);

    let dir = state.path().display();
    if !report.is_expected() {
        tracing::warn!(%dir, "test program exited unexpectedly: {report}");
    }
    if !report.is_expected() || failed_test {
        let output = state.output.lock().clone();
        tracing::warn!(%dir, "test program output:\n{}", String::from_utf8_lossy(&output));
    }
}

/// Appends everything read from `pipe` to the shared output buffer.
async fn capture(pipe: Option<impl AsyncRead + Unpin>, state: &DirectoryState) {
    let Some(mut pipe) = pipe else {
        return;
    };

    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => state.output.lock().extend_from_slice(&chunk[..read]),
            Err(err) => {
                tracing::debug!("output pipe closed: {err}");
                break;
            }
        }
    }
}
