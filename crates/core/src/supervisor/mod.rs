//! Lifecycle of the single external transcoder process.
//!
//! ```text
//! Absent --start()--> Running --(exit | stop())--> Absent
//! ```
//!
//! A [`Supervisor`] owns at most one child at a time. [`start`](Supervisor::start)
//! refuses to spawn while a child is running. Once spawned, the child is
//! owned by a watcher task that waits for it to exit, records the exit
//! status, and returns the supervisor to [`Status::Absent`]. There is no
//! automatic restart: an unexpected exit is logged and left for the
//! operator.
//!
//! [`stop`](Supervisor::stop) hands a one-shot stop request to the watcher,
//! which signals the child (SIGINT by default) and, when a stop timeout is
//! configured, force-kills it once the grace period expires.

mod signal;

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::TranscoderConfig;
use crate::error::{RelayError, Result};
use crate::transcoder::{self, LineSink, OutputStream, TracingSink, output};

/// Observable state of the process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No transcoder is running.
    Absent,
    /// A transcoder with this OS process ID is running.
    Running { pid: u32 },
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { pid } => Some(*pid),
            Self::Absent => None,
        }
    }
}

/// How a transcoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub pid: u32,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed by one (unix).
    pub signal: Option<i32>,
    pub success: bool,
    /// The process ignored the stop signal and was killed after the grace period.
    pub forced: bool,
}

impl ExitRecord {
    fn new(pid: u32, status: ExitStatus, forced: bool) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            pid,
            code: status.code(),
            signal,
            success: status.success(),
            forced,
        }
    }
}

/// Result of the most recent launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process ran and has exited.
    Exited(ExitRecord),
    /// The process could not be started; the message describes why.
    LaunchFailed(String),
}

struct ProcessHandle {
    pid: u32,
    /// Taken by the first `stop()`, so at most one stop request is ever sent.
    stop_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct State {
    handle: Option<ProcessHandle>,
    last_outcome: Option<Outcome>,
}

/// Owns the lifecycle of one external transcoder.
///
/// Cheap to clone; clones share the same process handle.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<TranscoderConfig>,
    state: Arc<Mutex<State>>,
    status_tx: Arc<watch::Sender<Status>>,
    sink: output::SharedSink,
}

impl Supervisor {
    /// Create a supervisor that logs transcoder output through `tracing`.
    pub fn new(config: TranscoderConfig) -> Self {
        Self::with_sink(config, Box::new(TracingSink))
    }

    /// Create a supervisor that forwards transcoder output to a custom sink.
    pub fn with_sink(config: TranscoderConfig, sink: Box<dyn LineSink>) -> Self {
        let (status_tx, _) = watch::channel(Status::Absent);
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(State::default())),
            status_tx: Arc::new(status_tx),
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Launch the transcoder and return its process ID.
    ///
    /// Launch failures are logged and recorded as [`Outcome::LaunchFailed`]
    /// before being returned; the handle stays absent. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> Result<u32> {
        if let Some(pid) = self.status().pid() {
            return Err(RelayError::AlreadyRunning(pid));
        }

        tracing::info!(
            binary = %self.config.binary,
            input = %self.config.input,
            output = %self.config.output.display(),
            "starting transcoder"
        );

        // No filesystem work under the state lock.
        let prepared = self.prepare();

        let mut state = self.state.lock();
        if let Some(handle) = &state.handle {
            return Err(RelayError::AlreadyRunning(handle.pid));
        }

        let mut child = match prepared.and_then(|cmd| self.spawn(cmd)) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(binary = %self.config.binary, error = %e, "failed to launch transcoder");
                state.last_outcome = Some(Outcome::LaunchFailed(e.to_string()));
                return Err(e);
            }
        };

        let pid = child.id().unwrap_or_default();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            output::spawn_reader(stdout, pid, OutputStream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            output::spawn_reader(stderr, pid, OutputStream::Stderr, line_tx);
        }
        output::spawn_drain(line_rx, self.sink.clone());

        let (stop_tx, stop_rx) = oneshot::channel();
        state.handle = Some(ProcessHandle {
            pid,
            stop_tx: Some(stop_tx),
        });
        self.status_tx.send_replace(Status::Running { pid });
        drop(state);

        tracing::info!(pid, "transcoder running");
        tokio::spawn(self.clone().supervise(child, pid, stop_rx));

        Ok(pid)
    }

    /// Ask the running transcoder to stop.
    ///
    /// Returns `true` if a stop request reached the watcher, `false` if
    /// nothing is running, a stop is already in progress, or the process
    /// exited before the request could be delivered. Does not wait for the
    /// process to exit; see [`wait_for_exit`](Self::wait_for_exit).
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        let Some(handle) = state.handle.as_mut() else {
            return false;
        };
        let Some(stop_tx) = handle.stop_tx.take() else {
            return false;
        };

        tracing::info!(pid = handle.pid, signal = ?self.config.stop_signal, "stopping transcoder");
        // The watcher drops its receiver once the child has exited.
        stop_tx.send(()).is_ok()
    }

    pub fn status(&self) -> Status {
        *self.status_tx.borrow()
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.state.lock().last_outcome.clone()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Wait until no transcoder is running. Returns immediately if absent.
    pub async fn wait_for_exit(&self) {
        let mut rx = self.status_tx.subscribe();
        let _ = rx.wait_for(|status| !status.is_running()).await;
    }

    /// Resolve the binary and create the output directory.
    fn prepare(&self) -> Result<Command> {
        let cmd = transcoder::command(&self.config)?;

        if self.config.create_output_dir {
            if let Some(dir) = self.config.output.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
        }

        Ok(cmd)
    }

    fn spawn(&self, mut cmd: Command) -> Result<Child> {
        cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RelayError::TranscoderNotFound(self.config.binary.clone()),
            _ => RelayError::Spawn(e),
        })
    }

    /// Own the child until it exits, relaying at most one stop request.
    async fn supervise(self, mut child: Child, pid: u32, stop_rx: oneshot::Receiver<()>) {
        let mut forced = false;

        let result = tokio::select! {
            status = child.wait() => status,
            _ = stop_rx => {
                if let Err(e) = signal::deliver(&mut child, self.config.stop_signal) {
                    tracing::warn!(pid, error = %e, "failed to signal transcoder");
                }
                match self.config.stop_timeout() {
                    Some(grace) => match tokio::time::timeout(grace, child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            tracing::warn!(pid, grace_secs = grace.as_secs(), "transcoder ignored stop signal, killing");
                            forced = true;
                            match child.kill().await {
                                Ok(()) => child.wait().await,
                                Err(e) => Err(e),
                            }
                        }
                    },
                    None => child.wait().await,
                }
            }
        };

        self.record_exit(pid, result, forced);
    }

    fn record_exit(&self, pid: u32, result: io::Result<ExitStatus>, forced: bool) {
        let record = match result {
            Ok(status) => ExitRecord::new(pid, status, forced),
            Err(e) => {
                tracing::error!(pid, error = %e, "failed to wait for transcoder");
                ExitRecord {
                    pid,
                    code: None,
                    signal: None,
                    success: false,
                    forced,
                }
            }
        };

        if record.success {
            tracing::info!(pid, code = ?record.code, "transcoder exited");
        } else {
            tracing::warn!(
                pid,
                code = ?record.code,
                signal = ?record.signal,
                forced = record.forced,
                "transcoder exited unsuccessfully"
            );
        }

        let mut state = self.state.lock();
        state.handle = None;
        state.last_outcome = Some(Outcome::Exited(record));
        self.status_tx.send_replace(Status::Absent);
    }
}
