//! Test process supervisor.
//!
//! Owns the lifecycle of at most one test process at a time:
//! - starts it with `kill_on_drop(true)` (and, on Unix, a captured process
//!   in its own process group so `cancel()` also reaches helpers holding
//!   stdout open);
//! - frames stdout through [`LineFramer`] and forwards each line as a
//!   [`SupervisorEvent::Line`];
//! - after exit drains stdout for at most `drain_timeout`, flushing any
//!   pending fragment exactly once, then sends one terminal event.
//!
//! The terminal event ([`SupervisorEvent::Exited`] or
//! [`SupervisorEvent::Failed`]) is always the last event of a session, and
//! the supervisor is idle again by the time it is delivered. Dropping the
//! [`SessionHandle`] before then terminates the process.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::launch::LaunchSpec;
use crate::protocol::framer::LineFramer;
use crate::{AppError, Result};

/// Default bound on the post-exit stdout drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the per-session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type LineStream = FramedRead<ChildStdout, LineFramer>;

/// Notification from a supervised process, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// One complete stdout line.
    Line(String),
    /// The process exited; `None` when it was terminated by a signal.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// Waiting on the process failed.
    Failed {
        /// Error text.
        reason: String,
    },
}

/// Handle to a started session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Identifier recorded on every log line of the session.
    pub session_id: Uuid,
    /// OS process id, when the platform reports one.
    pub pid: Option<u32>,
    /// Ordered session events; closes after the terminal event.
    pub events: mpsc::Receiver<SupervisorEvent>,
    _cancel_on_drop: DropGuard,
}

#[derive(Debug)]
struct ActiveProcess {
    session_id: Uuid,
    cancel: CancellationToken,
}

/// Starts, observes and terminates one test process at a time.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    active: Arc<Mutex<Option<ActiveProcess>>>,
    drain_timeout: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_TIMEOUT)
    }
}

impl ProcessSupervisor {
    /// Create an idle supervisor.
    #[must_use]
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            drain_timeout,
        }
    }

    /// Start a process described by `spec`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when a process is still live.
    /// - [`AppError::Launch`] when the OS refuses to create the process.
    pub fn start(&self, spec: &LaunchSpec) -> Result<SessionHandle> {
        let mut slot = self.lock_active();
        if let Some(active) = slot.as_ref() {
            return Err(AppError::AlreadyRunning(format!(
                "process for session {} is still live",
                active.session_id
            )));
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.arguments)
            .current_dir(&spec.working_directory)
            .envs(&spec.environment)
            .kill_on_drop(true);
        if spec.capture_output {
            cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        }
        // An uncaptured child (a debugger) must stay in the terminal's
        // foreground group.
        #[cfg(unix)]
        if spec.capture_output {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!("failed to start {}: {err}", spec.program.display()))
        })?;

        let stdout = if spec.capture_output {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Launch("failed to capture stdout".into()))?;
            Some(FramedRead::new(stdout, LineFramer::new()))
        } else {
            None
        };

        let session_id = Uuid::new_v4();
        let pid = child.id();
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            %session_id,
            pid,
            command = %spec.command_line(),
            working_directory = %spec.working_directory.display(),
            "test process started"
        );

        *slot = Some(ActiveProcess {
            session_id,
            cancel: cancel.clone(),
        });
        drop(slot);

        let span = info_span!("process", %session_id);
        tokio::spawn(
            supervise(
                Supervised {
                    session_id,
                    process_group: pid.filter(|_| spec.capture_output),
                    child,
                    stdout,
                },
                event_tx,
                cancel.clone(),
                Arc::clone(&self.active),
                self.drain_timeout,
            )
            .instrument(span),
        );

        Ok(SessionHandle {
            session_id,
            pid,
            events: event_rx,
            _cancel_on_drop: cancel.drop_guard(),
        })
    }

    /// Forcibly terminate the live process, if any.
    ///
    /// Idempotent. Returns `true` when a process was signalled.
    pub fn cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(active) => {
                info!(session_id = %active.session_id, "cancel requested");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a process is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_active().is_some()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveProcess>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Session task ──────────────────────────────────────────────────────────────

struct Supervised {
    session_id: Uuid,
    process_group: Option<u32>,
    child: Child,
    stdout: Option<LineStream>,
}

async fn supervise(
    mut process: Supervised,
    event_tx: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
    active: Arc<Mutex<Option<ActiveProcess>>>,
    drain_timeout: Duration,
) {
    let session_id = process.session_id;
    let mut stdout_open = process.stdout.is_some();
    let mut killed = false;

    let status = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled(), if !killed => {
                kill(&mut process.child, process.process_group);
                killed = true;
            }

            item = next_line(&mut process.stdout), if stdout_open => {
                match item {
                    Some(Ok(line)) => forward(&event_tx, line).await,
                    Some(Err(err)) => {
                        warn!(%err, "stdout read failed, ignoring further output");
                        stdout_open = false;
                    }
                    None => {
                        debug!("stdout closed");
                        stdout_open = false;
                    }
                }
            }

            status = process.child.wait() => break status,
        }
    };

    if stdout_open {
        if let Some(lines) = process.stdout.as_mut() {
            drain(lines, &event_tx, drain_timeout).await;
        }
    }

    let terminal = match status {
        Ok(status) => {
            let code = status.code();
            if killed {
                info!(code, "test process cancelled");
            } else {
                info!(code, "test process exited");
            }
            SupervisorEvent::Exited { code }
        }
        Err(err) => {
            warn!(%err, "error waiting for test process");
            SupervisorEvent::Failed {
                reason: format!("wait error: {err}"),
            }
        }
    };

    {
        let mut slot = active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|a| a.session_id == session_id) {
            *slot = None;
        }
    }

    if event_tx.send(terminal).await.is_err() {
        debug!("event receiver dropped before terminal event");
    }
}

/// Next framed line, or pending forever when output is not captured.
async fn next_line(stdout: &mut Option<LineStream>) -> Option<Result<String>> {
    match stdout {
        Some(lines) => lines.next().await,
        None => std::future::pending().await,
    }
}

async fn forward(event_tx: &mpsc::Sender<SupervisorEvent>, line: String) {
    if event_tx.send(SupervisorEvent::Line(line)).await.is_err() {
        debug!("event receiver dropped, discarding line");
    }
}

/// Read stdout to EOF after exit, bounded by `timeout`.
///
/// If a leftover process keeps the pipe open past the bound, whatever is
/// buffered is flushed as final lines instead.
async fn drain(lines: &mut LineStream, event_tx: &mpsc::Sender<SupervisorEvent>, timeout: Duration) {
    let read_to_end = async {
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => forward(event_tx, line).await,
                Err(err) => {
                    warn!(%err, "stdout read failed during drain");
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(timeout, read_to_end).await.is_ok() {
        return;
    }

    warn!(?timeout, "stdout still open after exit, flushing buffered output");
    let mut rest = std::mem::take(lines.read_buffer_mut());
    let mut framer = LineFramer::new();
    while let Ok(Some(line)) = framer.decode_eof(&mut rest) {
        forward(event_tx, line).await;
    }
}

/// Kill the process, or its whole group when it leads one.
fn kill(child: &mut Child, process_group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = process_group.and_then(|pgid| i32::try_from(pgid).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pgid, "sent SIGKILL to process group");
                return;
            }
            Err(nix::errno::Errno::ESRCH) => {
                debug!(pgid, "process group already gone");
                return;
            }
            Err(err) => warn!(pgid, %err, "failed to signal process group"),
        }
    }
    #[cfg(not(unix))]
    let _ = process_group;

    if let Err(err) = child.start_kill() {
        warn!(%err, "failed to kill test process");
    }
}
