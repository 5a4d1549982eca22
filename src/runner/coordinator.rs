//! Run coordinator: the façade collaborators drive.
//!
//! Accepts discovery, run and debug requests for the executables of one
//! adapter instance, lets at most one session be active at a time, and turns
//! supervisor output into discovery results or per-test lifecycle updates.
//!
//! Requests made while a session is active are rejected with
//! [`AppError::AlreadyRunning`] without queueing.
//!
//! Dropping a request future terminates its process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::AdapterConfig;
use crate::models::discovery::DiscoveryResult;
use crate::models::launch::{LaunchOptions, LaunchSpec};
use crate::models::outcome::{ExecutableRun, RunOutcome, RunSummary, TestSelection, TestUpdate};
use crate::models::test_case::TestCase;
use crate::protocol::decoder::{CompletionStatus, DecoderOptions, ProtocolEvent, RunDecoder};
use crate::protocol::discovery::decode_discovery_line;
use crate::runner::guard::{SessionGuard, SessionSlot};
use crate::supervisor::process::{ProcessSupervisor, SessionHandle, SupervisorEvent};
use crate::{AppError, Result};

/// How a supervised process ended.
type ExitStatus = std::result::Result<Option<i32>, String>;

/// Partition `tests` by owning executable.
///
/// Executables appear in first-seen order, and identities keep their order
/// within each executable.
#[must_use]
pub fn group_by_executable(tests: &[TestCase]) -> Vec<(PathBuf, Vec<String>)> {
    let mut groups: Vec<(PathBuf, Vec<String>)> = Vec::new();
    for test in tests {
        match groups.iter_mut().find(|(exe, _)| *exe == test.executable) {
            Some((_, ids)) => ids.push(test.identity.clone()),
            None => groups.push((test.executable.clone(), vec![test.identity.clone()])),
        }
    }
    groups
}

/// Drives discovery and run sessions for one adapter instance.
///
/// Cloning yields another handle to the same coordinator, so one clone can
/// call [`RunCoordinator::cancel`] while another awaits a session.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    supervisor: ProcessSupervisor,
    launch: Arc<LaunchOptions>,
    decoder: DecoderOptions,
    slot: SessionSlot,
    cancelled: Arc<AtomicBool>,
}

impl RunCoordinator {
    /// Create an idle coordinator.
    #[must_use]
    pub fn new(launch: LaunchOptions, decoder: DecoderOptions, drain_timeout: Duration) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(drain_timeout),
            launch: Arc::new(launch),
            decoder,
            slot: SessionSlot::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a coordinator from adapter settings.
    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(
            config.launch_options(),
            config.decoder_options(),
            config.drain_timeout(),
        )
    }

    /// Whether a session is active or its process is still shutting down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot.is_active() || self.supervisor.is_running()
    }

    /// Terminate the active session's process, if any.
    ///
    /// Safe to call at any time; a batched run stops after the current
    /// executable. A process left behind by an abandoned session is
    /// terminated too.
    pub fn cancel(&self) {
        if self.slot.is_active() {
            self.cancelled.store(true, Ordering::SeqCst);
        }
        if !self.supervisor.cancel() {
            debug!("cancel ignored, no live process");
        }
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    /// List the tests of `executable`, grouped by fixture.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when another session is active.
    /// - [`AppError::DiscoveryFailed`] on launch failure, non-zero exit or
    ///   cancellation.
    pub async fn discover(&self, executable: &Path) -> Result<DiscoveryResult> {
        let _guard = self.acquire("discover")?;
        self.discover_locked(executable).await
    }

    async fn discover_locked(&self, executable: &Path) -> Result<DiscoveryResult> {
        let spec = self.launch.discovery(executable);
        let handle = self
            .start(&spec)
            .map_err(|err| AppError::DiscoveryFailed(err.to_string()))?;
        let span = info_span!(
            "discover",
            session_id = %handle.session_id,
            executable = %executable.display()
        );
        self.collect_discovery(executable, handle)
            .instrument(span)
            .await
    }

    async fn collect_discovery(
        &self,
        executable: &Path,
        mut handle: SessionHandle,
    ) -> Result<DiscoveryResult> {
        let mut result = DiscoveryResult::new(executable);
        let mut exit: Option<ExitStatus> = None;

        while let Some(event) = handle.events.recv().await {
            match event {
                SupervisorEvent::Line(line) => match decode_discovery_line(executable, &line) {
                    Ok(Some(test)) => {
                        debug!(identity = %test.identity, line = test.source_line, "test discovered");
                        result.insert(test);
                    }
                    Ok(None) => {}
                    Err(warning) => {
                        warn!(%warning, "skipping discovery line");
                        result.warn(warning);
                    }
                },
                SupervisorEvent::Exited { code } => exit = Some(Ok(code)),
                SupervisorEvent::Failed { reason } => exit = Some(Err(reason)),
            }
        }

        if self.cancelled.load(Ordering::SeqCst) {
            warn!("discovery cancelled");
            return Err(AppError::DiscoveryFailed("discovery cancelled".into()));
        }
        match exit {
            Some(Ok(Some(0))) => {
                info!(
                    tests = result.len(),
                    fixtures = result.fixtures.len(),
                    warnings = result.warnings.len(),
                    "discovery finished"
                );
                Ok(result)
            }
            Some(Ok(code)) => {
                let err = AppError::ExitNonZero(code);
                warn!(%err, "discovery process failed");
                Err(AppError::DiscoveryFailed(err.to_string()))
            }
            Some(Err(reason)) => Err(AppError::DiscoveryFailed(reason)),
            None => Err(AppError::DiscoveryFailed(
                "process ended without an exit status".into(),
            )),
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────────

    /// Run `selection` from `executable`, sending lifecycle updates in
    /// output order.
    ///
    /// Returns once the process has exited. No test is left in the `running`
    /// state: a test still open when the session fails gets a final `failed`
    /// update carrying the reason.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when another session is active.
    /// - [`AppError::RunFailed`] on launch failure, protocol violation,
    ///   non-zero exit or cancellation. Updates already sent stay valid.
    pub async fn run(
        &self,
        executable: &Path,
        selection: &TestSelection,
        updates: &mpsc::Sender<TestUpdate>,
    ) -> Result<RunSummary> {
        let _guard = self.acquire("run")?;
        self.run_locked(executable, selection, updates).await
    }

    /// Run `tests`, one process per owning executable.
    ///
    /// The session guard is held for the whole batch. After a cancel the
    /// remaining executables are not started.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyRunning`] when another session is active.
    /// Per-executable failures are reported in the returned entries.
    pub async fn run_tests(
        &self,
        tests: &[TestCase],
        updates: &mpsc::Sender<TestUpdate>,
    ) -> Result<Vec<ExecutableRun>> {
        let _guard = self.acquire("run_tests")?;
        let mut runs = Vec::new();
        for (executable, identities) in group_by_executable(tests) {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(executable = %executable.display(), "batch cancelled, not started");
                break;
            }
            let selection = TestSelection::from(identities);
            let result = self.run_locked(&executable, &selection, updates).await;
            runs.push(ExecutableRun { executable, result });
        }
        Ok(runs)
    }

    /// Discover then run every test of each executable.
    ///
    /// Executables whose discovery fails get an entry carrying that error;
    /// executables without tests are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyRunning`] when another session is active.
    pub async fn run_all(
        &self,
        executables: &[PathBuf],
        updates: &mpsc::Sender<TestUpdate>,
    ) -> Result<Vec<ExecutableRun>> {
        let _guard = self.acquire("run_all")?;
        let mut runs = Vec::new();
        for executable in executables {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(executable = %executable.display(), "batch cancelled, not started");
                break;
            }
            let discovered = match self.discover_locked(executable).await {
                Ok(discovered) => discovered,
                Err(err) => {
                    runs.push(ExecutableRun {
                        executable: executable.clone(),
                        result: Err(err),
                    });
                    continue;
                }
            };
            if discovered.is_empty() {
                info!(executable = %executable.display(), "no tests discovered, skipping run");
                continue;
            }
            let selection = TestSelection::from(
                discovered
                    .tests()
                    .map(|test| test.identity.clone())
                    .collect::<Vec<_>>(),
            );
            let result = self.run_locked(executable, &selection, updates).await;
            runs.push(ExecutableRun {
                executable: executable.clone(),
                result,
            });
        }
        Ok(runs)
    }

    async fn run_locked(
        &self,
        executable: &Path,
        selection: &TestSelection,
        updates: &mpsc::Sender<TestUpdate>,
    ) -> Result<RunSummary> {
        let spec = self.launch.run(executable, selection);
        let handle = self
            .start(&spec)
            .map_err(|err| AppError::RunFailed(err.to_string()))?;
        let span = info_span!(
            "run",
            session_id = %handle.session_id,
            executable = %executable.display()
        );
        RunSession::new(handle, executable, self.decoder, updates)
            .drive(selection, &self.cancelled)
            .instrument(span)
            .await
    }

    // ── Debug ────────────────────────────────────────────────────────────────

    /// Launch `selection` under the configured debugger without capturing
    /// output, and wait for the process to end.
    ///
    /// No per-test outcome is produced. Returns the exit code, `None` when
    /// the process was terminated by a signal.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when another session is active.
    /// - [`AppError::RunFailed`] when the process cannot be started or
    ///   waited on.
    pub async fn debug(&self, executable: &Path, selection: &TestSelection) -> Result<Option<i32>> {
        let _guard = self.acquire("debug")?;
        let spec = self.launch.debug(executable, selection);
        let mut handle = self
            .start(&spec)
            .map_err(|err| AppError::RunFailed(err.to_string()))?;
        let span = info_span!("debug", session_id = %handle.session_id);

        async move {
            while let Some(event) = handle.events.recv().await {
                match event {
                    SupervisorEvent::Line(_) => {}
                    SupervisorEvent::Exited { code } => {
                        info!(code, "debug session ended");
                        return Ok(code);
                    }
                    SupervisorEvent::Failed { reason } => return Err(AppError::RunFailed(reason)),
                }
            }
            Err(AppError::RunFailed(
                "process ended without an exit status".into(),
            ))
        }
        .instrument(span)
        .await
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    fn acquire(&self, operation: &'static str) -> Result<SessionGuard> {
        // A dropped session's process may still be exiting.
        let guard = self
            .slot
            .try_acquire()
            .filter(|_| !self.supervisor.is_running());
        match guard {
            Some(guard) => {
                self.cancelled.store(false, Ordering::SeqCst);
                Ok(guard)
            }
            None => {
                warn!(operation, "rejected, another session is active");
                Err(AppError::AlreadyRunning(format!(
                    "cannot {operation} while another session is active"
                )))
            }
        }
    }

    /// Start a process, honouring a cancel that raced with the launch.
    fn start(&self, spec: &LaunchSpec) -> Result<SessionHandle> {
        let handle = self.supervisor.start(spec)?;
        if self.cancelled.load(Ordering::SeqCst) {
            self.supervisor.cancel();
        }
        Ok(handle)
    }
}

// ── Run session ───────────────────────────────────────────────────────────────

/// State of one run session while its output is consumed.
struct RunSession<'a> {
    handle: SessionHandle,
    decoder: RunDecoder,
    updates: &'a mpsc::Sender<TestUpdate>,
    summary: RunSummary,
    mentioned: HashSet<String>,
    violation: Option<String>,
}

impl<'a> RunSession<'a> {
    fn new(
        handle: SessionHandle,
        executable: &Path,
        options: DecoderOptions,
        updates: &'a mpsc::Sender<TestUpdate>,
    ) -> Self {
        let summary = RunSummary::new(handle.session_id, executable.to_path_buf());
        Self {
            handle,
            decoder: RunDecoder::new(options),
            updates,
            summary,
            mentioned: HashSet::new(),
            violation: None,
        }
    }

    async fn drive(
        mut self,
        selection: &TestSelection,
        cancelled: &AtomicBool,
    ) -> Result<RunSummary> {
        let mut exit: Option<ExitStatus> = None;
        while let Some(event) = self.handle.events.recv().await {
            match event {
                SupervisorEvent::Line(line) => {
                    for event in self.decoder.feed(&line) {
                        self.apply(event).await;
                    }
                }
                SupervisorEvent::Exited { code } => exit = Some(Ok(code)),
                SupervisorEvent::Failed { reason } => exit = Some(Err(reason)),
            }
        }

        if let Some(Ok(code)) = exit {
            self.summary.exit_code = code;
        }
        let mut failure = if cancelled.load(Ordering::SeqCst) {
            Some("run cancelled".to_owned())
        } else if let Some(line) = self.violation.take() {
            Some(AppError::ProtocolViolation(format!("unexpected line {line:?}")).to_string())
        } else {
            match exit {
                Some(Ok(Some(0))) => None,
                Some(Ok(code)) => Some(AppError::ExitNonZero(code).to_string()),
                Some(Err(reason)) => Some(reason),
                None => Some("process ended without an exit status".to_owned()),
            }
        };

        if let Some(identity) = self.decoder.finish() {
            let reason = failure
                .get_or_insert_with(|| format!("output ended while {identity} was running"))
                .clone();
            warn!(%identity, %reason, "closing test left running");
            self.summary.record(RunOutcome::Failed);
            self.send(TestUpdate::with_message(identity, RunOutcome::Failed, reason))
                .await;
        }

        self.summary.unreported = selection
            .identities()
            .iter()
            .filter(|id| !self.mentioned.contains(*id))
            .cloned()
            .collect();
        self.summary.finished_at = Utc::now();

        match failure {
            Some(reason) => {
                warn!(
                    %reason,
                    passed = self.summary.passed,
                    failed = self.summary.failed,
                    skipped = self.summary.skipped,
                    "run failed"
                );
                Err(AppError::RunFailed(reason))
            }
            None => {
                info!(
                    passed = self.summary.passed,
                    failed = self.summary.failed,
                    skipped = self.summary.skipped,
                    unreported = self.summary.unreported.len(),
                    "run finished"
                );
                Ok(self.summary)
            }
        }
    }

    async fn apply(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::Header => debug!("run header"),
            ProtocolEvent::TestStarted(identity) => {
                debug!(%identity, "test started");
                self.mentioned.insert(identity.clone());
                self.send(TestUpdate::new(identity, RunOutcome::Running))
                    .await;
            }
            ProtocolEvent::TestSkipped(identity) => {
                debug!(%identity, "test skipped");
                self.mentioned.insert(identity.clone());
                self.summary.record(RunOutcome::Skipped);
                self.send(TestUpdate::new(identity, RunOutcome::Skipped))
                    .await;
            }
            ProtocolEvent::MessageLine(text) => debug!(%text, "test message"),
            ProtocolEvent::TestCompleted {
                identity,
                status,
                message,
            } => {
                let outcome = match status {
                    CompletionStatus::Passed => RunOutcome::Passed,
                    CompletionStatus::Failed => RunOutcome::Failed,
                };
                debug!(%identity, ?outcome, "test completed");
                self.summary.record(outcome);
                self.send(TestUpdate::with_message(identity, outcome, message))
                    .await;
            }
            ProtocolEvent::RunComplete => {
                debug!("run complete");
                self.summary.completed = true;
            }
            ProtocolEvent::Malformed(line) => {
                warn!(%line, "protocol violation, ignoring further output");
                self.violation = Some(line);
            }
        }
    }

    async fn send(&self, update: TestUpdate) {
        if self.updates.send(update).await.is_err() {
            debug!("update receiver dropped");
        }
    }
}
