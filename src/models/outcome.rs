//! Run-session outcome types reported to the collaborator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one test within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The executable announced the test.
    Running,
    /// The test completed successfully.
    Passed,
    /// The test completed with a failure.
    Failed,
    /// The executable skipped the test.
    Skipped,
}

/// One lifecycle update for a test, in executable output order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TestUpdate {
    /// `Fixture::Test` identity.
    pub identity: String,
    /// New lifecycle state.
    pub outcome: RunOutcome,
    /// Diagnostic text; empty unless the test failed.
    pub message: String,
}

impl TestUpdate {
    /// Update without a message.
    #[must_use]
    pub fn new(identity: impl Into<String>, outcome: RunOutcome) -> Self {
        Self {
            identity: identity.into(),
            outcome,
            message: String::new(),
        }
    }

    /// Update carrying a diagnostic message.
    #[must_use]
    pub fn with_message(
        identity: impl Into<String>,
        outcome: RunOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            outcome,
            message: message.into(),
        }
    }
}

/// Which tests a run session should execute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TestSelection {
    /// Every test in the executable.
    #[default]
    All,
    /// Only the listed identities.
    Only(Vec<String>),
}

impl TestSelection {
    /// Identities to pass on the command line; empty for [`TestSelection::All`].
    #[must_use]
    pub fn identities(&self) -> &[String] {
        match self {
            Self::All => &[],
            Self::Only(ids) => ids,
        }
    }
}

impl From<Vec<String>> for TestSelection {
    fn from(ids: Vec<String>) -> Self {
        if ids.is_empty() {
            Self::All
        } else {
            Self::Only(ids)
        }
    }
}

/// Summary of one finished run session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    /// Session identifier used in logs.
    pub session_id: Uuid,
    /// Executable that was run.
    pub executable: PathBuf,
    /// Tests reported passed.
    pub passed: usize,
    /// Tests reported failed.
    pub failed: usize,
    /// Tests reported skipped.
    pub skipped: usize,
    /// Whether the executable emitted its `Complete.` line.
    pub completed: bool,
    /// Process exit code; `None` when terminated by signal or not observed.
    pub exit_code: Option<i32>,
    /// Requested identities the executable never mentioned.
    pub unreported: Vec<String>,
    /// Launch time.
    pub started_at: DateTime<Utc>,
    /// Terminal-state time.
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn new(session_id: Uuid, executable: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            executable,
            passed: 0,
            failed: 0,
            skipped: 0,
            completed: false,
            exit_code: None,
            unreported: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Count a terminal outcome.
    pub(crate) fn record(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Passed => self.passed += 1,
            RunOutcome::Failed => self.failed += 1,
            RunOutcome::Skipped => self.skipped += 1,
            RunOutcome::Running => {}
        }
    }

    /// Number of tests that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Per-executable result of a batched run.
#[derive(Debug)]
pub struct ExecutableRun {
    /// Executable this entry belongs to.
    pub executable: PathBuf,
    /// Session outcome for that executable.
    pub result: crate::Result<RunSummary>,
}
