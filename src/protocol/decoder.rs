//! Run-mode protocol decoder.
//!
//! A state machine over complete output lines. It tracks the test currently
//! open and the message lines printed for it, and classifies every line
//! into [`ProtocolEvent`]s in output order.
//!
//! # Run-mode grammar (explicit)
//!
//! | Line                         | Meaning                                   |
//! |------------------------------|-------------------------------------------|
//! | `    <text>`                 | message line for the open test            |
//! | `Test Complete:<status>`     | open test finished, `passed` or failed    |
//! | `Skip:<identity>`            | test skipped (no test may be open)        |
//! | `Test:<identity>`            | test started (no test may be open)        |
//! | `Running...`                 | preamble, ignored                         |
//! | `Complete.`                  | run finished, later lines ignored         |
//! | *(anything else)*            | malformed, session aborted                |
//!
//! In [`ProtocolMode::Implicit`] a `Test:`, `Skip:` or `Complete.` line also
//! closes the open test, which fails when it printed any message lines.

use tracing::debug;

use crate::mode::ProtocolMode;

const MESSAGE_INDENT: &str = "    ";
const TEST_COMPLETE_PREFIX: &str = "Test Complete:";
const SKIP_PREFIX: &str = "Skip:";
const TEST_PREFIX: &str = "Test:";
const HEADER_PREFIX: &str = "Running";
const RUN_COMPLETE_PREFIX: &str = "Complete.";
const PASSED_STATUS: &str = "passed";

/// Separator used to join a test's message lines.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
/// Separator used to join a test's message lines.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Final status carried by `Test Complete:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Literal `passed`.
    Passed,
    /// Any other status text.
    Failed,
}

impl CompletionStatus {
    fn parse(status: &str) -> Self {
        if status.trim() == PASSED_STATUS {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// One classified run-mode line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The one-time `Running...` preamble.
    Header,
    /// `Test:<identity>`.
    TestStarted(String),
    /// `Skip:<identity>`.
    TestSkipped(String),
    /// Message text appended to the open test, indentation stripped.
    MessageLine(String),
    /// The open test finished.
    TestCompleted {
        /// Identity of the finished test.
        identity: String,
        /// Reported status.
        status: CompletionStatus,
        /// Message lines joined with [`LINE_SEPARATOR`].
        message: String,
    },
    /// `Complete.`; the session ended successfully.
    RunComplete,
    /// A line the grammar does not allow here; the session is aborted.
    Malformed(String),
}

/// Decoder behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// How the end of a test is marked.
    pub mode: ProtocolMode,
    /// Treat any non-empty line as a message line while a test is open,
    /// instead of aborting.
    pub lenient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    InTest {
        identity: String,
        messages: Vec<String>,
    },
    Finished,
    Aborted { open: Option<String> },
}

/// Line-by-line run-mode state machine for one session.
#[derive(Debug, Clone)]
pub struct RunDecoder {
    options: DecoderOptions,
    state: State,
}

impl RunDecoder {
    /// Create a decoder in its initial state.
    #[must_use]
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            state: State::Idle,
        }
    }

    /// Identity of the test currently open, if any.
    #[must_use]
    pub fn current_test(&self) -> Option<&str> {
        match &self.state {
            State::InTest { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Whether `Complete.` was seen.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Whether a malformed line aborted the session.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self.state, State::Aborted { .. })
    }

    /// Whether later lines are ignored.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Finished | State::Aborted { .. })
    }

    /// Classify one complete line.
    ///
    /// Returns the events it produced, in order. Once the session has
    /// finished or aborted every line yields nothing.
    pub fn feed(&mut self, line: &str) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.is_terminal() || line.is_empty() {
            return events;
        }

        if let Some(text) = line.strip_prefix(MESSAGE_INDENT) {
            self.push_message(text.trim_start(), &mut events);
            return events;
        }

        if let Some(status) = line.strip_prefix(TEST_COMPLETE_PREFIX) {
            match self.take_open_test() {
                Some((identity, messages)) => {
                    events.push(ProtocolEvent::TestCompleted {
                        identity,
                        status: CompletionStatus::parse(status),
                        message: messages.join(LINE_SEPARATOR),
                    });
                }
                None => self.abort(line, &mut events),
            }
            return events;
        }

        if self.current_test().is_some() {
            if self.options.mode == ProtocolMode::Implicit && ends_test_implicitly(line) {
                self.close_implicitly(&mut events);
            } else if self.options.lenient {
                self.push_message(line.trim_start(), &mut events);
                return events;
            } else {
                self.abort(line, &mut events);
                return events;
            }
        }

        self.feed_control(line, &mut events);
        events
    }

    /// Identity of a test left open when the output ended or the session
    /// aborted.
    ///
    /// Ends the session; the caller decides how to report the test.
    pub fn finish(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::InTest { identity, .. } => Some(identity),
            State::Aborted { open } => {
                self.state = State::Aborted { open: None };
                open
            }
            State::Idle | State::Finished => None,
        }
    }

    /// Handle a control line while no test is open.
    fn feed_control(&mut self, line: &str, events: &mut Vec<ProtocolEvent>) {
        if let Some(identity) = identity_after(line, SKIP_PREFIX) {
            events.push(ProtocolEvent::TestSkipped(identity.to_owned()));
        } else if let Some(identity) = identity_after(line, TEST_PREFIX) {
            self.state = State::InTest {
                identity: identity.to_owned(),
                messages: Vec::new(),
            };
            events.push(ProtocolEvent::TestStarted(identity.to_owned()));
        } else if line.starts_with(HEADER_PREFIX) {
            events.push(ProtocolEvent::Header);
        } else if line.starts_with(RUN_COMPLETE_PREFIX) {
            self.state = State::Finished;
            events.push(ProtocolEvent::RunComplete);
        } else {
            self.abort(line, events);
        }
    }

    fn push_message(&mut self, text: &str, events: &mut Vec<ProtocolEvent>) {
        if let State::InTest { messages, .. } = &mut self.state {
            messages.push(text.to_owned());
            events.push(ProtocolEvent::MessageLine(text.to_owned()));
        } else {
            debug!(line = text, "message line outside a test, dropped");
        }
    }

    fn close_implicitly(&mut self, events: &mut Vec<ProtocolEvent>) {
        if let Some((identity, messages)) = self.take_open_test() {
            let status = if messages.is_empty() {
                CompletionStatus::Passed
            } else {
                CompletionStatus::Failed
            };
            events.push(ProtocolEvent::TestCompleted {
                identity,
                status,
                message: messages.join(LINE_SEPARATOR),
            });
        }
    }

    fn take_open_test(&mut self) -> Option<(String, Vec<String>)> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::InTest { identity, messages } => Some((identity, messages)),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn abort(&mut self, line: &str, events: &mut Vec<ProtocolEvent>) {
        let open = self.take_open_test().map(|(identity, _)| identity);
        self.state = State::Aborted { open };
        events.push(ProtocolEvent::Malformed(line.to_owned()));
    }
}

/// Trimmed, non-empty identity following `prefix`.
fn identity_after<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
}

fn ends_test_implicitly(line: &str) -> bool {
    line.starts_with(TEST_PREFIX)
        || line.starts_with(SKIP_PREFIX)
        || line.starts_with(RUN_COMPLETE_PREFIX)
}
