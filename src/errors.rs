//! Error types shared across the adapter.

use std::fmt::{Display, Formatter};

/// Shared adapter result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Adapter error enumeration covering all session failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Settings file parsing or validation failure.
    Config(String),
    /// The OS refused to create the test process.
    Launch(String),
    /// A discovery or run session is already active on this coordinator.
    AlreadyRunning(String),
    /// The test executable emitted a line the run grammar does not allow.
    ProtocolViolation(String),
    /// The test process exited with a non-zero code, or by signal (`None`).
    ExitNonZero(Option<i32>),
    /// A discovery session did not produce a usable test list.
    DiscoveryFailed(String),
    /// A run session ended without a well-formed result.
    RunFailed(String),
    /// File-system watcher failure.
    Watch(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::ExitNonZero(Some(code)) => write!(f, "exit: process exited with code {code}"),
            Self::ExitNonZero(None) => write!(f, "exit: process terminated by signal"),
            Self::DiscoveryFailed(msg) => write!(f, "discovery failed: {msg}"),
            Self::RunFailed(msg) => write!(f, "run failed: {msg}"),
            Self::Watch(msg) => write!(f, "watch: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<notify::Error> for AppError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}
