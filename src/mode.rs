//! Run-mode protocol version spoken by a test executable.
//!
//! `ProtocolMode` is set per adapter in the settings file (`protocol = ...`)
//! and can be overridden with `--protocol` on the command line. It is never
//! guessed from the executable's output.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How a run session marks the end of each test.
///
/// Defaults to [`ProtocolMode::Explicit`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMode {
    /// Every test ends with an indented `Test Complete:<status>` line.
    #[default]
    Explicit,
    /// Legacy executables: a test ends at the next `Test:`, `Skip:` or
    /// `Complete.` line and fails when it printed any message lines.
    Implicit,
}
