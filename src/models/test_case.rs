//! Discovered test case and identity helpers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Separator between the fixture and test parts of an identity.
pub const IDENTITY_SEPARATOR: &str = "::";

/// Split an identity of the form `Fixture::Test` into its two parts.
///
/// Returns `None` unless the identity contains exactly one separator with a
/// non-empty name on each side.
#[must_use]
pub fn split_identity(identity: &str) -> Option<(&str, &str)> {
    let mut parts = identity.split(IDENTITY_SEPARATOR);
    let fixture = parts.next()?;
    let test = parts.next()?;
    if parts.next().is_some() || fixture.is_empty() || test.is_empty() {
        return None;
    }
    Some((fixture, test))
}

/// A single test case reported by a discovery session.
///
/// Immutable once decoded. The identity is unique within one executable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TestCase {
    /// Full identity, `Fixture::Test`.
    pub identity: String,
    /// Fixture part of the identity.
    pub fixture: String,
    /// Test part of the identity.
    pub name: String,
    /// Executable that owns this test.
    pub executable: PathBuf,
    /// Source file as reported by the executable.
    pub source_file: String,
    /// 1-based source line as reported by the executable.
    pub source_line: u32,
}

impl TestCase {
    /// Build a test case from a `Fixture::Test` identity.
    ///
    /// Returns `None` when the identity does not split into exactly one
    /// fixture and one test name.
    #[must_use]
    pub fn new(
        executable: &Path,
        identity: &str,
        source_file: impl Into<String>,
        source_line: u32,
    ) -> Option<Self> {
        let (fixture, name) = split_identity(identity)?;
        Some(Self {
            identity: identity.to_owned(),
            fixture: fixture.to_owned(),
            name: name.to_owned(),
            executable: executable.to_path_buf(),
            source_file: source_file.into(),
            source_line,
        })
    }
}
