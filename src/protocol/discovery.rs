//! Discovery-mode grammar.
//!
//! Each non-empty line has the form `Fixture::Test,SourceFile,SourceLine`.
//! Lines that do not fit are reported as [`DecodeWarning`]s and skipped; a
//! bad line never aborts the discovery session.

use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::Serialize;

use crate::models::test_case::{split_identity, TestCase};

/// Number of comma-separated fields on a discovery line.
const FIELD_COUNT: usize = 3;

/// A discovery line that was skipped, and why.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DecodeWarning {
    /// Raw line as received.
    pub line: String,
    /// Human-readable reason.
    pub reason: String,
}

impl DecodeWarning {
    fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_owned(),
            reason: reason.into(),
        }
    }
}

impl Display for DecodeWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.reason, self.line)
    }
}

/// Decode one discovery line for `executable`.
///
/// # Return value
///
/// - `Ok(Some(test))` for a well-formed line.
/// - `Ok(None)` for an empty or whitespace-only line.
///
/// # Errors
///
/// Returns a [`DecodeWarning`] when the field count is not three, the
/// identity lacks exactly one `::`, or the source line is not a base-10
/// integer.
pub fn decode_discovery_line(
    executable: &Path,
    line: &str,
) -> std::result::Result<Option<TestCase>, DecodeWarning> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeWarning::new(
            line,
            format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
        ));
    }

    let identity = fields[0].trim();
    if split_identity(identity).is_none() {
        return Err(DecodeWarning::new(line, "identity is not Fixture::Test"));
    }
    let source_line: u32 = fields[2]
        .trim()
        .parse()
        .map_err(|_| DecodeWarning::new(line, "source line is not a number"))?;

    TestCase::new(executable, identity, fields[1].trim(), source_line)
        .map(Some)
        .ok_or_else(|| DecodeWarning::new(line, "identity is not Fixture::Test"))
}
