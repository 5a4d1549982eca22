//! Domain model module declarations.

pub mod discovery;
pub mod launch;
pub mod outcome;
pub mod test_case;

pub use discovery::{DiscoveryResult, FixtureGroup};
pub use launch::{LaunchOptions, LaunchSpec};
pub use outcome::{ExecutableRun, RunOutcome, RunSummary, TestSelection, TestUpdate};
pub use test_case::TestCase;
