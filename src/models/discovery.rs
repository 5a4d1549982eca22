//! Discovery session result: test cases grouped by fixture.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::test_case::TestCase;
use crate::protocol::discovery::DecodeWarning;

/// Tests belonging to one fixture, in the order the executable listed them.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FixtureGroup {
    /// Fixture name.
    pub name: String,
    /// Tests of this fixture in first-seen order.
    pub tests: Vec<TestCase>,
}

/// Ordered result of one discovery session.
///
/// Fixture groups appear in the order their first test was seen, and each
/// group is created at most once.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    /// Executable that was queried.
    pub executable: PathBuf,
    /// Fixture groups in first-seen order.
    pub fixtures: Vec<FixtureGroup>,
    /// Lines that could not be decoded and were skipped.
    pub warnings: Vec<DecodeWarning>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DiscoveryResult {
    /// Create an empty result for `executable`.
    #[must_use]
    pub fn new(executable: &Path) -> Self {
        Self {
            executable: executable.to_path_buf(),
            fixtures: Vec::new(),
            warnings: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Append a test to its fixture group, creating the group on first use.
    pub fn insert(&mut self, test: TestCase) {
        let slot = match self.index.get(&test.fixture) {
            Some(&slot) => slot,
            None => {
                let slot = self.fixtures.len();
                self.index.insert(test.fixture.clone(), slot);
                self.fixtures.push(FixtureGroup {
                    name: test.fixture.clone(),
                    tests: Vec::new(),
                });
                slot
            }
        };
        self.fixtures[slot].tests.push(test);
    }

    /// Record a skipped discovery line.
    pub fn warn(&mut self, warning: DecodeWarning) {
        self.warnings.push(warning);
    }

    /// Iterate every discovered test in fixture order.
    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.fixtures.iter().flat_map(|group| group.tests.iter())
    }

    /// Look up a test by identity.
    #[must_use]
    pub fn find(&self, identity: &str) -> Option<&TestCase> {
        self.tests().find(|test| test.identity == identity)
    }

    /// Total number of discovered tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fixtures.iter().map(|group| group.tests.len()).sum()
    }

    /// Whether no test was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Consume the result, yielding the tests in fixture order.
    #[must_use]
    pub fn into_tests(self) -> Vec<TestCase> {
        self.fixtures
            .into_iter()
            .flat_map(|group| group.tests)
            .collect()
    }
}
