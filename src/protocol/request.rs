use serde::{Deserialize, Serialize};

/// A solution module plus the pytest file to run against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub source_code: String,
    pub test_spec: String,
    /// Importable module name; the source is written to `<module_name>.py`
    pub module_name: String,
    pub test_file_name: String,
    /// Restrict the run to `TestLevel<n>` classes
    pub level_filter: Option<u32>,
}

impl ExecutionRequest {
    pub fn new(
        module_name: impl Into<String>,
        source_code: impl Into<String>,
        test_file_name: impl Into<String>,
        test_spec: impl Into<String>,
    ) -> Self {
        Self {
            source_code: source_code.into(),
            test_spec: test_spec.into(),
            module_name: module_name.into(),
            test_file_name: test_file_name.into(),
            level_filter: None,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level_filter = Some(level);
        self
    }
}

/// Outcome of a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Unqualified test name (last `::` segment of the node id)
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(
        rename = "error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<String>,
}

impl TestOutcome {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            duration: None,
            error_detail: None,
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            duration: None,
            error_detail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub outcomes: Vec<TestOutcome>,
    pub raw_output: String,
}

impl ExecutionResult {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_outcomes(&self.outcomes)
    }
}

/// Pass/total tally of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub passed: usize,
    pub total: usize,
    /// True only for a non-empty run with no failures
    pub all_passed: bool,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed).count();
        let total = outcomes.len();
        Self {
            passed,
            total,
            all_passed: total > 0 && passed == total,
        }
    }
}
