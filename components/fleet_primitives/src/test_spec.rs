use serde::{Deserialize, Serialize};

/// One acceptance test to run against a host. The tester name selects a
/// plugin; the arguments are opaque to the orchestrator and passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub tester: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl TestSpec {
    pub fn new(tester: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tester: tester.into(),
            args,
        }
    }
}
