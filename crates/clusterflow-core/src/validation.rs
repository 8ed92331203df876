//! Cluster validation reports
//!
//! The cluster manager reports validation failures by name. Some failures
//! are expected while the cluster comes up and never clear on their own
//! before the final kubeconfig exists, so convergence is computed rather than
//! read: the cluster has converged when every reported failure is expected.

use serde::{Deserialize, Serialize};

/// Failures whose name starts with this prefix are expected.
pub const EXPECTED_FAILURE_PREFIX: &str = "kube-system/aws-iam-authenticator";

/// One entry of the report's `failures` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parsed output of the cluster manager's validation check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default)]
    pub failures: Option<Vec<ValidationFailure>>,
}

impl ValidationReport {
    /// Parse a report. Anything that is not a JSON report object (empty
    /// output, `null`, garbage) yields `None`, meaning "not ready yet".
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Option<Self>>(bytes).ok().flatten()
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        self.failures.as_deref().unwrap_or_default()
    }

    pub fn unexpected_failures<'a>(
        &'a self,
        expected: &'a ExpectedFailures,
    ) -> impl Iterator<Item = &'a ValidationFailure> + 'a {
        self.failures()
            .iter()
            .filter(move |f| !expected.is_expected(f))
    }

    /// True when every reported failure is expected.
    pub fn is_converged(&self, expected: &ExpectedFailures) -> bool {
        self.unexpected_failures(expected).next().is_none()
    }
}

/// Allow-list of failure-name prefixes that do not block convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFailures {
    prefixes: Vec<String>,
}

impl ExpectedFailures {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_expected(&self, failure: &ValidationFailure) -> bool {
        self.prefixes.iter().any(|p| failure.name.starts_with(p))
    }
}

impl Default for ExpectedFailures {
    fn default() -> Self {
        Self::new([EXPECTED_FAILURE_PREFIX])
    }
}
