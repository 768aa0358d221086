//! Outbound status reports.
//!
//! The bot reports progress back to the host as commit statuses: a tri-state
//! classification plus a human-readable description under a named check. Two
//! check names exist: the default queue check, and a separate one used when
//! validating a prospective configuration change so the two verdicts never
//! overwrite each other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ComputedFields, MergeReadiness};

/// Check name used for regular queue status reports.
pub const DEFAULT_CHECK_NAME: &str = "merge-queue";

/// Check name used when validating a prospective configuration change on the
/// default branch.
pub const CONFIG_CHECK_NAME: &str = "merge-queue/config-checker";

/// Tri-state commit status classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Pending,
    Success,
    Failure,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckState::Pending => "pending",
            CheckState::Success => "success",
            CheckState::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// A status report to post on a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: CheckState,
    pub description: String,
    pub check_name: &'static str,
}

impl StatusReport {
    /// A report under the default queue check.
    pub fn queue(state: CheckState, description: impl Into<String>) -> Self {
        StatusReport {
            state,
            description: description.into(),
            check_name: DEFAULT_CHECK_NAME,
        }
    }

    /// A report under the configuration-validation check.
    pub fn config(state: CheckState, description: impl Into<String>) -> Self {
        StatusReport {
            state,
            description: description.into(),
            check_name: CONFIG_CHECK_NAME,
        }
    }
}

/// Builds the queue status report for a pull's current readiness.
///
/// Uses the hydrated status description when one was computed, otherwise a
/// generic per-readiness line.
pub fn readiness_report(readiness: MergeReadiness, computed: &ComputedFields) -> StatusReport {
    let (state, fallback) = match readiness {
        MergeReadiness::Ready => (CheckState::Success, "Will be merged soon"),
        MergeReadiness::NeedBranchUpdate => (CheckState::Pending, "Waiting for branch update"),
        MergeReadiness::Blocked => (CheckState::Failure, "Blocked by branch policy"),
        MergeReadiness::Unknown => (CheckState::Pending, "Evaluating merge requirements"),
    };
    let description = computed
        .status_description
        .clone()
        .unwrap_or_else(|| fallback.to_string());
    StatusReport::queue(state, description)
}
