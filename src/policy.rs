//! Branch merge-policy configuration.
//!
//! Parsing and validating the per-repository policy file is an external
//! collaborator's concern; the core consumes an already-structured
//! [`BranchPolicy`] through the [`PolicyLoader`] trait. Absent configuration
//! disables the queue for the branch (silently); invalid configuration is a
//! reportable error on opened/synchronize events.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Sha;

/// Relative path of the policy file in the repository.
pub const POLICY_FILE: &str = ".merge-queue.yml";

/// How the host should merge a ready pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    /// The string the host API expects for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

/// The merge policy for one branch, as produced by the external parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPolicy {
    /// How to merge ready pulls.
    pub merge_method: MergeMethod,

    /// Number of approving collaborator reviews required.
    pub required_approvals: u32,

    /// Whether a pull must be up to date with its base before merging.
    pub strict_update: bool,

    /// Labels that trigger backport pulls after a merge, e.g.
    /// `backport-to-stable`.
    #[serde(default)]
    pub automated_backport_labels: Vec<String>,

    /// Branch-protection settings to keep applied on the host, in the host's
    /// own representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<serde_json::Value>,
}

/// Errors from loading a branch policy.
///
/// A missing policy file is not an error: loaders return `Ok(None)` so the
/// dispatcher can stop processing the branch without reporting anything.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file exists but does not validate.
    #[error("invalid branch policy: {0}")]
    Invalid(String),

    /// The policy file could not be fetched from the host.
    #[error("failed to fetch branch policy: {0}")]
    Fetch(String),
}

/// Loads the merge policy for a branch.
///
/// `config_ref` selects the revision to read the policy file from; `None`
/// means the branch tip. The dispatcher passes a pull's head SHA here to
/// validate a prospective configuration change before it lands.
pub trait PolicyLoader: Send + Sync {
    fn load(
        &self,
        branch: &str,
        config_ref: Option<&Sha>,
    ) -> impl Future<Output = Result<Option<BranchPolicy>, PolicyError>> + Send;
}
