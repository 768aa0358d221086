//! The VCS-host collaborator surface.
//!
//! Everything the core needs from the hosting platform is behind the
//! [`HostClient`] trait: fetching pulls, searching by commit SHA, listing
//! collaborators, managing refs and branch protection, merging, updating
//! branches, and posting commit statuses. The trait keeps the core testable
//! with mocks; [`github::GithubHost`] is the octocrab-backed implementation.

pub mod error;
pub mod github;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::policy::{BranchPolicy, MergeMethod};
use crate::status::StatusReport;
use crate::types::{PullNumber, PullState, Sha};

pub use error::{HostError, HostErrorKind};
pub use github::GithubHost;

/// Live facts about a pull request, as returned by the host.
///
/// This is the raw material for hydration; it carries no computed readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullFacts {
    pub number: PullNumber,
    pub state: PullState,
    pub merged: bool,
    pub head_sha: Sha,
    pub head_ref: String,
    pub base_sha: Sha,
    pub base_ref: String,
    /// Whether the head branch allows modification by maintainers.
    pub head_modifiable: bool,
    pub updated_at: DateTime<Utc>,
}

/// Operations the core performs against the hosting platform.
///
/// Implementations are scoped to one repository. Every call blocks the
/// calling unit of work; timeout/retry policy is the implementation's
/// concern, not the scheduler's.
pub trait HostClient: Send + Sync {
    /// Fetches a pull by number.
    fn get_pull(&self, number: PullNumber)
    -> impl Future<Output = Result<PullFacts, HostError>> + Send;

    /// Searches open pulls for one whose head commit is `sha`.
    fn search_pull_by_sha(
        &self,
        sha: &Sha,
    ) -> impl Future<Output = Result<Option<PullNumber>, HostError>> + Send;

    /// Lists user IDs of repository collaborators.
    fn list_collaborator_ids(&self) -> impl Future<Output = Result<Vec<u64>, HostError>> + Send;

    /// Lists the paths touched by a pull.
    fn changed_files(
        &self,
        number: PullNumber,
    ) -> impl Future<Output = Result<Vec<String>, HostError>> + Send;

    /// Fetches a git ref, e.g. `heads/feature`. `Ok(None)` if it doesn't exist.
    fn get_ref(
        &self,
        refname: &str,
    ) -> impl Future<Output = Result<Option<Sha>, HostError>> + Send;

    /// Deletes a git ref. Fails with a not-found error if already gone.
    fn delete_ref(&self, refname: &str) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Fetches the current branch-protection state. `Ok(None)` when the
    /// branch has no protection configured.
    fn fetch_branch_protection(
        &self,
        branch: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, HostError>> + Send;

    /// Applies the policy's protection settings to the branch.
    fn apply_branch_protection(
        &self,
        branch: &str,
        policy: &BranchPolicy,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Merges a pull using the given method.
    fn merge_pull(
        &self,
        number: PullNumber,
        method: MergeMethod,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Updates a pull's head branch with its base (rebase/merge-base-update),
    /// using the write-capable credential configured for the installation.
    fn update_branch(
        &self,
        number: PullNumber,
        token: &str,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Posts a commit status on the pull's head commit.
    fn post_check(
        &self,
        head_sha: &Sha,
        report: &StatusReport,
    ) -> impl Future<Output = Result<(), HostError>> + Send;
}
