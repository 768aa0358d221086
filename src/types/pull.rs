//! Pull request snapshot types.
//!
//! A [`PullSnapshot`] is the cached, serialized representation of one pull
//! request on one branch's queue. It carries the identity fields needed to
//! correlate events (head SHA, refs), the readiness classification used for
//! ordering, and a bag of computed fields that can be selectively dropped and
//! recomputed when an event invalidates them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PullNumber, Sha};

/// The state of a pull request on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullState {
    /// The pull request is open.
    Open,

    /// The pull request is closed (merged or not; see [`PullSnapshot::merged`]).
    Closed,
}

impl PullState {
    /// Returns true if the pull request is open.
    pub fn is_open(&self) -> bool {
        matches!(self, PullState::Open)
    }
}

/// Readiness classification of a pull request, computed at hydration time
/// from branch policy, approvals, and CI signals.
///
/// This is a closed enumeration: the merge state machine matches on it
/// exhaustively, and anything that is neither `Ready` nor
/// `NeedBranchUpdate` results in an explicit wait, never a fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeReadiness {
    /// All policy conditions satisfied; the pull can be merged now.
    Ready,

    /// Behind its base branch but otherwise eligible; needs a branch update.
    NeedBranchUpdate,

    /// Some policy condition is unmet (missing approvals, failing checks).
    Blocked,

    /// Not enough information to classify yet.
    Unknown,
}

impl MergeReadiness {
    /// Numeric rank used for queue ordering: higher means closer to mergeable.
    ///
    /// The rank is also persisted on the snapshot (as `sort_rank`) so that
    /// ordering survives serialization even if the rank table changes between
    /// versions.
    pub fn sort_rank(&self) -> u8 {
        match self {
            MergeReadiness::Ready => 30,
            MergeReadiness::NeedBranchUpdate => 20,
            MergeReadiness::Blocked => 10,
            MergeReadiness::Unknown => 0,
        }
    }
}

/// A combined CI status as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CiState {
    /// Returns true for states that terminate a CI run (success, failure,
    /// error). Pending is the only non-ending state.
    ///
    /// The dispatcher does not currently gate status-event relevance on this;
    /// see DESIGN.md.
    pub fn is_ending(&self) -> bool {
        !matches!(self, CiState::Pending)
    }
}

/// Computed fields attached to a snapshot, recomputed at hydration time.
///
/// Each field is optional: `None` means "not yet computed", and the event
/// dispatcher drops individual fields to force their recomputation (e.g., a
/// status event drops `combined_status`). Unknown fields from newer writers
/// are preserved in `extra` for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComputedFields {
    /// Human-readable summary of the current readiness, reported back to the
    /// host as the check description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,

    /// Combined CI status across all checks on the head commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_status: Option<CiState>,

    /// User IDs of collaborators with a current approving review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvals: Option<Vec<u64>>,

    /// Namespaced fields this version doesn't know about.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The cached representation of one pull request on one branch's queue.
///
/// Invariant: within one branch's cache, `number` is unique. Presence in the
/// cache means "believed still relevant to this branch's queue"; the snapshot
/// is deleted when the pull transitions to closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSnapshot {
    /// The pull request number (primary identity for cache operations).
    pub number: PullNumber,

    /// The base branch the pull targets.
    pub base_ref: String,

    /// The name of the pull's head branch.
    pub head_ref: String,

    /// The current head commit SHA.
    pub head_sha: Sha,

    /// The base commit SHA the pull was computed against.
    pub base_sha: Sha,

    /// Open/closed state at hydration time.
    pub state: PullState,

    /// Whether the pull was merged (only meaningful once closed).
    pub merged: bool,

    /// Whether the head branch allows modification by maintainers.
    ///
    /// Gates the branch-update action: if the author disallows upstream
    /// pushes, we cannot rebase for them.
    #[serde(default)]
    pub head_modifiable: bool,

    /// Readiness classification computed at hydration time.
    pub readiness: MergeReadiness,

    /// Numeric rank derived from `readiness`, primary sort key.
    pub sort_rank: u8,

    /// Last update timestamp on the host, secondary sort key.
    pub updated_at: DateTime<Utc>,

    /// Computed fields that can be selectively invalidated.
    #[serde(default)]
    pub computed: ComputedFields,
}

impl PullSnapshot {
    /// Sort key for queue ordering: `(sort_rank desc, updated_at desc)`,
    /// ties broken by `number desc`.
    ///
    /// The tie-break makes the ordering fully deterministic: two snapshots on
    /// the same branch can never compare equal because numbers are unique
    /// within a branch.
    pub fn sort_key(&self) -> (u8, DateTime<Utc>, PullNumber) {
        (self.sort_rank, self.updated_at, self.number)
    }

    /// One-line identity for log messages, e.g. `#42 feature -> main (READY)`.
    pub fn pretty(&self) -> String {
        format!(
            "{} {} -> {} ({:?})",
            self.number, self.head_ref, self.base_ref, self.readiness
        )
    }
}
