//! The merge state machine.
//!
//! Classifies a validated candidate into exactly one action and executes it.
//! The matching is exhaustive: anything that isn't ready or behind its base
//! waits explicitly for a future event, never by falling through.
//!
//! Failures follow the queue's error policy: a failed merge is logged and the
//! candidate stays cached for the next event; unmet branch-update
//! preconditions are reported as failing statuses with a distinct reason
//! each; nothing retries inline.

use tracing::{info, warn};

use crate::host::HostClient;
use crate::policy::BranchPolicy;
use crate::status::{CheckState, StatusReport};
use crate::types::{MergeReadiness, PullSnapshot};

/// The action the state machine selected for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    /// All policy conditions satisfied: attempt the merge.
    Merge,

    /// Behind its base and otherwise eligible: attempt a branch update.
    UpdateBranch,

    /// Explicit no-op; a future event will re-enter the queue.
    Wait,
}

/// Maps a readiness classification to its action.
pub fn classify(readiness: MergeReadiness) -> QueueAction {
    match readiness {
        MergeReadiness::Ready => QueueAction::Merge,
        MergeReadiness::NeedBranchUpdate => QueueAction::UpdateBranch,
        MergeReadiness::Blocked | MergeReadiness::Unknown => QueueAction::Wait,
    }
}

/// What executing the selected action amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Merge requested; the eventual closed event drives further progress.
    MergeRequested,

    /// Merge failed; the candidate stays queued for the next event.
    MergeFailed,

    /// Branch update requested; the resulting push raises a synchronize
    /// event that re-enters the dispatcher.
    BranchUpdateRequested,

    /// Branch update failed; manual intervention required.
    BranchUpdateFailed,

    /// No write-capable credential configured for this installation.
    MissingWriteCredential,

    /// The pull's head branch does not allow upstream modification.
    HeadNotModifiable,

    /// Nothing to do for this candidate.
    Waited,
}

/// Executes the state machine for one validated candidate.
pub async fn execute<H: HostClient>(
    host: &H,
    policy: &BranchPolicy,
    write_token: Option<&str>,
    pull: &PullSnapshot,
) -> ActionOutcome {
    match classify(pull.readiness) {
        QueueAction::Merge => merge(host, policy, pull).await,
        QueueAction::UpdateBranch => update_branch(host, write_token, pull).await,
        QueueAction::Wait => {
            info!(pull = %pull.pretty(), "nothing to do");
            ActionOutcome::Waited
        }
    }
}

async fn merge<H: HostClient>(
    host: &H,
    policy: &BranchPolicy,
    pull: &PullSnapshot,
) -> ActionOutcome {
    match host.merge_pull(pull.number, policy.merge_method).await {
        Ok(()) => {
            info!(pull = %pull.pretty(), "merged; waiting for the closed event");
            report(host, pull, CheckState::Success, "Merged").await;
            ActionOutcome::MergeRequested
        }
        Err(error) => {
            warn!(pull = %pull.pretty(), %error, "merge failed; will reconsider on the next event");
            ActionOutcome::MergeFailed
        }
    }
}

async fn update_branch<H: HostClient>(
    host: &H,
    write_token: Option<&str>,
    pull: &PullSnapshot,
) -> ActionOutcome {
    // Preconditions in order; each unmet one is a hard stop with its own
    // reported reason.
    let Some(token) = write_token else {
        info!(pull = %pull.pretty(), "branch not updatable, write credential missing");
        report(
            host,
            pull,
            CheckState::Failure,
            "No write-capable credential configured for branch updates",
        )
        .await;
        return ActionOutcome::MissingWriteCredential;
    };

    if !pull.head_modifiable {
        info!(pull = %pull.pretty(), "branch not updatable, head not modifiable");
        report(
            host,
            pull,
            CheckState::Failure,
            "The pull request author does not allow modifications to the head branch",
        )
        .await;
        return ActionOutcome::HeadNotModifiable;
    }

    match host.update_branch(pull.number, token).await {
        Ok(()) => {
            // The push raises a synchronize event; no synchronous retry.
            info!(pull = %pull.pretty(), "branch update requested");
            ActionOutcome::BranchUpdateRequested
        }
        Err(error) => {
            warn!(pull = %pull.pretty(), %error, "branch not updatable, manual intervention required");
            ActionOutcome::BranchUpdateFailed
        }
    }
}

async fn report<H: HostClient>(
    host: &H,
    pull: &PullSnapshot,
    state: CheckState,
    description: &str,
) {
    let status = StatusReport::queue(state, description);
    if let Err(error) = host.post_check(&pull.head_sha, &status).await {
        warn!(pull = %pull.pretty(), %error, "failed to report status");
    }
}
