//! The event dispatcher: one inbound event in, cache updated, queue driven.
//!
//! Processing order for every event:
//!
//! 1. Resolve the event to a pull (directly, or via the cache / a host-side
//!    commit search for status events). Unresolvable events are dropped.
//! 2. Pre-validate policy-file changes targeting the default branch under a
//!    dedicated check, so a broken configuration is flagged before it lands.
//! 3. Load the branch policy. No policy disables the queue for the branch.
//! 4. Converge branch protection with the policy (read first, write only on
//!    drift).
//! 5. Closed pulls: prune the cache, free the merge slot (one scheduling
//!    pass), report the final verdict, open backports, clean up bot branches.
//! 6. Open pulls: re-hydrate with the event-appropriate seed, cache the
//!    snapshot, report readiness, and run one scheduling pass.
//!
//! Host and policy failures are soft: they are logged and the event's pull is
//! left for a future event. Only cache failures propagate.

pub mod events;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, QueueKey, SnapshotCache};
use crate::host::{HostClient, HostError};
use crate::hydrate::{HydrationContext, Hydrator, SnapshotSeed};
use crate::policy::{BranchPolicy, POLICY_FILE, PolicyError, PolicyLoader};
use crate::queue::scheduler::{self, PassContext};
use crate::status::{self, CheckState, StatusReport};
use crate::types::{InstallationId, PullSnapshot, Sha};

use events::{Event, EventKind, PullAction, PullRef};

/// Prefix of head branches this bot creates for backport pulls. Branches
/// under it are deleted once their pull closes.
pub const BOT_BRANCH_PREFIX: &str = "merge-queue/bp/";

/// The repository a dispatcher instance serves.
#[derive(Debug, Clone)]
pub struct RepoContext {
    pub installation: InstallationId,
    pub owner: String,
    pub repo: String,
    pub private: bool,
    pub default_branch: String,
}

impl RepoContext {
    /// The queue key for one of this repository's branches.
    pub fn queue_key(&self, branch: &str) -> QueueKey {
        QueueKey::new(
            self.installation,
            &self.owner,
            &self.repo,
            self.private,
            branch,
        )
    }
}

/// Opens backport pulls for a merged pull, one per configured label.
pub trait BackportTrigger: Send + Sync {
    fn trigger(
        &self,
        pull: &PullRef,
        labels: &[String],
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;
}

/// Errors that abort event processing.
///
/// Deliberately narrow: host and policy failures are absorbed by the
/// soft-failure policy, so only the cache can fail a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Processes inbound events for one repository.
pub struct EventDispatcher<C, H, F, P, B> {
    cache: C,
    host: H,
    hydrator: F,
    policies: P,
    backports: B,
    repo: RepoContext,
    /// Write-capable credential for branch updates, if one is configured.
    write_token: Option<String>,
}

impl<C, H, F, P, B> EventDispatcher<C, H, F, P, B>
where
    C: SnapshotCache,
    H: HostClient,
    F: Hydrator,
    P: PolicyLoader,
    B: BackportTrigger,
{
    pub fn new(
        cache: C,
        host: H,
        hydrator: F,
        policies: P,
        backports: B,
        repo: RepoContext,
        write_token: Option<String>,
    ) -> Self {
        EventDispatcher {
            cache,
            host,
            hydrator,
            policies,
            backports,
            repo,
            write_token,
        }
    }

    /// Processes one event to completion.
    pub async fn handle(&self, event: Event) -> Result<(), DispatchError> {
        info!(kind = %event.kind(), event = %event.describe(), "processing event");

        let Some(pull) = self.resolve(&event).await? else {
            debug!(kind = %event.kind(), "event does not resolve to a pull, dropped");
            return Ok(());
        };

        if let Event::Status(e) = &event {
            // A status for anything but the current head is about a commit
            // the queue no longer cares about.
            if pull.head_sha != e.sha {
                debug!(
                    pull = %pull.number,
                    sha = %e.sha.short(),
                    head = %pull.head_sha.short(),
                    "status for a superseded commit, dropped"
                );
                return Ok(());
            }
            if pull.merged {
                debug!(pull = %pull.number, "status for a merged pull, dropped");
                return Ok(());
            }
        }

        let key = self.repo.queue_key(&pull.base_ref);

        if let Event::PullRequest(e) = &event {
            if e.action.is_opened_or_synchronize() && pull.base_ref == self.repo.default_branch {
                self.check_config_change(&pull).await;
            }
        }

        let policy = match self.policies.load(&pull.base_ref, None).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                debug!(key = %key, "no merge policy for branch, queue disabled");
                return Ok(());
            }
            Err(PolicyError::Invalid(message)) => {
                warn!(key = %key, message, "branch policy is invalid");
                if let Event::PullRequest(e) = &event {
                    if e.action.is_opened_or_synchronize() {
                        let report = StatusReport::queue(
                            CheckState::Failure,
                            format!("The current configuration is invalid: {message}"),
                        );
                        self.post(&pull.head_sha, report).await;
                    }
                }
                return Ok(());
            }
            Err(error) => {
                warn!(key = %key, %error, "failed to load branch policy");
                return Ok(());
            }
        };

        if let Err(error) = self.sync_branch_protection(&pull.base_ref, &policy).await {
            if error.is_not_found() {
                debug!(key = %key, "base branch vanished while syncing protection, dropped");
            } else {
                warn!(key = %key, %error, "failed to sync branch protection");
            }
            return Ok(());
        }

        let collaborators = match self.host.list_collaborator_ids().await {
            Ok(ids) => ids,
            Err(error) => {
                warn!(key = %key, %error, "failed to list collaborators, event dropped");
                return Ok(());
            }
        };

        if !pull.state.is_open() {
            return self
                .handle_closed(&event, &key, &policy, &collaborators, &pull)
                .await;
        }

        let fresh = match self.refresh_snapshot(&event, &key, &policy, &collaborators, &pull).await? {
            Some(fresh) => fresh,
            None => return Ok(()),
        };

        // Reviews by non-collaborators refresh the cache but drive nothing.
        if let Event::Review(e) = &event {
            if !collaborators.contains(&e.author_id) {
                debug!(
                    pull = %pull.number,
                    author = e.author_id,
                    "review from non-collaborator, not acted on"
                );
                return Ok(());
            }
        }

        if matches!(
            event.kind(),
            EventKind::PullRequest | EventKind::Review | EventKind::Refresh
        ) {
            let report = status::readiness_report(fresh.readiness, &fresh.computed);
            self.post(&fresh.head_sha, report).await;
        }

        self.run_scheduler(&key, &policy, &collaborators).await
    }

    /// Resolves an event to the pull it concerns.
    ///
    /// Status events carry only a commit SHA: the cache is scanned first,
    /// then the host is searched in case the cache lost the entry.
    async fn resolve(&self, event: &Event) -> Result<Option<PullRef>, DispatchError> {
        if let Some(pull) = event.pull_ref() {
            return Ok(Some(pull.clone()));
        }
        let Event::Status(e) = event else {
            return Ok(None);
        };

        let namespace = self.repo.queue_key(&self.repo.default_branch);
        if let Some(snap) = self.cache.find_by_head_sha(&namespace, &e.sha).await? {
            return Ok(Some(PullRef {
                number: snap.number,
                base_ref: snap.base_ref,
                head_ref: snap.head_ref,
                head_sha: snap.head_sha,
                state: snap.state,
                merged: snap.merged,
            }));
        }

        let number = match self.host.search_pull_by_sha(&e.sha).await {
            Ok(number) => number,
            Err(error) => {
                warn!(sha = %e.sha.short(), %error, "commit search failed, status dropped");
                return Ok(None);
            }
        };
        let Some(number) = number else {
            debug!(sha = %e.sha.short(), "status matches no open pull, dropped");
            return Ok(None);
        };
        match self.host.get_pull(number).await {
            Ok(facts) => Ok(Some(PullRef {
                number: facts.number,
                base_ref: facts.base_ref,
                head_ref: facts.head_ref,
                head_sha: facts.head_sha,
                state: facts.state,
                merged: facts.merged,
            })),
            Err(error) => {
                warn!(pull = %number, %error, "failed to fetch pull for status event");
                Ok(None)
            }
        }
    }

    /// Converges the host's branch protection with the policy.
    ///
    /// Reads the current protection first and only writes on drift, so the
    /// common case (already converged) costs one GET per event instead of a
    /// PUT.
    async fn sync_branch_protection(
        &self,
        branch: &str,
        policy: &BranchPolicy,
    ) -> Result<(), HostError> {
        let current = self.host.fetch_branch_protection(branch).await?;
        if current == policy.protection {
            debug!(branch, "branch protection already converged");
            return Ok(());
        }
        self.host.apply_branch_protection(branch, policy).await
    }

    /// Validates a prospective policy-file change under its own check.
    ///
    /// Only called for opened/synchronize events targeting the default
    /// branch; posts nothing when the pull doesn't touch the policy file.
    async fn check_config_change(&self, pull: &PullRef) {
        let files = match self.host.changed_files(pull.number).await {
            Ok(files) => files,
            Err(error) => {
                warn!(pull = %pull.number, %error, "failed to list changed files");
                return;
            }
        };
        if !files.iter().any(|f| f == POLICY_FILE) {
            return;
        }

        let report = match self.policies.load(&pull.base_ref, Some(&pull.head_sha)).await {
            Ok(Some(_)) => StatusReport::config(CheckState::Success, "The new configuration is valid"),
            Ok(None) => {
                StatusReport::config(CheckState::Failure, "The configuration file is missing")
            }
            Err(error) => StatusReport::config(CheckState::Failure, error.to_string()),
        };
        info!(
            pull = %pull.number,
            verdict = %report.state,
            "validated prospective configuration change"
        );
        self.post(&pull.head_sha, report).await;
    }

    /// Prunes a closed pull and, for closing events, performs the wrap-up
    /// work: free the merge slot, report the final verdict, open backports,
    /// delete the bot's own head branch.
    async fn handle_closed(
        &self,
        event: &Event,
        key: &QueueKey,
        policy: &BranchPolicy,
        collaborators: &[u64],
        pull: &PullRef,
    ) -> Result<(), DispatchError> {
        self.cache.remove(key, pull.number).await?;

        let Event::PullRequest(e) = event else {
            debug!(pull = %pull.number, key = %key, "event for a closed pull, cache pruned");
            return Ok(());
        };
        if e.action != PullAction::Closed {
            return Ok(());
        }

        // The closed pull freed a merge slot; let the queue use it first.
        self.run_scheduler(key, policy, collaborators).await?;

        let report = if pull.merged {
            StatusReport::queue(CheckState::Success, "Merged")
        } else {
            StatusReport::queue(CheckState::Success, "Pull request closed unmerged")
        };
        self.post(&pull.head_sha, report).await;

        if pull.merged && !policy.automated_backport_labels.is_empty() {
            if let Err(error) = self
                .backports
                .trigger(pull, &policy.automated_backport_labels)
                .await
            {
                warn!(pull = %pull.number, %error, "failed to open backport pulls");
            }
        }

        if pull.head_ref.starts_with(BOT_BRANCH_PREFIX) {
            let refname = format!("heads/{}", pull.head_ref);
            match self.host.get_ref(&refname).await {
                Ok(Some(_)) => match self.host.delete_ref(&refname).await {
                    Ok(()) => info!(pull = %pull.number, refname, "deleted bot branch"),
                    // Deleted concurrently between the lookup and here.
                    Err(error) if error.is_not_found() => {}
                    Err(error) => {
                        warn!(pull = %pull.number, refname, %error, "failed to delete bot branch");
                    }
                },
                Ok(None) => debug!(pull = %pull.number, refname, "bot branch already gone"),
                Err(error) => {
                    warn!(pull = %pull.number, refname, %error, "failed to look up bot branch");
                }
            }
        }

        Ok(())
    }

    /// Re-hydrates a pull after an event and caches the result.
    ///
    /// Returns `None` when hydration failed; a vanished pull is pruned, any
    /// other failure leaves the cached snapshot as-is for a future event.
    async fn refresh_snapshot(
        &self,
        event: &Event,
        key: &QueueKey,
        policy: &BranchPolicy,
        collaborators: &[u64],
        pull: &PullRef,
    ) -> Result<Option<PullSnapshot>, DispatchError> {
        let cached = match self.cache.get_one(key, pull.number).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(error) => {
                    warn!(pull = %pull.number, key = %key, %error, "undecodable cached snapshot, recomputing");
                    None
                }
            },
            None => None,
        };

        let seed = SnapshotSeed::for_event(cached, event);
        let ctx = HydrationContext {
            policy,
            collaborators,
        };
        let fresh = match self.hydrator.hydrate(key, pull.number, seed, ctx).await {
            Ok(fresh) => fresh,
            Err(error) if error.is_not_found() => {
                debug!(pull = %pull.number, key = %key, "pull vanished during hydration, pruning");
                self.cache.remove(key, pull.number).await?;
                return Ok(None);
            }
            Err(error) => {
                warn!(pull = %pull.number, key = %key, %error, "hydration failed, pull left for a future event");
                return Ok(None);
            }
        };

        self.cache.put(key, fresh.number, &fresh).await?;
        Ok(Some(fresh))
    }

    async fn run_scheduler(
        &self,
        key: &QueueKey,
        policy: &BranchPolicy,
        collaborators: &[u64],
    ) -> Result<(), DispatchError> {
        let ctx = PassContext {
            cache: &self.cache,
            host: &self.host,
            hydrator: &self.hydrator,
            policy,
            collaborators,
            write_token: self.write_token.as_deref(),
        };
        match scheduler::run_pass(&ctx, key).await? {
            Some((number, outcome)) => {
                info!(key = %key, pull = %number, outcome = ?outcome, "scheduling pass acted");
            }
            None => debug!(key = %key, "scheduling pass ended without action"),
        }
        Ok(())
    }

    async fn post(&self, head_sha: &Sha, report: StatusReport) {
        if let Err(error) = self.host.post_check(head_sha, &report).await {
            warn!(sha = %head_sha.short(), %error, "failed to report status");
        }
    }
}

#[cfg(test)]
impl<C, H, F, P, B> EventDispatcher<C, H, F, P, B> {
    pub(crate) fn cache(&self) -> &C {
        &self.cache
    }

    pub(crate) fn host(&self) -> &H {
        &self.host
    }
}
