//! The queue scheduler: pick one candidate, re-validate, act.
//!
//! Cache writes race with host-side state changes and with event delivery, so
//! the cached classification is never trusted on its own. Each pass pops the
//! highest-priority candidate, forces a re-hydration from live state, and
//! only acts when the fresh classification confirms the cached one. Drift
//! requeues the candidate and re-sorts the whole queue; a closed candidate is
//! pruned. At most one candidate is acted upon per pass.

use tracing::{debug, info, warn};

use crate::cache::{CacheError, QueueKey, SnapshotCache};
use crate::host::HostClient;
use crate::hydrate::{HydrationContext, Hydrator, SnapshotSeed};
use crate::policy::BranchPolicy;
use crate::types::PullNumber;

use super::actions::{self, ActionOutcome};
use super::builder;

/// Cap on re-validations within one pass.
///
/// Each drift requeues and rescans, so a pathologically oscillating branch
/// could otherwise keep a pass alive indefinitely. Hitting the cap ends the
/// pass with no action; the next event starts a fresh one.
pub(crate) const MAX_REVALIDATIONS: usize = 64;

/// Everything a scheduling pass needs.
pub struct PassContext<'a, C, H, F> {
    pub cache: &'a C,
    pub host: &'a H,
    pub hydrator: &'a F,
    pub policy: &'a BranchPolicy,
    pub collaborators: &'a [u64],
    pub write_token: Option<&'a str>,
}

/// Runs one scheduling pass for `key`.
///
/// Returns the candidate acted upon and the outcome, or `None` when the
/// queue emptied (or the re-validation cap was hit) without a stable
/// candidate.
pub async fn run_pass<C, H, F>(
    ctx: &PassContext<'_, C, H, F>,
    key: &QueueKey,
) -> Result<Option<(PullNumber, ActionOutcome)>, CacheError>
where
    C: SnapshotCache,
    H: HostClient,
    F: Hydrator,
{
    let mut queue = builder::build(ctx.cache, key).await?;
    if queue.is_empty() {
        info!(key = %key, "nothing queued, skipping queue processing");
        return Ok(None);
    }

    let mut revalidations = 0;
    while !queue.is_empty() {
        if revalidations >= MAX_REVALIDATIONS {
            warn!(
                key = %key,
                cap = MAX_REVALIDATIONS,
                "re-validation cap hit; ending pass without action"
            );
            return Ok(None);
        }
        revalidations += 1;

        let candidate = queue.remove(0);
        let expected = candidate.readiness;

        // The cache can be stale: the pull may have been merged manually, or
        // its state changed by an event not yet delivered. Re-hydrate from
        // live state before acting.
        let hydration = HydrationContext {
            policy: ctx.policy,
            collaborators: ctx.collaborators,
        };
        let fresh = match ctx
            .hydrator
            .hydrate(key, candidate.number, SnapshotSeed::empty(), hydration)
            .await
        {
            Ok(fresh) => fresh,
            Err(error) => {
                warn!(
                    pull = %candidate.number,
                    key = %key,
                    %error,
                    "re-validation failed; leaving candidate for a future event"
                );
                continue;
            }
        };

        if !fresh.state.is_open() {
            // Merged or closed in the meantime; prune, never act.
            debug!(pull = %fresh.number, key = %key, "candidate closed during re-validation, pruning");
            ctx.cache.remove(key, fresh.number).await?;
            continue;
        }

        if fresh.readiness != expected {
            // State drift invalidates the priority order: requeue and resort
            // before considering anyone else.
            debug!(
                pull = %fresh.number,
                key = %key,
                expected = ?expected,
                actual = ?fresh.readiness,
                "classification drifted, requeueing"
            );
            queue.push(fresh);
            builder::sort_snapshots(&mut queue);
            continue;
        }

        // Classification confirmed: persist the refreshed snapshot and act.
        info!(pull = %fresh.pretty(), key = %key, "candidate selected");
        ctx.cache.put(key, fresh.number, &fresh).await?;
        let number = fresh.number;
        let outcome = actions::execute(ctx.host, ctx.policy, ctx.write_token, &fresh).await;
        return Ok(Some((number, outcome)));
    }

    Ok(None)
}
