//! Hydration: computing a pull's full snapshot from live host data.
//!
//! The computation itself ("fullification": readiness from branch policy,
//! approvals, and CI signals) is an external collaborator behind the
//! [`Hydrator`] trait. The core's contribution is the [`SnapshotSeed`]: the
//! part of the cached snapshot a hydrator may reuse, with the fields the
//! triggering event invalidated already dropped so they are recomputed from
//! live state.

use std::future::Future;

use crate::cache::QueueKey;
use crate::dispatch::events::{Event, PullAction};
use crate::host::HostError;
use crate::policy::BranchPolicy;
use crate::types::{PullNumber, PullSnapshot};

/// What a hydrator may take from the cache instead of recomputing.
///
/// An empty seed forces a full cache bypass (used by refresh events and by
/// the scheduler's pre-action re-validation).
#[derive(Debug, Clone, Default)]
pub struct SnapshotSeed {
    pub cached: Option<PullSnapshot>,
}

impl SnapshotSeed {
    /// A seed reusing nothing: everything is recomputed from live state.
    pub fn empty() -> Self {
        SnapshotSeed { cached: None }
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_none()
    }

    /// Builds the seed for re-hydration after `event`, dropping exactly the
    /// computed fields the event's nature invalidates:
    ///
    /// - `refresh`: everything (full cache bypass)
    /// - `status` and `pull_request synchronize`: the combined CI status
    /// - `pull_request_review`: the approvals
    /// - always: the status description (it summarizes the others)
    pub fn for_event(cached: Option<PullSnapshot>, event: &Event) -> Self {
        if matches!(event, Event::Refresh(_)) {
            return SnapshotSeed::empty();
        }

        let Some(mut snapshot) = cached else {
            return SnapshotSeed::empty();
        };

        snapshot.computed.status_description = None;
        match event {
            Event::Status(_) => snapshot.computed.combined_status = None,
            Event::Review(_) => snapshot.computed.approvals = None,
            Event::PullRequest(e) if e.action == PullAction::Synchronize => {
                snapshot.computed.combined_status = None;
            }
            _ => {}
        }

        SnapshotSeed {
            cached: Some(snapshot),
        }
    }
}

/// Context a hydrator needs besides the pull itself.
#[derive(Debug, Clone, Copy)]
pub struct HydrationContext<'a> {
    /// The branch's merge policy (drives approval counting and readiness).
    pub policy: &'a BranchPolicy,

    /// User IDs of repository collaborators (only their reviews count).
    pub collaborators: &'a [u64],
}

/// Computes a pull's full snapshot from live host data.
///
/// Implementations fetch whatever the seed doesn't carry and classify the
/// pull's [`MergeReadiness`](crate::types::MergeReadiness), setting
/// `sort_rank` consistently with it.
pub trait Hydrator: Send + Sync {
    fn hydrate(
        &self,
        key: &QueueKey,
        number: PullNumber,
        seed: SnapshotSeed,
        ctx: HydrationContext<'_>,
    ) -> impl Future<Output = Result<PullSnapshot, HostError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::events::{
        Event, PullRequestEvent, RefreshEvent, ReviewEvent, StatusEvent,
    };
    use crate::test_utils::{pull_ref, snapshot};
    use crate::types::{CiState, MergeReadiness, Sha};

    fn cached() -> PullSnapshot {
        let mut snap = snapshot(1, MergeReadiness::Ready, "2024-05-01T10:00:00Z");
        snap.computed.status_description = Some("all green".to_string());
        snap.computed.combined_status = Some(CiState::Success);
        snap.computed.approvals = Some(vec![7, 8]);
        snap
    }

    #[test]
    fn refresh_forces_full_bypass() {
        let event = Event::Refresh(RefreshEvent { pull: pull_ref(1) });
        let seed = SnapshotSeed::for_event(Some(cached()), &event);
        assert!(seed.is_empty());
    }

    #[test]
    fn status_event_drops_combined_status_only() {
        let event = Event::Status(StatusEvent {
            sha: Sha::new("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            state: CiState::Success,
        });
        let seed = SnapshotSeed::for_event(Some(cached()), &event);
        let kept = seed.cached.unwrap();
        assert!(kept.computed.combined_status.is_none());
        assert!(kept.computed.status_description.is_none());
        assert_eq!(kept.computed.approvals, Some(vec![7, 8]));
    }

    #[test]
    fn review_event_drops_approvals_only() {
        let event = Event::Review(ReviewEvent {
            action: "submitted".to_string(),
            review_state: "approved".to_string(),
            author_id: 7,
            pull: pull_ref(1),
        });
        let seed = SnapshotSeed::for_event(Some(cached()), &event);
        let kept = seed.cached.unwrap();
        assert!(kept.computed.approvals.is_none());
        assert_eq!(kept.computed.combined_status, Some(CiState::Success));
    }

    #[test]
    fn synchronize_drops_combined_status() {
        let event = Event::PullRequest(PullRequestEvent {
            action: PullAction::Synchronize,
            pull: pull_ref(1),
        });
        let seed = SnapshotSeed::for_event(Some(cached()), &event);
        assert!(seed.cached.unwrap().computed.combined_status.is_none());
    }

    #[test]
    fn opened_keeps_computed_fields_other_than_description() {
        let event = Event::PullRequest(PullRequestEvent {
            action: PullAction::Opened,
            pull: pull_ref(1),
        });
        let seed = SnapshotSeed::for_event(Some(cached()), &event);
        let kept = seed.cached.unwrap();
        assert_eq!(kept.computed.combined_status, Some(CiState::Success));
        assert_eq!(kept.computed.approvals, Some(vec![7, 8]));
    }

    #[test]
    fn no_cache_means_empty_seed() {
        let event = Event::PullRequest(PullRequestEvent {
            action: PullAction::Opened,
            pull: pull_ref(1),
        });
        assert!(SnapshotSeed::for_event(None, &event).is_empty());
    }
}
