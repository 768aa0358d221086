//! Inbound event types.
//!
//! Typed representations of the webhook-style events the dispatcher consumes:
//! pull-request lifecycle events, review submissions, review comments, commit
//! statuses, and the operator-triggered `refresh` event (which has no
//! host-originated semantics).
//!
//! Payload resolution is shallow by design: events carry the pull reference
//! fields needed for routing and staleness filtering; everything else is
//! recomputed at hydration time.

use serde::{Deserialize, Serialize};

use crate::types::{CiState, PullNumber, PullState, Sha};

/// The pull reference carried by events that name a pull directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRef {
    pub number: PullNumber,
    pub base_ref: String,
    pub head_ref: String,
    pub head_sha: Sha,
    pub state: PullState,
    pub merged: bool,
}

impl PullRef {
    /// Extracts a pull reference from a webhook `pull_request` object.
    pub fn from_json(pull: &serde_json::Value) -> Option<Self> {
        Some(PullRef {
            number: PullNumber(pull.get("number")?.as_u64()?),
            base_ref: pull.pointer("/base/ref")?.as_str()?.to_string(),
            head_ref: pull.pointer("/head/ref")?.as_str()?.to_string(),
            head_sha: Sha::new(pull.pointer("/head/sha")?.as_str()?),
            state: match pull.get("state")?.as_str()? {
                "open" => PullState::Open,
                _ => PullState::Closed,
            },
            merged: pull
                .get("merged")
                .and_then(|m| m.as_bool())
                .unwrap_or(false),
        })
    }
}

/// Action on a pull-request lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullAction {
    Opened,
    Reopened,
    Synchronize,
    Closed,
    Edited,
    Labeled,
    Unlabeled,
    ReadyForReview,
    /// Any action this version doesn't model; still triggers re-evaluation.
    #[serde(other)]
    Other,
}

impl PullAction {
    /// Actions that introduce a new head commit worth validating the policy
    /// file against.
    pub fn is_opened_or_synchronize(&self) -> bool {
        matches!(self, PullAction::Opened | PullAction::Synchronize)
    }
}

/// A pull-request lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullAction,
    pub pull: PullRef,
}

/// A review submission event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEvent {
    /// Raw action string (`submitted`, `edited`, `dismissed`).
    pub action: String,

    /// Review verdict as reported by the host (`approved`, `changes_requested`, ...).
    pub review_state: String,

    /// User ID of the review author; reviews from non-collaborators are
    /// cached but otherwise ignored.
    pub author_id: u64,

    pub pull: PullRef,
}

/// A review-comment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommentEvent {
    pub action: String,
    pub pull: PullRef,
}

/// A commit-status event. Carries only a SHA; the dispatcher resolves the
/// pull via the cache and falls back to a host-side search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub sha: Sha,
    pub state: CiState,
}

/// An operator-triggered re-evaluation with no host-originated semantics.
/// Forces a full cache bypass on hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEvent {
    pub pull: PullRef,
}

/// Discriminant for an [`Event`], used for cache-invalidation decisions and
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PullRequest,
    Review,
    ReviewComment,
    Status,
    Refresh,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::PullRequest => "pull_request",
            EventKind::Review => "pull_request_review",
            EventKind::ReviewComment => "pull_request_review_comment",
            EventKind::Status => "status",
            EventKind::Refresh => "refresh",
        };
        write!(f, "{}", s)
    }
}

/// A normalized inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PullRequest(PullRequestEvent),
    Review(ReviewEvent),
    ReviewComment(ReviewCommentEvent),
    Status(StatusEvent),
    Refresh(RefreshEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PullRequest(_) => EventKind::PullRequest,
            Event::Review(_) => EventKind::Review,
            Event::ReviewComment(_) => EventKind::ReviewComment,
            Event::Status(_) => EventKind::Status,
            Event::Refresh(_) => EventKind::Refresh,
        }
    }

    /// The pull reference carried by the event, if it names one directly.
    /// Status events don't; they are resolved via the cache or a host search.
    pub fn pull_ref(&self) -> Option<&PullRef> {
        match self {
            Event::PullRequest(e) => Some(&e.pull),
            Event::Review(e) => Some(&e.pull),
            Event::ReviewComment(e) => Some(&e.pull),
            Event::Status(_) => None,
            Event::Refresh(e) => Some(&e.pull),
        }
    }

    /// Parses a webhook delivery into an event.
    ///
    /// Returns `None` for event types the queue doesn't consume and for
    /// payloads missing required fields (both are dropped upstream, not
    /// errors).
    pub fn from_payload(event_type: &str, payload: &serde_json::Value) -> Option<Event> {
        match event_type {
            "pull_request" => {
                let action: PullAction =
                    serde_json::from_value(payload.get("action")?.clone()).ok()?;
                let pull = PullRef::from_json(payload.get("pull_request")?)?;
                Some(Event::PullRequest(PullRequestEvent { action, pull }))
            }
            "pull_request_review" => {
                let pull = PullRef::from_json(payload.get("pull_request")?)?;
                Some(Event::Review(ReviewEvent {
                    action: payload.get("action")?.as_str()?.to_string(),
                    review_state: payload
                        .pointer("/review/state")?
                        .as_str()?
                        .to_string(),
                    author_id: payload.pointer("/review/user/id")?.as_u64()?,
                    pull,
                }))
            }
            "pull_request_review_comment" => {
                let pull = PullRef::from_json(payload.get("pull_request")?)?;
                Some(Event::ReviewComment(ReviewCommentEvent {
                    action: payload.get("action")?.as_str()?.to_string(),
                    pull,
                }))
            }
            "status" => {
                let state = match payload.get("state")?.as_str()? {
                    "pending" => CiState::Pending,
                    "success" => CiState::Success,
                    "failure" => CiState::Failure,
                    "error" => CiState::Error,
                    _ => return None,
                };
                Some(Event::Status(StatusEvent {
                    sha: Sha::new(payload.get("sha")?.as_str()?),
                    state,
                }))
            }
            "refresh" => {
                let pull = PullRef::from_json(payload.get("pull_request")?)?;
                Some(Event::Refresh(RefreshEvent { pull }))
            }
            _ => None,
        }
    }

    /// One-line description for the per-event log entry.
    pub fn describe(&self) -> String {
        match self {
            Event::PullRequest(e) => format!("{} action={:?}", e.pull.number, e.action),
            Event::Review(e) => format!(
                "{} action={} review-state={}",
                e.pull.number, e.action, e.review_state
            ),
            Event::ReviewComment(e) => format!("{} action={}", e.pull.number, e.action),
            Event::Status(e) => format!("sha={} ci-state={:?}", e.sha.short(), e.state),
            Event::Refresh(e) => format!("{}", e.pull.number),
        }
    }
}
