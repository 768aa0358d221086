//! The snapshot cache: an eventually-consistent index of each branch's queue.
//!
//! The cache is the source of *queue* truth (ordering), never of correctness
//! truth: before any side effect the scheduler re-validates against live host
//! state. All mutation is last-writer-wins per pull number; there is no
//! optimistic concurrency token.
//!
//! The backend is injected via the [`SnapshotCache`] trait so the core holds
//! no process-wide connection state. [`memory::InMemoryQueueCache`] is the
//! provided implementation; it keeps hash-map-per-key semantics and publishes
//! a change notification for every mutation, which is the contract any other
//! backend must honor.

pub mod key;
pub mod memory;

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;

use crate::types::{PullNumber, PullSnapshot, Sha};

pub use key::QueueKey;
pub use memory::InMemoryQueueCache;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A snapshot could not be serialized for storage.
    #[error("failed to encode snapshot for {number}: {source}")]
    Encode {
        number: PullNumber,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store failed.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A change notification emitted on every cache mutation.
///
/// The core itself never consumes these; they exist so external listeners
/// (dashboards, debugging tools) can react to queue changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNotification {
    /// Topic the notification belongs on (`update-{installation}`).
    pub topic: String,

    /// The serialized cache key that changed.
    pub cache_key: String,
}

impl CacheNotification {
    pub fn for_key(key: &QueueKey) -> Self {
        CacheNotification {
            topic: key.topic(),
            cache_key: key.cache_key(),
        }
    }
}

/// Keyed store mapping a [`QueueKey`] to `{pull number -> serialized snapshot}`.
///
/// Contract:
/// - `put` is idempotent, last write wins, and publishes a change
///   notification.
/// - `remove` leaves the stored data untouched when the entry is absent;
///   a change notification is published either way.
/// - `get_all` returns an empty mapping for an unknown branch.
/// - A branch whose hash empties out disappears from `list_known_branches`.
pub trait SnapshotCache: Send + Sync {
    /// Upserts the serialized snapshot under `number` in the hash for `key`.
    fn put(
        &self,
        key: &QueueKey,
        number: PullNumber,
        snapshot: &PullSnapshot,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Deletes the entry for `number`.
    fn remove(
        &self,
        key: &QueueKey,
        number: PullNumber,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Returns every current serialized snapshot for the branch.
    fn get_all(
        &self,
        key: &QueueKey,
    ) -> impl Future<Output = Result<HashMap<PullNumber, Vec<u8>>, CacheError>> + Send;

    /// Returns the serialized snapshot for one pull, if cached.
    fn get_one(
        &self,
        key: &QueueKey,
        number: PullNumber,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send;

    /// Scans every known branch under `namespace`'s installation/repo for a
    /// pull whose cached head commit matches `sha`.
    ///
    /// Used as a fallback lookup when an event carries only a commit SHA and
    /// no pull number. Returns the first match; head SHAs are effectively
    /// unique across open pulls at a given moment, so ties are not expected.
    fn find_by_head_sha(
        &self,
        namespace: &QueueKey,
        sha: &Sha,
    ) -> impl Future<Output = Result<Option<PullSnapshot>, CacheError>> + Send;

    /// Lists the branches currently holding at least one snapshot under
    /// `namespace`'s installation/repo.
    fn list_known_branches(
        &self,
        namespace: &QueueKey,
    ) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}
