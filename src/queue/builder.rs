//! Queue construction: load, deserialize, order.
//!
//! The builder turns one branch's cached snapshots into a deterministically
//! ordered candidate list. Deserialization fans out over a bounded worker
//! pool with per-entry error isolation: a malformed entry is logged and
//! skipped, never aborting the batch.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{CacheError, QueueKey, SnapshotCache};
use crate::types::PullSnapshot;

/// Bound on concurrent snapshot deserialization.
pub(crate) const DESERIALIZE_WORKERS: usize = 8;

/// Sorts candidates by `(sort_rank desc, updated_at desc)`, ties broken by
/// `number desc`.
///
/// Higher rank means closer to mergeable; among equally ranked pulls the most
/// recently updated one wins (freshest information). The number tie-break
/// makes the order total, so re-running on the same input always yields the
/// same order.
pub fn sort_snapshots(snapshots: &mut [PullSnapshot]) {
    snapshots.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

/// Builds the ordered candidate queue for one branch.
pub async fn build<C: SnapshotCache>(
    cache: &C,
    key: &QueueKey,
) -> Result<Vec<PullSnapshot>, CacheError> {
    let raw = cache.get_all(key).await?;

    let limiter = Arc::new(Semaphore::new(DESERIALIZE_WORKERS));
    let mut tasks = JoinSet::new();
    for (number, bytes) in raw {
        let limiter = Arc::clone(&limiter);
        tasks.spawn(async move {
            let _permit = limiter.acquire_owned().await.ok();
            (number, serde_json::from_slice::<PullSnapshot>(&bytes))
        });
    }

    let mut queue = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(snapshot))) => queue.push(snapshot),
            Ok((number, Err(error))) => {
                warn!(pull = %number, key = %key, %error, "skipping malformed cache entry");
            }
            Err(error) => {
                warn!(key = %key, %error, "snapshot decode task panicked; entry skipped");
            }
        }
    }

    sort_snapshots(&mut queue);

    debug!(key = %key, len = queue.len(), "queue built");
    for snapshot in &queue {
        debug!(
            key = %key,
            entry = %snapshot.pretty(),
            sha = %snapshot.head_sha.short(),
            "queue entry"
        );
    }

    Ok(queue)
}
