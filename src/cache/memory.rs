//! In-memory snapshot cache.
//!
//! Hash-map semantics per cache key, with change notifications published on a
//! tokio broadcast channel. Suitable for a single-process deployment and for
//! tests; a shared-store backend would implement [`SnapshotCache`] the same
//! way against its own connection.

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use tracing::warn;

use crate::types::{PullNumber, PullSnapshot, Sha};

use super::{CacheError, CacheNotification, QueueKey, SnapshotCache};

/// Buffer size for the notification channel. Notifications are best-effort;
/// slow subscribers observe `Lagged` rather than blocking mutations.
const NOTIFICATION_BUFFER: usize = 256;

/// An in-memory [`SnapshotCache`].
#[derive(Debug)]
pub struct InMemoryQueueCache {
    /// cache key -> { pull number -> serialized snapshot }
    entries: RwLock<HashMap<String, HashMap<PullNumber, Vec<u8>>>>,

    /// Change-notification channel. Held open for the cache's lifetime even
    /// with no subscribers.
    notifications: broadcast::Sender<CacheNotification>,
}

impl InMemoryQueueCache {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        InMemoryQueueCache {
            entries: RwLock::new(HashMap::new()),
            notifications,
        }
    }

    /// Subscribes to change notifications.
    ///
    /// Every `put` and every `remove` publishes one notification carrying
    /// the cache key that changed.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheNotification> {
        self.notifications.subscribe()
    }

    /// Injects raw bytes, bypassing serialization. Lets tests exercise the
    /// malformed-entry paths that `put` can't produce.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, key: &QueueKey, number: PullNumber, bytes: Vec<u8>) {
        self.entries
            .write()
            .await
            .entry(key.cache_key())
            .or_default()
            .insert(number, bytes);
    }

    fn publish(&self, key: &QueueKey) {
        // send() fails only when there are no subscribers, which is fine:
        // the core never consumes its own notifications.
        let _ = self.notifications.send(CacheNotification::for_key(key));
    }
}

impl Default for InMemoryQueueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache for InMemoryQueueCache {
    async fn put(
        &self,
        key: &QueueKey,
        number: PullNumber,
        snapshot: &PullSnapshot,
    ) -> Result<(), CacheError> {
        let bytes =
            serde_json::to_vec(snapshot).map_err(|source| CacheError::Encode { number, source })?;

        let mut entries = self.entries.write().await;
        entries
            .entry(key.cache_key())
            .or_default()
            .insert(number, bytes);
        drop(entries);

        self.publish(key);
        Ok(())
    }

    async fn remove(&self, key: &QueueKey, number: PullNumber) -> Result<(), CacheError> {
        let cache_key = key.cache_key();
        let mut entries = self.entries.write().await;

        if let Some(branch) = entries.get_mut(&cache_key) {
            branch.remove(&number);
            // A branch with no open pulls disappears from the known set.
            if branch.is_empty() {
                entries.remove(&cache_key);
            }
        }
        drop(entries);

        // Published even when the entry was absent: listeners treat
        // notifications as refresh hints, and a remove racing an earlier
        // remove still marks the key as worth re-reading.
        self.publish(key);
        Ok(())
    }

    async fn get_all(&self, key: &QueueKey) -> Result<HashMap<PullNumber, Vec<u8>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&key.cache_key()).cloned().unwrap_or_default())
    }

    async fn get_one(&self, key: &QueueKey, number: PullNumber) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&key.cache_key())
            .and_then(|branch| branch.get(&number))
            .cloned())
    }

    async fn find_by_head_sha(
        &self,
        namespace: &QueueKey,
        sha: &Sha,
    ) -> Result<Option<PullSnapshot>, CacheError> {
        let prefix = namespace.namespace_prefix();
        let entries = self.entries.read().await;

        for (cache_key, branch) in entries.iter() {
            if !cache_key.starts_with(&prefix) {
                continue;
            }
            for bytes in branch.values() {
                match serde_json::from_slice::<PullSnapshot>(bytes) {
                    Ok(snapshot) if &snapshot.head_sha == sha => return Ok(Some(snapshot)),
                    Ok(_) => {}
                    Err(error) => {
                        // A malformed entry must not abort the scan.
                        warn!(cache_key = %cache_key, %error, "skipping undecodable cache entry");
                    }
                }
            }
        }
        Ok(None)
    }

    async fn list_known_branches(&self, namespace: &QueueKey) -> Result<Vec<String>, CacheError> {
        let prefix = namespace.namespace_prefix();
        let entries = self.entries.read().await;

        let mut branches: Vec<String> = entries
            .keys()
            .filter_map(|cache_key| {
                if !cache_key.starts_with(&prefix) {
                    return None;
                }
                QueueKey::parse(cache_key).map(|k| k.branch)
            })
            .collect();
        branches.sort();
        Ok(branches)
    }
}
