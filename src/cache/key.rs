//! Queue cache keys.
//!
//! A [`QueueKey`] identifies one branch's queue:
//! `(installation, owner, repo, private, branch)`. Owner and repo are
//! lower-cased on construction so the key stays stable across display-name
//! changes on the host.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::InstallationId;

/// Prefix shared by all queue cache keys.
const KEY_PREFIX: &str = "queues";

/// Separator between key segments.
///
/// Branch names may themselves contain `~`, which is why parsing splits into
/// at most six segments and treats the tail as the branch verbatim.
const KEY_SEP: char = '~';

/// Composite identity of one branch's queue.
///
/// Used both as the cache partition key and as the payload of change
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    /// The GitHub App installation the repository belongs to.
    pub installation: InstallationId,

    /// Repository owner login, lower-cased.
    pub owner: String,

    /// Repository name, lower-cased.
    pub repo: String,

    /// Whether the repository is private.
    pub private: bool,

    /// The base branch this queue orders candidates for.
    pub branch: String,
}

impl QueueKey {
    /// Creates a key, normalizing owner and repo to lower case.
    pub fn new(
        installation: InstallationId,
        owner: impl AsRef<str>,
        repo: impl AsRef<str>,
        private: bool,
        branch: impl Into<String>,
    ) -> Self {
        QueueKey {
            installation,
            owner: owner.as_ref().to_lowercase(),
            repo: repo.as_ref().to_lowercase(),
            private,
            branch: branch.into(),
        }
    }

    /// Returns the same key pointed at a different branch.
    pub fn for_branch(&self, branch: impl Into<String>) -> Self {
        QueueKey {
            branch: branch.into(),
            ..self.clone()
        }
    }

    /// The serialized cache key:
    /// `queues~{installation}~{owner}~{repo}~{private}~{branch}`.
    pub fn cache_key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            KEY_PREFIX,
            self.installation,
            self.owner,
            self.repo,
            self.private,
            self.branch,
            sep = KEY_SEP,
        )
    }

    /// The cache-key prefix covering every branch of this installation/repo.
    pub fn namespace_prefix(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}",
            KEY_PREFIX,
            self.installation,
            self.owner,
            self.repo,
            self.private,
            sep = KEY_SEP,
        )
    }

    /// The pub/sub topic change notifications are published on: one topic per
    /// installation.
    pub fn topic(&self) -> String {
        format!("update-{}", self.installation)
    }

    /// Parses a serialized cache key back into a `QueueKey`.
    ///
    /// Returns `None` for anything that isn't a well-formed queue key. The
    /// branch segment is taken verbatim, so branch names containing `~` are
    /// round-tripped correctly.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(6, KEY_SEP);
        if parts.next()? != KEY_PREFIX {
            return None;
        }
        let installation = InstallationId(parts.next()?.parse().ok()?);
        let owner = parts.next()?.to_string();
        let repo = parts.next()?.to_string();
        let private = parts.next()?.parse().ok()?;
        let branch = parts.next()?.to_string();
        if branch.is_empty() {
            return None;
        }
        Some(QueueKey {
            installation,
            owner,
            repo,
            private,
            branch,
        })
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
