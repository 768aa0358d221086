//! A merge-queue bot for GitHub: keeps one ordered queue of mergeable pull
//! requests per branch and drives the front candidate through branch updates
//! and merges as events arrive.
//!
//! The core pipeline is event-driven: webhook deliveries become typed
//! [`dispatch::events::Event`]s, the [`dispatch::EventDispatcher`] refreshes
//! the [`cache`] snapshot of the affected pull, and each pass of the
//! [`queue`] scheduler re-validates the best candidate against live host
//! state before acting. External concerns (hydration, policy parsing, the
//! VCS host, backports) are traits implemented by the embedding deployment.

pub mod cache;
pub mod dispatch;
pub mod host;
pub mod hydrate;
pub mod policy;
pub mod queue;
pub mod server;
pub mod status;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;
