//! Core domain types for the merge-queue bot.
//!
//! This module contains the fundamental types used throughout the application,
//! designed to encode invariants via the type system.

pub mod ids;
pub mod pull;

// Re-export commonly used types at the module level
pub use ids::{DeliveryId, InstallationId, PullNumber, RepoId, Sha};
pub use pull::{CiState, ComputedFields, MergeReadiness, PullSnapshot, PullState};
