//! Octocrab-backed [`HostClient`] scoped to a single repository.
//!
//! Uses the typed pulls API where octocrab's models are stable and generic
//! REST routes elsewhere. Rate limiting, pagination beyond what the queue
//! needs, and retry policy are deliberately not modeled here; failures are
//! categorized by [`HostError`] and left to the caller's error policy.

use chrono::Utc;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::policy::{BranchPolicy, MergeMethod};
use crate::status::StatusReport;
use crate::types::{PullNumber, PullState, RepoId, Sha};

use super::error::HostError;
use super::{HostClient, PullFacts};

/// A GitHub API client scoped to one repository.
#[derive(Clone)]
pub struct GithubHost {
    client: Octocrab,
    repo: RepoId,
}

impl GithubHost {
    /// Creates a host client from a pre-configured Octocrab instance.
    ///
    /// Use octocrab's installation authentication to obtain `client` when
    /// running as a GitHub App.
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self { client, repo }
    }

    /// Creates a host client from a token.
    pub fn from_token(token: impl Into<String>, repo: RepoId) -> Result<Self, HostError> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(HostError::from_octocrab)?;
        Ok(Self::new(client, repo))
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    fn route(&self, tail: impl AsRef<str>) -> String {
        format!(
            "/repos/{}/{}/{}",
            self.repo.owner,
            self.repo.repo,
            tail.as_ref()
        )
    }
}

impl std::fmt::Debug for GithubHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubHost")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct MergeRequest {
    merge_method: &'static str,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    merged: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBranchResponse {
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    state: String,
    description: &'a str,
    context: &'a str,
}

/// Converts an octocrab pull model into [`PullFacts`].
fn facts_from_pull(pull: octocrab::models::pulls::PullRequest) -> PullFacts {
    let state = if pull.state == Some(octocrab::models::IssueState::Closed) {
        PullState::Closed
    } else {
        PullState::Open
    };
    PullFacts {
        number: PullNumber(pull.number),
        state,
        merged: pull.merged_at.is_some(),
        head_sha: Sha::new(&pull.head.sha),
        head_ref: pull.head.ref_field,
        base_sha: Sha::new(&pull.base.sha),
        base_ref: pull.base.ref_field,
        head_modifiable: pull.maintainer_can_modify,
        updated_at: pull.updated_at.unwrap_or_else(Utc::now),
    }
}

impl HostClient for GithubHost {
    async fn get_pull(&self, number: PullNumber) -> Result<PullFacts, HostError> {
        let pull = self
            .client
            .pulls(&self.repo.owner, &self.repo.repo)
            .get(number.0)
            .await
            .map_err(HostError::from_octocrab)?;
        Ok(facts_from_pull(pull))
    }

    async fn search_pull_by_sha(&self, sha: &Sha) -> Result<Option<PullNumber>, HostError> {
        // Open pulls only: a status event for a closed pull is stale anyway.
        // Head SHAs are effectively unique across open pulls, so the first
        // match wins.
        let mut page = 1u32;
        loop {
            let result = self
                .client
                .pulls(&self.repo.owner, &self.repo.repo)
                .list()
                .state(octocrab::params::State::Open)
                .per_page(100)
                .page(page)
                .send()
                .await
                .map_err(HostError::from_octocrab)?;

            let items = result.items;
            let is_last_page = items.len() < 100;

            for pull in items {
                if pull.head.sha == sha.as_str() {
                    return Ok(Some(PullNumber(pull.number)));
                }
            }

            if is_last_page {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn list_collaborator_ids(&self) -> Result<Vec<u64>, HostError> {
        let body: serde_json::Value = self
            .client
            .get(self.route("collaborators?per_page=100"), None::<&()>)
            .await
            .map_err(HostError::from_octocrab)?;

        let ids = body
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|user| user.get("id").and_then(|id| id.as_u64()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn changed_files(&self, number: PullNumber) -> Result<Vec<String>, HostError> {
        let body: serde_json::Value = self
            .client
            .get(
                self.route(format!("pulls/{}/files?per_page=100", number.0)),
                None::<&()>,
            )
            .await
            .map_err(HostError::from_octocrab)?;

        let files = body
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("filename").and_then(|f| f.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(files)
    }

    async fn get_ref(&self, refname: &str) -> Result<Option<Sha>, HostError> {
        let result: Result<serde_json::Value, _> = self
            .client
            .get(self.route(format!("git/ref/{}", refname)), None::<&()>)
            .await;

        match result {
            Ok(body) => Ok(body
                .pointer("/object/sha")
                .and_then(|sha| sha.as_str())
                .map(Sha::new)),
            Err(err) => {
                let err = HostError::from_octocrab(err);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn delete_ref(&self, refname: &str) -> Result<(), HostError> {
        let response = self
            .client
            ._delete(self.route(format!("git/refs/{}", refname)), None::<&()>)
            .await
            .map_err(HostError::from_octocrab)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            Err(HostError::not_found(format!("ref {} not found", refname)))
        } else {
            Err(HostError::permanent(format!(
                "failed to delete ref {}: HTTP {}",
                refname, status
            )))
        }
    }

    async fn fetch_branch_protection(
        &self,
        branch: &str,
    ) -> Result<Option<serde_json::Value>, HostError> {
        let result: Result<serde_json::Value, _> = self
            .client
            .get(
                self.route(format!("branches/{}/protection", branch)),
                None::<&()>,
            )
            .await;

        match result {
            Ok(body) => Ok(Some(body)),
            Err(err) => {
                let err = HostError::from_octocrab(err);
                // GitHub answers 404 both for an unprotected branch and for a
                // missing branch; either way there is no protection to read.
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn apply_branch_protection(
        &self,
        branch: &str,
        policy: &BranchPolicy,
    ) -> Result<(), HostError> {
        let Some(protection) = policy.protection.as_ref() else {
            // Policy doesn't pin protection settings; nothing to apply.
            return Ok(());
        };

        let _: serde_json::Value = self
            .client
            .put(
                self.route(format!("branches/{}/protection", branch)),
                Some(protection),
            )
            .await
            .map_err(HostError::from_octocrab)?;
        Ok(())
    }

    async fn merge_pull(&self, number: PullNumber, method: MergeMethod) -> Result<(), HostError> {
        let request = MergeRequest {
            merge_method: method.as_str(),
        };

        let response: MergeResponse = self
            .client
            .put(self.route(format!("pulls/{}/merge", number.0)), Some(&request))
            .await
            .map_err(HostError::from_octocrab)?;

        if response.merged {
            Ok(())
        } else {
            Err(HostError::permanent(format!(
                "merge request for {} returned merged=false: {}",
                number,
                response.message.as_deref().unwrap_or("unknown reason")
            )))
        }
    }

    async fn update_branch(&self, number: PullNumber, token: &str) -> Result<(), HostError> {
        // Branch updates push to the contributor's fork, which the app
        // credential may not be allowed to do; use the configured
        // write-capable user token instead.
        let as_user = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(HostError::from_octocrab)?;

        let _: UpdateBranchResponse = as_user
            .put(
                self.route(format!("pulls/{}/update-branch", number.0)),
                None::<&()>,
            )
            .await
            .map_err(HostError::from_octocrab)?;
        Ok(())
    }

    async fn post_check(&self, head_sha: &Sha, report: &StatusReport) -> Result<(), HostError> {
        let request = StatusRequest {
            state: report.state.to_string(),
            description: &report.description,
            context: report.check_name,
        };

        let result: Result<serde_json::Value, _> = self
            .client
            .post(
                self.route(format!("statuses/{}", head_sha)),
                Some(&request),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = HostError::from_octocrab(err);
                warn!(sha = %head_sha.short(), check = report.check_name, error = %err, "failed to post commit status");
                Err(err)
            }
        }
    }
}
