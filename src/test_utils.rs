//! Shared fixtures and mock collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::cache::QueueKey;
use crate::dispatch::BackportTrigger;
use crate::dispatch::events::PullRef;
use crate::host::{HostClient, HostError, PullFacts};
use crate::hydrate::{HydrationContext, Hydrator, SnapshotSeed};
use crate::policy::{BranchPolicy, MergeMethod, PolicyError, PolicyLoader};
use crate::status::StatusReport;
use crate::types::{
    ComputedFields, InstallationId, MergeReadiness, PullNumber, PullSnapshot, PullState, Sha,
};

pub const HEAD_SHA: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const BASE_SHA: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// The queue key most tests operate under: installation 1, `octocat/hello`.
pub fn queue_key(branch: &str) -> QueueKey {
    QueueKey::new(InstallationId(1), "octocat", "hello", false, branch)
}

/// An open snapshot targeting `main` with the given readiness and update time.
pub fn snapshot(number: u64, readiness: MergeReadiness, updated_at: &str) -> PullSnapshot {
    PullSnapshot {
        number: PullNumber(number),
        base_ref: "main".to_string(),
        head_ref: "feature".to_string(),
        head_sha: Sha::new(HEAD_SHA),
        base_sha: Sha::new(BASE_SHA),
        state: PullState::Open,
        merged: false,
        head_modifiable: false,
        readiness,
        sort_rank: readiness.sort_rank(),
        updated_at: timestamp(updated_at),
        computed: ComputedFields::default(),
    }
}

/// An open pull reference matching the [`snapshot`] fixture.
pub fn pull_ref(number: u64) -> PullRef {
    PullRef {
        number: PullNumber(number),
        base_ref: "main".to_string(),
        head_ref: "feature".to_string(),
        head_sha: Sha::new(HEAD_SHA),
        state: PullState::Open,
        merged: false,
    }
}

/// Live host facts matching the [`snapshot`] fixture.
pub fn pull_facts(number: u64, updated_at: &str) -> PullFacts {
    PullFacts {
        number: PullNumber(number),
        state: PullState::Open,
        merged: false,
        head_sha: Sha::new(HEAD_SHA),
        head_ref: "feature".to_string(),
        base_sha: Sha::new(BASE_SHA),
        base_ref: "main".to_string(),
        head_modifiable: false,
        updated_at: timestamp(updated_at),
    }
}

/// A permissive single-approval merge policy.
pub fn test_policy() -> BranchPolicy {
    BranchPolicy {
        merge_method: MergeMethod::Merge,
        required_approvals: 1,
        strict_update: true,
        automated_backport_labels: Vec::new(),
        protection: None,
    }
}

fn timestamp(iso: &str) -> DateTime<Utc> {
    iso.parse().unwrap()
}

/// A scripted [`HostClient`] that records every side effect.
///
/// Read paths are configured up front (`give_pull`, `index_sha`, ...); write
/// paths append to recorders the test inspects afterwards.
pub struct MockHost {
    pulls: Mutex<HashMap<PullNumber, PullFacts>>,
    sha_index: Mutex<HashMap<Sha, PullNumber>>,
    collaborators: Mutex<Vec<u64>>,
    changed_files: Mutex<HashMap<PullNumber, Vec<String>>>,
    refs: Mutex<HashMap<String, Sha>>,
    protection_state: Mutex<Option<serde_json::Value>>,

    merged: Mutex<Vec<PullNumber>>,
    updated: Mutex<Vec<PullNumber>>,
    checks: Mutex<Vec<(Sha, StatusReport)>>,
    deleted: Mutex<Vec<String>>,
    protected: Mutex<Vec<String>>,

    fail_merges: bool,
    protection_gone: bool,
}

impl MockHost {
    pub fn new() -> Self {
        MockHost {
            pulls: Mutex::new(HashMap::new()),
            sha_index: Mutex::new(HashMap::new()),
            collaborators: Mutex::new(vec![7]),
            changed_files: Mutex::new(HashMap::new()),
            refs: Mutex::new(HashMap::new()),
            protection_state: Mutex::new(None),
            merged: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            protected: Mutex::new(Vec::new()),
            fail_merges: false,
            protection_gone: false,
        }
    }

    /// Makes every merge attempt fail with a permanent error.
    pub fn failing_merges(mut self) -> Self {
        self.fail_merges = true;
        self
    }

    /// Makes branch-protection updates fail as if the branch vanished.
    pub fn protection_gone(mut self) -> Self {
        self.protection_gone = true;
        self
    }

    pub fn give_pull(&self, facts: PullFacts) {
        self.sha_index
            .lock()
            .unwrap()
            .insert(facts.head_sha.clone(), facts.number);
        self.pulls.lock().unwrap().insert(facts.number, facts);
    }

    /// Makes a commit search resolve `sha` to `number` even when it isn't
    /// the pull's current head.
    pub fn index_sha(&self, sha: Sha, number: PullNumber) {
        self.sha_index.lock().unwrap().insert(sha, number);
    }

    pub fn set_collaborators(&self, ids: Vec<u64>) {
        *self.collaborators.lock().unwrap() = ids;
    }

    pub fn set_changed_files(&self, number: PullNumber, files: Vec<String>) {
        self.changed_files.lock().unwrap().insert(number, files);
    }

    pub fn give_ref(&self, refname: &str, sha: Sha) {
        self.refs.lock().unwrap().insert(refname.to_string(), sha);
    }

    /// Sets the branch protection the host currently reports.
    pub fn set_protection(&self, value: serde_json::Value) {
        *self.protection_state.lock().unwrap() = Some(value);
    }

    pub fn merged_pulls(&self) -> Vec<PullNumber> {
        self.merged.lock().unwrap().clone()
    }

    pub fn updated_branches(&self) -> Vec<PullNumber> {
        self.updated.lock().unwrap().clone()
    }

    pub fn posted_checks(&self) -> Vec<(Sha, StatusReport)> {
        self.checks.lock().unwrap().clone()
    }

    pub fn deleted_refs(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn protected_branches(&self) -> Vec<String> {
        self.protected.lock().unwrap().clone()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClient for MockHost {
    async fn get_pull(&self, number: PullNumber) -> Result<PullFacts, HostError> {
        self.pulls
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| HostError::not_found(format!("no such pull: {number}")))
    }

    async fn search_pull_by_sha(&self, sha: &Sha) -> Result<Option<PullNumber>, HostError> {
        Ok(self.sha_index.lock().unwrap().get(sha).copied())
    }

    async fn list_collaborator_ids(&self) -> Result<Vec<u64>, HostError> {
        Ok(self.collaborators.lock().unwrap().clone())
    }

    async fn changed_files(&self, number: PullNumber) -> Result<Vec<String>, HostError> {
        Ok(self
            .changed_files
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_ref(&self, refname: &str) -> Result<Option<Sha>, HostError> {
        Ok(self.refs.lock().unwrap().get(refname).cloned())
    }

    async fn delete_ref(&self, refname: &str) -> Result<(), HostError> {
        if self.refs.lock().unwrap().remove(refname).is_none() {
            return Err(HostError::not_found(format!("ref {refname} not found")));
        }
        self.deleted.lock().unwrap().push(refname.to_string());
        Ok(())
    }

    async fn fetch_branch_protection(
        &self,
        branch: &str,
    ) -> Result<Option<serde_json::Value>, HostError> {
        if self.protection_gone {
            return Err(HostError::not_found(format!("branch {branch} not found")));
        }
        Ok(self.protection_state.lock().unwrap().clone())
    }

    async fn apply_branch_protection(
        &self,
        branch: &str,
        _policy: &BranchPolicy,
    ) -> Result<(), HostError> {
        if self.protection_gone {
            return Err(HostError::not_found(format!("branch {branch} not found")));
        }
        self.protected.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn merge_pull(&self, number: PullNumber, _method: MergeMethod) -> Result<(), HostError> {
        if self.fail_merges {
            return Err(HostError::permanent("Pull Request is not mergeable"));
        }
        self.merged.lock().unwrap().push(number);
        Ok(())
    }

    async fn update_branch(&self, number: PullNumber, _token: &str) -> Result<(), HostError> {
        self.updated.lock().unwrap().push(number);
        Ok(())
    }

    async fn post_check(&self, head_sha: &Sha, report: &StatusReport) -> Result<(), HostError> {
        self.checks
            .lock()
            .unwrap()
            .push((head_sha.clone(), report.clone()));
        Ok(())
    }
}

enum Scripted {
    Live(PullSnapshot),
    Fail,
}

/// A scripted [`Hydrator`]: answers `hydrate` calls from a FIFO script.
///
/// An exhausted script answers not-found, so a test that forgets a step fails
/// loudly instead of hanging.
pub struct MockHydrator {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(PullNumber, bool)>>,
}

impl MockHydrator {
    pub fn new() -> Self {
        MockHydrator {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues the snapshot the next `hydrate` call returns.
    pub fn live(&self, snapshot: PullSnapshot) {
        self.script.lock().unwrap().push_back(Scripted::Live(snapshot));
    }

    /// Makes the next `hydrate` call fail with a transient error.
    pub fn fail_next(&self) {
        self.script.lock().unwrap().push_back(Scripted::Fail);
    }

    /// The `(pull, seed_was_empty)` pairs observed so far.
    pub fn calls(&self) -> Vec<(PullNumber, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockHydrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Hydrator for MockHydrator {
    async fn hydrate(
        &self,
        _key: &QueueKey,
        number: PullNumber,
        seed: SnapshotSeed,
        _ctx: HydrationContext<'_>,
    ) -> Result<PullSnapshot, HostError> {
        self.calls.lock().unwrap().push((number, seed.is_empty()));
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Live(snapshot)) => Ok(snapshot),
            Some(Scripted::Fail) => Err(HostError::transient("scripted hydration failure")),
            None => Err(HostError::not_found(format!(
                "no scripted snapshot for {number}"
            ))),
        }
    }
}

/// A [`PolicyLoader`] returning one fixed answer for every branch.
pub struct MockPolicyLoader {
    answer: Result<Option<BranchPolicy>, String>,
    calls: Mutex<Vec<(String, Option<Sha>)>>,
}

impl MockPolicyLoader {
    /// Loads [`test_policy`] for every branch.
    pub fn new() -> Self {
        MockPolicyLoader {
            answer: Ok(Some(test_policy())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_policy(policy: BranchPolicy) -> Self {
        MockPolicyLoader {
            answer: Ok(Some(policy)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// No policy file: the queue is disabled everywhere.
    pub fn absent() -> Self {
        MockPolicyLoader {
            answer: Ok(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The policy file exists but does not validate.
    pub fn invalid(message: &str) -> Self {
        MockPolicyLoader {
            answer: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The `(branch, config_ref)` pairs observed so far.
    pub fn calls(&self) -> Vec<(String, Option<Sha>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockPolicyLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyLoader for MockPolicyLoader {
    async fn load(
        &self,
        branch: &str,
        config_ref: Option<&Sha>,
    ) -> Result<Option<BranchPolicy>, PolicyError> {
        self.calls
            .lock()
            .unwrap()
            .push((branch.to_string(), config_ref.cloned()));
        match &self.answer {
            Ok(policy) => Ok(policy.clone()),
            Err(message) => Err(PolicyError::Invalid(message.clone())),
        }
    }
}

/// A [`BackportTrigger`] that only records what it was asked to open.
pub struct RecordingBackports {
    triggers: Mutex<Vec<(PullNumber, Vec<String>)>>,
}

impl RecordingBackports {
    pub fn new() -> Self {
        RecordingBackports {
            triggers: Mutex::new(Vec::new()),
        }
    }

    pub fn triggered(&self) -> Vec<(PullNumber, Vec<String>)> {
        self.triggers.lock().unwrap().clone()
    }
}

impl Default for RecordingBackports {
    fn default() -> Self {
        Self::new()
    }
}

impl BackportTrigger for RecordingBackports {
    async fn trigger(&self, pull: &PullRef, labels: &[String]) -> Result<(), HostError> {
        self.triggers
            .lock()
            .unwrap()
            .push((pull.number, labels.to_vec()));
        Ok(())
    }
}
