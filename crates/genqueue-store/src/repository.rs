use chrono::{DateTime, Utc};
use genqueue_model::{Task, TaskKind, TaskStatus};
use std::collections::BTreeMap;

use crate::error::StoreError;

/// Payload accepted by `release_success`; kind-specific extras (e.g. audio's
/// `result_duration_ms`) ride along as a small JSON object so the trait stays
/// generic over all three kinds.
#[derive(Debug, Clone, Default)]
pub struct SuccessResult {
    pub result_url: Option<String>,
    pub result_local_path: Option<String>,
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

/// A leasable row's identity plus the one field the claim loop needs before it can
/// even consider trying the CAS update: its dependency list.
#[derive(Debug, Clone)]
pub struct CandidateRef {
    pub id: String,
    pub depends_on: Option<String>,
}

/// An abandoned lease found by the startup recovery sweep; carries just enough to
/// decide retry-vs-fail and to write an explanatory note.
#[derive(Debug, Clone)]
pub struct StaleLease {
    pub kind: TaskKind,
    pub id: String,
    pub retry_count: i64,
    pub max_retries: i64,
    pub locked_by: Option<String>,
}

/// The Store's public surface. The only production implementation is SQLite-backed;
/// an in-memory fake backs unit tests in this crate and in `genqueue-executor`.
pub trait TaskRepository: Send + Sync {
    fn create_task(&self, task: &Task) -> Result<(), StoreError>;
    fn get_task(&self, kind: TaskKind, id: &str) -> Result<Option<Task>, StoreError>;
    fn get_status(&self, kind: TaskKind, id: &str) -> Result<Option<TaskStatus>, StoreError>;
    fn list_tasks(
        &self,
        kind: TaskKind,
        status: Option<TaskStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError>;
    fn count_by_status(&self, kind: TaskKind) -> Result<BTreeMap<TaskStatus, i64>, StoreError>;

    /// Leasable candidates ordered `priority ASC, created_at ASC`, already filtered on
    /// `status='pending' AND expire_at > now AND (locked_by IS NULL OR locked_at < lock_cutoff)`
    /// and, when `project_id` is set, further filtered to that project (or its complement
    /// when `exclude_project` is set).
    fn claim_candidates(
        &self,
        kind: TaskKind,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
        project_id: Option<&str>,
        exclude_project: bool,
    ) -> Result<Vec<CandidateRef>, StoreError>;

    /// Compare-and-swap: only transitions `id` from `pending` (unlocked or stale) to
    /// `running` under `worker_id`. Returns whether this call won the race.
    fn try_claim(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `UPDATE ... SET locked_at = now WHERE id = ? AND locked_by = ?`.
    fn heartbeat(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn release_success(
        &self,
        kind: TaskKind,
        id: &str,
        result: SuccessResult,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clears the lease and returns the task to `pending` with an incremented retry
    /// counter and an explanatory error; used both by the executor's failure path and
    /// by stale-lease recovery.
    fn reopen_as_pending(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Terminal failure: clears the lease, sets `status=failed`, stamps `completed_at`.
    fn finalize_as_failed(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn pause(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
    fn resume(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
    fn cancel(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
    fn retry_task(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    fn pause_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError>;
    fn resume_all_paused(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError>;
    fn cancel_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError>;

    fn unprocessed(
        &self,
        kind: TaskKind,
        status: TaskStatus,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError>;
    fn mark_processed(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// `pending` tasks whose `expire_at < now`; cancels them with `error='Task expired'`.
    fn cleanup_expired(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError>;
    /// Deletes `{success,cancelled}` rows with `completed_at < before`.
    fn cleanup_completed(&self, kind: TaskKind, before: DateTime<Utc>) -> Result<u64, StoreError>;

    /// `running` rows whose `locked_at < cutoff` — abandoned leases for the Manager's
    /// startup recovery sweep to reopen or fail.
    fn scan_stale_running(
        &self,
        kind: TaskKind,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StaleLease>, StoreError>;
}
