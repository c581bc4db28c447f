//! An in-process, in-memory [`TaskRepository`] used by unit tests across the
//! workspace so the claim/heartbeat/release contract can be exercised without a
//! file-backed database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use genqueue_model::{Task, TaskKind, TaskStatus};

use crate::error::StoreError;
use crate::repository::{CandidateRef, StaleLease, SuccessResult, TaskRepository};

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<TaskKind, HashMap<String, Task>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, kind: TaskKind, f: impl FnOnce(&mut HashMap<String, Task>) -> T) -> T {
        let mut tables = self.tables.lock().unwrap();
        f(tables.entry(kind).or_default())
    }
}

impl TaskRepository for InMemoryStore {
    fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        self.with_table(task.kind(), |table| {
            table.insert(task.record().id.clone(), task.clone());
        });
        Ok(())
    }

    fn get_task(&self, kind: TaskKind, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.with_table(kind, |table| table.get(id).cloned()))
    }

    fn get_status(&self, kind: TaskKind, id: &str) -> Result<Option<TaskStatus>, StoreError> {
        Ok(self.with_table(kind, |table| table.get(id).map(|t| t.record().status)))
    }

    fn list_tasks(
        &self,
        kind: TaskKind,
        status: Option<TaskStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut rows: Vec<Task> = table
                .values()
                .filter(|t| status.map(|s| t.record().status == s).unwrap_or(true))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.record().created_at.cmp(&a.record().created_at));
            rows.into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect()
        }))
    }

    fn count_by_status(&self, kind: TaskKind) -> Result<BTreeMap<TaskStatus, i64>, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut counts = BTreeMap::new();
            for task in table.values() {
                *counts.entry(task.record().status).or_insert(0) += 1;
            }
            counts
        }))
    }

    fn claim_candidates(
        &self,
        kind: TaskKind,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
        project_id: Option<&str>,
        exclude_project: bool,
    ) -> Result<Vec<CandidateRef>, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut rows: Vec<&Task> = table
                .values()
                .filter(|t| {
                    let r = t.record();
                    r.status == TaskStatus::Pending
                        && r.expire_at.map(|e| e > now).unwrap_or(false)
                        && (r.locked_by.is_none() || r.locked_at.map(|l| l < lock_cutoff).unwrap_or(true))
                        && match (project_id, exclude_project) {
                            (Some(p), false) => r.project_id.as_deref() == Some(p),
                            (Some(p), true) => r.project_id.as_deref() != Some(p),
                            (None, _) => true,
                        }
                })
                .collect();
            rows.sort_by(|a, b| {
                a.record()
                    .priority
                    .cmp(&b.record().priority)
                    .then(a.record().created_at.cmp(&b.record().created_at))
            });
            rows.into_iter()
                .map(|t| CandidateRef {
                    id: t.record().id.clone(),
                    depends_on: t.record().depends_on.clone(),
                })
                .collect()
        }))
    }

    fn try_claim(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record();
                let leasable = r.status == TaskStatus::Pending
                    && (r.locked_by.is_none() || r.locked_at.map(|l| l < lock_cutoff).unwrap_or(true));
                if leasable {
                    let r = task.record_mut();
                    r.status = TaskStatus::Running;
                    r.locked_by = Some(worker_id.to_string());
                    r.locked_at = Some(now);
                    r.started_at = Some(now);
                    r.updated_at = now;
                    return true;
                }
            }
            false
        }))
    }

    fn heartbeat(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                if task.record().locked_by.as_deref() == Some(worker_id) {
                    task.record_mut().locked_at = Some(now);
                    return true;
                }
            }
            false
        }))
    }

    fn release_success(
        &self,
        kind: TaskKind,
        id: &str,
        result: SuccessResult,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                r.status = TaskStatus::Success;
                r.result_url = result.result_url;
                r.result_local_path = result.result_local_path;
                r.locked_by = None;
                r.locked_at = None;
                r.updated_at = now;
                r.completed_at = Some(now);
            }
            if let Some(ms) = result.extra_fields.get("result_duration_ms").and_then(|v| v.as_i64()) {
                if let Task::Audio(t) = table.get_mut(id).unwrap() {
                    t.result_duration_ms = Some(ms);
                }
            }
        });
        Ok(())
    }

    fn reopen_as_pending(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                r.status = TaskStatus::Pending;
                r.retry_count = new_retry_count;
                r.error = Some(error.to_string());
                r.locked_by = None;
                r.locked_at = None;
                r.updated_at = now;
                true
            } else {
                false
            }
        }))
    }

    fn finalize_as_failed(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                r.status = TaskStatus::Failed;
                r.retry_count = new_retry_count;
                r.error = Some(error.to_string());
                r.locked_by = None;
                r.locked_at = None;
                r.updated_at = now;
                r.completed_at = Some(now);
                true
            } else {
                false
            }
        }))
    }

    fn pause(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition_one(kind, id, TaskStatus::Pending, TaskStatus::Paused, now)
    }

    fn resume(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition_one(kind, id, TaskStatus::Paused, TaskStatus::Pending, now)
    }

    fn cancel(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                if matches!(r.status, TaskStatus::Pending | TaskStatus::Paused) {
                    r.status = TaskStatus::Cancelled;
                    r.updated_at = now;
                    return true;
                }
            }
            false
        }))
    }

    fn retry_task(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                if matches!(r.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                    r.status = TaskStatus::Pending;
                    r.retry_count = 0;
                    r.error = None;
                    r.locked_by = None;
                    r.locked_at = None;
                    r.started_at = None;
                    r.updated_at = now;
                    r.completed_at = None;
                    return true;
                }
            }
            false
        }))
    }

    fn pause_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.transition_all(kind, TaskStatus::Pending, TaskStatus::Paused, now)
    }

    fn resume_all_paused(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.transition_all(kind, TaskStatus::Paused, TaskStatus::Pending, now)
    }

    fn cancel_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut count = 0;
            for task in table.values_mut() {
                let r = task.record_mut();
                if r.status == TaskStatus::Pending {
                    r.status = TaskStatus::Cancelled;
                    r.updated_at = now;
                    count += 1;
                }
            }
            count
        }))
    }

    fn unprocessed(
        &self,
        kind: TaskKind,
        status: TaskStatus,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut rows: Vec<Task> = table
                .values()
                .filter(|t| t.record().status == status && !t.record().processed)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.record().completed_at.cmp(&b.record().completed_at));
            rows.into_iter().take(limit.max(0) as usize).collect()
        }))
    }

    fn mark_processed(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                r.processed = true;
                r.updated_at = now;
                true
            } else {
                false
            }
        }))
    }

    fn cleanup_expired(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut count = 0;
            for task in table.values_mut() {
                let r = task.record_mut();
                if r.status == TaskStatus::Pending && r.expire_at.map(|e| e < now).unwrap_or(false) {
                    r.status = TaskStatus::Cancelled;
                    r.error = Some("Task expired".to_string());
                    r.updated_at = now;
                    count += 1;
                }
            }
            count
        }))
    }

    fn cleanup_completed(&self, kind: TaskKind, before: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.with_table(kind, |table| {
            let before_count = table.len();
            table.retain(|_, task| {
                let r = task.record();
                !(matches!(r.status, TaskStatus::Success | TaskStatus::Cancelled)
                    && r.completed_at.map(|c| c < before).unwrap_or(false))
            });
            (before_count - table.len()) as u64
        }))
    }

    fn scan_stale_running(
        &self,
        kind: TaskKind,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StaleLease>, StoreError> {
        Ok(self.with_table(kind, |table| {
            table
                .values()
                .filter(|t| {
                    let r = t.record();
                    r.status == TaskStatus::Running && r.locked_at.map(|l| l < cutoff).unwrap_or(false)
                })
                .map(|t| StaleLease {
                    kind,
                    id: t.record().id.clone(),
                    retry_count: t.record().retry_count,
                    max_retries: t.record().max_retries,
                    locked_by: t.record().locked_by.clone(),
                })
                .collect()
        }))
    }
}

impl InMemoryStore {
    fn transition_one(
        &self,
        kind: TaskKind,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.with_table(kind, |table| {
            if let Some(task) = table.get_mut(id) {
                let r = task.record_mut();
                if r.status == from {
                    r.status = to;
                    r.updated_at = now;
                    return true;
                }
            }
            false
        }))
    }

    fn transition_all(
        &self,
        kind: TaskKind,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.with_table(kind, |table| {
            let mut count = 0;
            for task in table.values_mut() {
                let r = task.record_mut();
                if r.status == from {
                    r.status = to;
                    r.updated_at = now;
                    count += 1;
                }
            }
            count
        }))
    }
}
