//! Creation, query, batch-control, and stale-lease recovery for the generative-media
//! task queue. Sits on top of a [`TaskRepository`] without knowing whether it's backed
//! by SQLite or an in-memory fake.

mod error;
mod params;

pub use error::ManagerError;
pub use params::{CreateAudioTaskParams, CreateImageTaskParams, CreateVideoTaskParams};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use genqueue_model::{AudioTask, ImageTask, Task, TaskKind, TaskRecord, TaskRef, TaskStatus, VideoTask};
use genqueue_store::TaskRepository;
use tracing::{info, warn};
use uuid::Uuid;

/// Default window (seconds) after which a `running` task with no heartbeat is
/// considered abandoned by the Manager's startup recovery sweep.
pub const DEFAULT_STALE_TIMEOUT_SECONDS: i64 = 120;
/// Default age (days) for `cleanup_completed`.
pub const DEFAULT_CLEANUP_DAYS: i64 = 7;

pub struct Manager {
    store: Arc<dyn TaskRepository>,
}

impl Manager {
    /// Opens the store and runs the startup stale-lease recovery sweep, matching the
    /// source's `TaskManager.__init__` behavior.
    pub fn new(store: Arc<dyn TaskRepository>) -> Result<Self, ManagerError> {
        let manager = Self { store };
        manager.recover_stale_tasks(DEFAULT_STALE_TIMEOUT_SECONDS)?;
        Ok(manager)
    }

    /// Skips the startup sweep; useful when the caller wants to control its timing
    /// explicitly (e.g. in tests).
    pub fn without_recovery(store: Arc<dyn TaskRepository>) -> Self {
        Self { store }
    }

    // ========== recovery ==========

    pub fn recover_stale_tasks(&self, stale_timeout_seconds: i64) -> Result<usize, ManagerError> {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(stale_timeout_seconds);
        let mut recovered = 0usize;

        for kind in TaskKind::ALL {
            let stale = self.store.scan_stale_running(kind, cutoff)?;
            for lease in stale {
                let holder = lease.locked_by.as_deref().unwrap_or("unknown");
                if lease.retry_count < lease.max_retries {
                    let new_retry_count = lease.retry_count + 1;
                    let note = format!("Task recovered after stale (was running by {holder})");
                    self.store
                        .reopen_as_pending(kind, &lease.id, new_retry_count, &note, now)?;
                    warn!(
                        kind = %kind, id = %lease.id, retry = new_retry_count, max = lease.max_retries,
                        "recovered stale task to pending"
                    );
                } else {
                    let note = format!("Task failed after max retries (was running by {holder})");
                    self.store
                        .finalize_as_failed(kind, &lease.id, lease.retry_count, &note, now)?;
                    warn!(kind = %kind, id = %lease.id, "stale task exhausted retries, marked failed");
                }
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    // ========== creation ==========

    pub fn create_image_task(&self, params: CreateImageTaskParams) -> Result<String, ManagerError> {
        let id = Uuid::new_v4().to_string();
        let mut record = TaskRecord::new(
            id.clone(),
            params.subtype,
            params.priority,
            params.max_retries,
            params.timeout_seconds,
        );
        record.expire_at = Some(Utc::now() + Duration::seconds(params.ttl_seconds));
        record.depends_on = params.depends_on;
        record.project_id = params.project_id;

        let task = Task::Image(ImageTask {
            record,
            prompt: params.prompt,
            aspect_ratio: params.aspect_ratio,
            resolution: params.resolution,
            reference_images: params.reference_images,
            provider: params.provider,
            output_dir: params.output_dir,
            shot_id: params.shot_id,
            shot_sequence: params.shot_sequence,
            slot: params.slot,
        });
        self.store.create_task(&task)?;
        info!(id = %id, "created image task");
        Ok(id)
    }

    pub fn create_video_task(&self, params: CreateVideoTaskParams) -> Result<String, ManagerError> {
        let id = Uuid::new_v4().to_string();
        let mut record = TaskRecord::new(
            id.clone(),
            params.subtype,
            params.priority,
            params.max_retries,
            params.timeout_seconds,
        );
        record.expire_at = Some(Utc::now() + Duration::seconds(params.ttl_seconds));
        record.depends_on = params.depends_on;
        record.project_id = params.project_id;

        let task = Task::Video(VideoTask {
            record,
            prompt: params.prompt,
            aspect_ratio: params.aspect_ratio,
            resolution: params.resolution,
            reference_images: params.reference_images,
            duration: params.duration,
            provider: params.provider,
            output_dir: params.output_dir,
            shot_id: params.shot_id,
            shot_sequence: params.shot_sequence,
        });
        self.store.create_task(&task)?;
        info!(id = %id, "created video task");
        Ok(id)
    }

    pub fn create_audio_task(&self, params: CreateAudioTaskParams) -> Result<String, ManagerError> {
        let id = Uuid::new_v4().to_string();
        let mut record = TaskRecord::new(
            id.clone(),
            "text2speech".to_string(),
            params.priority,
            params.max_retries,
            params.timeout_seconds,
        );
        record.expire_at = Some(Utc::now() + Duration::seconds(params.ttl_seconds));
        record.depends_on = params.depends_on;
        record.project_id = params.project_id;

        let task = Task::Audio(AudioTask {
            record,
            text: params.text,
            voice_ref: params.voice_ref,
            emotion: params.emotion,
            emotion_intensity: params.emotion_intensity,
            speed: params.speed,
            provider: params.provider,
            output_dir: params.output_dir,
            result_duration_ms: None,
            shot_id: params.shot_id,
            shot_sequence: params.shot_sequence,
            dialogue_index: params.dialogue_index,
        });
        self.store.create_task(&task)?;
        info!(id = %id, "created audio task");
        Ok(id)
    }

    // ========== query ==========

    pub fn get_task(&self, kind: TaskKind, id: &str) -> Result<Option<Task>, ManagerError> {
        Ok(self.store.get_task(kind, id)?)
    }

    /// Batch-fetches a list of `kind:id` references, keyed by bare id — matching the
    /// source's flat `{task_id: task_dict}` result shape (ids are assumed unique
    /// across kinds in practice; see the design notes on cross-kind id uniqueness).
    pub fn poll_tasks(&self, refs: &[TaskRef]) -> Result<HashMap<String, Task>, ManagerError> {
        let mut results = HashMap::new();
        for r in refs {
            if let Some(task) = self.store.get_task(r.kind, &r.id)? {
                results.insert(r.id.clone(), task);
            }
        }
        Ok(results)
    }

    pub fn get_summary(&self) -> Result<BTreeMap<String, BTreeMap<TaskStatus, i64>>, ManagerError> {
        let mut summary = BTreeMap::new();
        let mut total: BTreeMap<TaskStatus, i64> = BTreeMap::new();

        for kind in TaskKind::ALL {
            let counts = self.store.count_by_status(kind)?;
            for (status, count) in &counts {
                *total.entry(*status).or_insert(0) += count;
            }
            summary.insert(kind.to_string(), counts);
        }
        summary.insert("total".to_string(), total);
        Ok(summary)
    }

    /// When `kind` is `None`, queries every kind table for up to `limit` rows each,
    /// merges them, and re-sorts/truncates in memory — matching the source's behavior
    /// for an unscoped listing.
    pub fn list_tasks(
        &self,
        kind: Option<TaskKind>,
        status: Option<TaskStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Task>, ManagerError> {
        match kind {
            Some(kind) => Ok(self.store.list_tasks(kind, status, offset, limit)?),
            None => {
                let mut merged = Vec::new();
                for kind in TaskKind::ALL {
                    merged.extend(self.store.list_tasks(kind, status, 0, limit)?);
                }
                merged.sort_by(|a, b| b.record().created_at.cmp(&a.record().created_at));
                let start = offset.max(0) as usize;
                let end = (start + limit.max(0) as usize).min(merged.len());
                Ok(if start >= merged.len() {
                    Vec::new()
                } else {
                    merged[start..end].to_vec()
                })
            }
        }
    }

    // ========== single-task operations ==========

    pub fn pause_task(&self, kind: TaskKind, id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.pause(kind, id, Utc::now())?)
    }

    pub fn resume_task(&self, kind: TaskKind, id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.resume(kind, id, Utc::now())?)
    }

    pub fn cancel_task(&self, kind: TaskKind, id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.cancel(kind, id, Utc::now())?)
    }

    pub fn retry_task(&self, kind: TaskKind, id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.retry_task(kind, id, Utc::now())?)
    }

    // ========== bulk operations ==========

    pub fn pause_all(&self, kind: Option<TaskKind>) -> Result<u64, ManagerError> {
        self.bulk(kind, |store, kind, now| store.pause_all_pending(kind, now))
    }

    pub fn resume_all(&self, kind: Option<TaskKind>) -> Result<u64, ManagerError> {
        self.bulk(kind, |store, kind, now| store.resume_all_paused(kind, now))
    }

    pub fn cancel_all_pending(&self, kind: Option<TaskKind>) -> Result<u64, ManagerError> {
        self.bulk(kind, |store, kind, now| store.cancel_all_pending(kind, now))
    }

    fn bulk(
        &self,
        kind: Option<TaskKind>,
        op: impl Fn(&Arc<dyn TaskRepository>, TaskKind, DateTime<Utc>) -> Result<u64, genqueue_store::StoreError>,
    ) -> Result<u64, ManagerError> {
        let now = Utc::now();
        let mut total = 0;
        for kind in kind.map(|k| vec![k]).unwrap_or_else(|| TaskKind::ALL.to_vec()) {
            total += op(&self.store, kind, now)?;
        }
        if total > 0 {
            info!(count = total, "bulk status transition applied");
        }
        Ok(total)
    }

    // ========== reconciler handshake ==========

    pub fn get_unprocessed_completed_tasks(
        &self,
        kind: Option<TaskKind>,
        limit: i64,
    ) -> Result<Vec<Task>, ManagerError> {
        self.unprocessed(kind, TaskStatus::Success, limit)
    }

    pub fn get_unprocessed_failed_tasks(
        &self,
        kind: Option<TaskKind>,
        limit: i64,
    ) -> Result<Vec<Task>, ManagerError> {
        self.unprocessed(kind, TaskStatus::Failed, limit)
    }

    fn unprocessed(&self, kind: Option<TaskKind>, status: TaskStatus, limit: i64) -> Result<Vec<Task>, ManagerError> {
        let mut results = Vec::new();
        for kind in kind.map(|k| vec![k]).unwrap_or_else(|| TaskKind::ALL.to_vec()) {
            results.extend(self.store.unprocessed(kind, status, limit)?);
        }
        Ok(results)
    }

    pub fn mark_task_processed(&self, kind: TaskKind, id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.mark_processed(kind, id, Utc::now())?)
    }

    // ========== cleanup ==========

    pub fn cleanup_expired(&self) -> Result<u64, ManagerError> {
        let now = Utc::now();
        let mut total = 0;
        for kind in TaskKind::ALL {
            total += self.store.cleanup_expired(kind, now)?;
        }
        if total > 0 {
            info!(count = total, "cleaned up expired tasks");
        }
        Ok(total)
    }

    pub fn cleanup_completed(&self, before_days: i64) -> Result<u64, ManagerError> {
        let cutoff = Utc::now() - Duration::days(before_days);
        let mut total = 0;
        for kind in TaskKind::ALL {
            total += self.store.cleanup_completed(kind, cutoff)?;
        }
        if total > 0 {
            info!(count = total, days = before_days, "cleaned up completed tasks");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_store::memory::InMemoryStore;

    fn manager() -> Manager {
        Manager::without_recovery(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn create_and_fetch_image_task() {
        let m = manager();
        let id = m
            .create_image_task(CreateImageTaskParams {
                subtype: "text2image".to_string(),
                prompt: "a cat".to_string(),
                aspect_ratio: "1:1".to_string(),
                provider: "test".to_string(),
                ..Default::default()
            })
            .unwrap();

        let task = m.get_task(TaskKind::Image, &id).unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Pending);
        assert_eq!(task.record().max_retries, 3);
    }

    #[test]
    fn summary_counts_by_kind_and_status() {
        let m = manager();
        m.create_image_task(CreateImageTaskParams {
            subtype: "text2image".to_string(),
            prompt: "p".to_string(),
            aspect_ratio: "1:1".to_string(),
            provider: "test".to_string(),
            ..Default::default()
        })
        .unwrap();

        let summary = m.get_summary().unwrap();
        assert_eq!(summary["image"][&TaskStatus::Pending], 1);
        assert_eq!(summary["total"][&TaskStatus::Pending], 1);
    }

    #[test]
    fn cancel_all_pending_across_kinds() {
        let m = manager();
        for _ in 0..3 {
            m.create_image_task(CreateImageTaskParams {
                subtype: "text2image".to_string(),
                prompt: "p".to_string(),
                aspect_ratio: "1:1".to_string(),
                provider: "test".to_string(),
                ..Default::default()
            })
            .unwrap();
        }
        let cancelled = m.cancel_all_pending(None).unwrap();
        assert_eq!(cancelled, 3);
    }

    #[test]
    fn retry_resets_counters() {
        let m = manager();
        let id = m
            .create_image_task(CreateImageTaskParams {
                subtype: "text2image".to_string(),
                prompt: "p".to_string(),
                aspect_ratio: "1:1".to_string(),
                provider: "test".to_string(),
                max_retries: 1,
                ..Default::default()
            })
            .unwrap();

        assert!(m.cancel_task(TaskKind::Image, &id).unwrap());
        assert!(m.retry_task(TaskKind::Image, &id).unwrap());
        let task = m.get_task(TaskKind::Image, &id).unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Pending);
        assert_eq!(task.record().retry_count, 0);
    }
}
