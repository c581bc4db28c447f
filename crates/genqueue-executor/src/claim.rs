use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use genqueue_model::{Task, TaskKind};
use genqueue_store::TaskRepository;
use rand::Rng;
use tracing::{debug, info};

use crate::error::ExecutorError;
use crate::resolver::dependencies_met;

const MAX_RETRIES_ON_CONTENTION: u32 = 3;

/// `current_project_id` lets the claim loop prefer tasks belonging to whatever
/// project the desktop app currently has open, without the executor crate knowing
/// anything about project state itself.
pub type ProjectIdGetter = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Atomically claims one leasable task of `kind`, retrying a bounded number of times
/// with randomized back-off when the store reports lock contention.
pub fn claim_task(
    store: &dyn TaskRepository,
    kind: TaskKind,
    worker_id: &str,
    lock_timeout_seconds: i64,
    current_project_id: Option<&ProjectIdGetter>,
) -> Result<Option<Task>, ExecutorError> {
    for attempt in 0..MAX_RETRIES_ON_CONTENTION {
        match claim_once(store, kind, worker_id, lock_timeout_seconds, current_project_id) {
            Ok(result) => return Ok(result),
            Err(ExecutorError::Store(e)) if e.is_busy() => {
                let wait_ms = rand::thread_rng().gen_range(500..=2000);
                debug!(attempt, wait_ms, "database locked, backing off before retry");
                thread::sleep(StdDuration::from_millis(wait_ms));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

fn claim_once(
    store: &dyn TaskRepository,
    kind: TaskKind,
    worker_id: &str,
    lock_timeout_seconds: i64,
    current_project_id: Option<&ProjectIdGetter>,
) -> Result<Option<Task>, ExecutorError> {
    let now = Utc::now();
    let lock_cutoff = now - Duration::seconds(lock_timeout_seconds);

    let project_id = current_project_id.and_then(|getter| getter());

    if let Some(project_id) = project_id.as_deref() {
        if let Some(task) = try_claim_candidates(
            store,
            kind,
            worker_id,
            now,
            lock_cutoff,
            Some(project_id),
            false,
        )? {
            return Ok(Some(task));
        }
        return try_claim_candidates(store, kind, worker_id, now, lock_cutoff, Some(project_id), true);
    }

    try_claim_candidates(store, kind, worker_id, now, lock_cutoff, None, false)
}

fn try_claim_candidates(
    store: &dyn TaskRepository,
    kind: TaskKind,
    worker_id: &str,
    now: chrono::DateTime<Utc>,
    lock_cutoff: chrono::DateTime<Utc>,
    project_id: Option<&str>,
    exclude_project: bool,
) -> Result<Option<Task>, ExecutorError> {
    let candidates = store.claim_candidates(kind, now, lock_cutoff, project_id, exclude_project)?;

    for candidate in candidates {
        if !dependencies_met(store, candidate.depends_on.as_deref()) {
            continue;
        }

        if store.try_claim(kind, &candidate.id, worker_id, now, lock_cutoff)? {
            if let Some(task) = store.get_task(kind, &candidate.id)? {
                info!(
                    kind = %kind, id = %candidate.id, worker_id, project = project_id.unwrap_or("none"),
                    "claimed task"
                );
                return Ok(Some(task));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_model::{ImageTask, TaskRecord};
    use genqueue_store::memory::InMemoryStore;

    fn image(id: &str, priority: i64, project_id: Option<&str>) -> Task {
        let mut record = TaskRecord::new(id.to_string(), "text2image".to_string(), priority, 3, 300);
        record.expire_at = Some(Utc::now() + Duration::hours(1));
        record.project_id = project_id.map(str::to_string);
        Task::Image(ImageTask {
            record,
            prompt: "p".to_string(),
            aspect_ratio: "1:1".to_string(),
            resolution: None,
            reference_images: None,
            provider: "test".to_string(),
            output_dir: None,
            shot_id: None,
            shot_sequence: None,
            slot: None,
        })
    }

    #[test]
    fn picks_lowest_priority_first() {
        let store = InMemoryStore::new();
        store.create_task(&image("low-priority", 50, None)).unwrap();
        store.create_task(&image("high-priority", 5, None)).unwrap();

        let claimed = claim_task(&store, TaskKind::Image, "w1", 60, None)
            .unwrap()
            .unwrap();
        assert_eq!(claimed.record().id, "high-priority");
    }

    #[test]
    fn prefers_current_project_over_absolute_priority() {
        let store = InMemoryStore::new();
        store.create_task(&image("x", 50, Some("Q"))).unwrap();
        store.create_task(&image("y", 100, Some("P"))).unwrap();
        store.create_task(&image("z", 10, Some("Q"))).unwrap();

        let getter: ProjectIdGetter = Arc::new(|| Some("P".to_string()));
        let claimed = claim_task(&store, TaskKind::Image, "w1", 60, Some(&getter))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.record().id, "y");
    }

    #[test]
    fn two_workers_never_claim_the_same_task() {
        let store = InMemoryStore::new();
        store.create_task(&image("t1", 10, None)).unwrap();

        let first = claim_task(&store, TaskKind::Image, "w1", 60, None).unwrap();
        let second = claim_task(&store, TaskKind::Image, "w2", 60, None).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }
}
