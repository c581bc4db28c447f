//! SQLite-backed durable storage for the generative-media task queue.
//!
//! The public surface is the [`TaskRepository`] trait; [`SqliteStore`] is the only
//! production implementation. Tests throughout the workspace use [`memory::InMemoryStore`].

mod error;
mod repository;
mod rowmap;
mod schema;
mod sqlite;

pub mod memory;

pub use error::StoreError;
pub use repository::{CandidateRef, StaleLease, SuccessResult, TaskRepository};
pub use sqlite::SqliteStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use genqueue_model::{Task, TaskKind, TaskRecord, TaskStatus};
    use tempfile::NamedTempFile;

    fn image_task(id: &str, priority: i64) -> Task {
        let mut record = TaskRecord::new(id.to_string(), "text2image".to_string(), priority, 3, 300);
        record.expire_at = Some(Utc::now() + Duration::hours(1));
        Task::Image(genqueue_model::ImageTask {
            record,
            prompt: "a cat".to_string(),
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

    fn open_tmp() -> (NamedTempFile, SqliteStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path()).unwrap();
        (file, store)
    }

    #[test]
    fn create_and_get_round_trips() {
        let (_f, store) = open_tmp();
        let task = image_task("t1", 50);
        store.create_task(&task).unwrap();

        let fetched = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        match fetched {
            Task::Image(t) => {
                assert_eq!(t.record.id, "t1");
                assert_eq!(t.record.priority, 50);
                assert_eq!(t.record.status, TaskStatus::Pending);
                assert_eq!(t.prompt, "a cat");
            }
            _ => panic!("expected image task"),
        }
    }

    #[test]
    fn claim_is_exclusive() {
        let (_f, store) = open_tmp();
        store.create_task(&image_task("t1", 10)).unwrap();

        let now = Utc::now();
        let lock_cutoff = now - Duration::seconds(60);
        let candidates = store
            .claim_candidates(TaskKind::Image, now, lock_cutoff, None, false)
            .unwrap();
        assert_eq!(candidates.len(), 1);

        let won = store
            .try_claim(TaskKind::Image, "t1", "worker-a", now, lock_cutoff)
            .unwrap();
        assert!(won);

        let lost = store
            .try_claim(TaskKind::Image, "t1", "worker-b", now, lock_cutoff)
            .unwrap();
        assert!(!lost);

        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Running);
        assert_eq!(task.record().locked_by.as_deref(), Some("worker-a"));
    }

    #[test]
    fn stale_lease_is_reclaimable_after_cutoff() {
        let (_f, store) = open_tmp();
        store.create_task(&image_task("t1", 10)).unwrap();
        let now = Utc::now();
        store
            .try_claim(TaskKind::Image, "t1", "worker-a", now, now - Duration::seconds(60))
            .unwrap();

        // Not yet stale: same lock_timeout window still protects the lease.
        let still_fresh = store
            .try_claim(TaskKind::Image, "t1", "worker-b", now, now - Duration::seconds(60))
            .unwrap();
        assert!(!still_fresh);

        // Simulate `lock_timeout` elapsing by moving the cutoff forward of `locked_at`.
        let later = now + Duration::seconds(120);
        let reclaimed = store
            .try_claim(TaskKind::Image, "t1", "worker-b", later, later - Duration::seconds(60))
            .unwrap();
        assert!(reclaimed);
    }

    #[test]
    fn pause_resume_cancel_retry_cycle() {
        let (_f, store) = open_tmp();
        store.create_task(&image_task("t1", 10)).unwrap();
        let now = Utc::now();

        assert!(store.pause(TaskKind::Image, "t1", now).unwrap());
        assert!(!store.pause(TaskKind::Image, "t1", now).unwrap());
        assert!(store.resume(TaskKind::Image, "t1", now).unwrap());
        assert!(store.cancel(TaskKind::Image, "t1", now).unwrap());

        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Cancelled);

        assert!(store.retry_task(TaskKind::Image, "t1", now).unwrap());
        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Pending);
        assert_eq!(task.record().retry_count, 0);
    }

    #[test]
    fn cleanup_expired_is_idempotent() {
        let (_f, store) = open_tmp();
        let mut task = image_task("t1", 10);
        task.record_mut().expire_at = Some(Utc::now() - Duration::seconds(5));
        store.create_task(&task).unwrap();

        let affected = store.cleanup_expired(TaskKind::Image, Utc::now()).unwrap();
        assert_eq!(affected, 1);
        let affected_again = store.cleanup_expired(TaskKind::Image, Utc::now()).unwrap();
        assert_eq!(affected_again, 0);

        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Cancelled);
        assert_eq!(task.record().error.as_deref(), Some("Task expired"));
    }

    #[test]
    fn mark_processed_is_independent_of_status() {
        let (_f, store) = open_tmp();
        store.create_task(&image_task("t1", 10)).unwrap();
        let now = Utc::now();
        store
            .release_success(
                TaskKind::Image,
                "t1",
                SuccessResult {
                    result_url: Some("https://example.com/a.png".to_string()),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert_eq!(task.record().status, TaskStatus::Success);
        assert!(!task.record().processed);

        assert!(store.mark_processed(TaskKind::Image, "t1", now).unwrap());
        let task = store.get_task(TaskKind::Image, "t1").unwrap().unwrap();
        assert!(task.record().processed);
    }
}
