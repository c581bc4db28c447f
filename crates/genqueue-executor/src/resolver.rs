use genqueue_model::{TaskRef, TaskStatus};
use genqueue_store::TaskRepository;

/// Checks whether every `kind:id` reference in a `depends_on` column is `success`.
/// An unknown kind or a missing/non-success dependency makes the task permanently
/// unleasable — there is no separate sweep that revisits these (see design notes).
pub fn dependencies_met(store: &dyn TaskRepository, depends_on: Option<&str>) -> bool {
    let Some(depends_on) = depends_on else {
        return true;
    };
    if depends_on.trim().is_empty() {
        return true;
    }

    for parsed in TaskRef::parse_list(depends_on) {
        match parsed {
            Err(_) => return false,
            Ok(task_ref) => match store.get_status(task_ref.kind, &task_ref.id) {
                Ok(Some(TaskStatus::Success)) => continue,
                _ => return false,
            },
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use genqueue_model::{Task, TaskKind, TaskRecord};
    use genqueue_store::memory::InMemoryStore;

    fn bare_task(kind: TaskKind, id: &str, status: TaskStatus) -> Task {
        let mut record = TaskRecord::new(id.to_string(), "x".to_string(), 100, 3, 300);
        record.status = status;
        record.expire_at = Some(Utc::now() + chrono::Duration::hours(1));
        match kind {
            TaskKind::Image => Task::Image(genqueue_model::ImageTask {
                record,
                prompt: String::new(),
                aspect_ratio: String::new(),
                resolution: None,
                reference_images: None,
                provider: String::new(),
                output_dir: None,
                shot_id: None,
                shot_sequence: None,
                slot: None,
            }),
            TaskKind::Video => Task::Video(genqueue_model::VideoTask {
                record,
                prompt: String::new(),
                aspect_ratio: String::new(),
                resolution: None,
                reference_images: None,
                duration: 5,
                provider: String::new(),
                output_dir: None,
                shot_id: None,
                shot_sequence: None,
            }),
            TaskKind::Audio => Task::Audio(genqueue_model::AudioTask {
                record,
                text: String::new(),
                voice_ref: None,
                emotion: None,
                emotion_intensity: None,
                speed: 1.0,
                provider: String::new(),
                output_dir: None,
                result_duration_ms: None,
                shot_id: None,
                shot_sequence: None,
                dialogue_index: None,
            }),
        }
    }

    #[test]
    fn empty_depends_on_is_always_met() {
        let store = InMemoryStore::new();
        assert!(dependencies_met(&store, None));
        assert!(dependencies_met(&store, Some("")));
    }

    #[test]
    fn unmet_until_dependency_succeeds() {
        let store = InMemoryStore::new();
        store
            .create_task(&bare_task(TaskKind::Image, "dep1", TaskStatus::Pending))
            .unwrap();
        assert!(!dependencies_met(&store, Some("image:dep1")));

        store
            .create_task(&bare_task(TaskKind::Image, "dep2", TaskStatus::Success))
            .unwrap();
        assert!(dependencies_met(&store, Some("image:dep2")));
    }

    #[test]
    fn unknown_kind_is_permanently_unmet() {
        let store = InMemoryStore::new();
        assert!(!dependencies_met(&store, Some("sprite:dep1")));
    }

    #[test]
    fn all_of_multiple_dependencies_must_succeed() {
        let store = InMemoryStore::new();
        store
            .create_task(&bare_task(TaskKind::Image, "a", TaskStatus::Success))
            .unwrap();
        store
            .create_task(&bare_task(TaskKind::Video, "b", TaskStatus::Pending))
            .unwrap();
        assert!(!dependencies_met(&store, Some("image:a,video:b")));
    }
}
