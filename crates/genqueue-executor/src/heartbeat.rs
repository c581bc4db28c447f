use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::Utc;
use genqueue_model::TaskKind;
use genqueue_store::TaskRepository;
use tracing::{debug, warn};

/// Renews a single claimed task's lease on a fixed interval until stopped.
///
/// Runs on its own OS thread rather than sharing the executor's main loop so a slow
/// or blocking `execute()` call never starves the heartbeat and triggers a spurious
/// stale-lease recovery elsewhere.
pub struct Heartbeat {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(
        store: Arc<dyn TaskRepository>,
        kind: TaskKind,
        id: String,
        worker_id: String,
        interval_seconds: u64,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = StdDuration::from_secs(interval_seconds.max(1));

        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match store.heartbeat(kind, &id, &worker_id, Utc::now()) {
                    Ok(true) => debug!(kind = %kind, id = %id, "heartbeat renewed"),
                    Ok(false) => {
                        warn!(kind = %kind, id = %id, "heartbeat found lease no longer owned by us");
                        break;
                    }
                    Err(e) => warn!(kind = %kind, id = %id, error = %e, "heartbeat write failed"),
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signals the heartbeat thread to stop and blocks until it has. Must be called
    /// before releasing the lease so a late-arriving heartbeat can't resurrect it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_model::{ImageTask, Task, TaskRecord};
    use genqueue_store::memory::InMemoryStore;

    fn image(id: &str) -> Task {
        let mut record = TaskRecord::new(id.to_string(), "text2image".to_string(), 100, 3, 300);
        record.expire_at = Some(Utc::now() + chrono::Duration::hours(1));
        record.status = genqueue_model::TaskStatus::Running;
        record.locked_by = Some("w1".to_string());
        record.locked_at = Some(Utc::now() - chrono::Duration::seconds(30));
        Task::Image(ImageTask {
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
        })
    }

    #[test]
    fn renews_locked_at_while_running() {
        let store: Arc<dyn TaskRepository> = Arc::new(InMemoryStore::new());
        store.create_task(&image("t1")).unwrap();

        let before = match store.get_task(TaskKind::Image, "t1").unwrap().unwrap() {
            Task::Image(t) => t.record.locked_at.unwrap(),
            _ => unreachable!(),
        };

        let hb = Heartbeat::start(Arc::clone(&store), TaskKind::Image, "t1".to_string(), "w1".to_string(), 1);
        thread::sleep(StdDuration::from_millis(1200));
        hb.stop();

        let after = match store.get_task(TaskKind::Image, "t1").unwrap().unwrap() {
            Task::Image(t) => t.record.locked_at.unwrap(),
            _ => unreachable!(),
        };
        assert!(after > before);
    }
}
