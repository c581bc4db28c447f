use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Utc;
use genqueue_model::TaskKind;
use genqueue_store::{SuccessResult, TaskRepository};
use tracing::{error, info, warn};

use crate::claim::{claim_task, ProjectIdGetter};
use crate::error::ExecutorError;
use crate::heartbeat::Heartbeat;
use crate::kind_executor::KindExecutor;

pub struct ExecutorConfig {
    pub worker_id: String,
    pub heartbeat_interval_seconds: u64,
    pub lock_timeout_seconds: i64,
    pub idle_sleep: StdDuration,
    pub current_project_id: Option<ProjectIdGetter>,
}

/// Generic claim -> heartbeat -> execute -> release loop shared by all three task
/// kinds; `K` supplies the kind-specific `execute()` and result-field logic.
pub struct Executor<K: KindExecutor> {
    store: Arc<dyn TaskRepository>,
    kind_executor: K,
    config: ExecutorConfig,
    running: Arc<AtomicBool>,
}

impl<K: KindExecutor> Executor<K> {
    pub fn new(store: Arc<dyn TaskRepository>, kind_executor: K, config: ExecutorConfig) -> Self {
        Self {
            store,
            kind_executor,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind_executor.kind()
    }

    /// Claims one task, runs it to completion, and releases it. Returns whether a
    /// task was found at all (not whether it succeeded).
    pub fn run_once(&self) -> Result<bool, ExecutorError> {
        let kind = self.kind();
        let task = claim_task(
            self.store.as_ref(),
            kind,
            &self.config.worker_id,
            self.config.lock_timeout_seconds,
            self.config.current_project_id.as_ref(),
        )?;

        let Some(task) = task else {
            return Ok(false);
        };
        let id = task.record().id.clone();

        let heartbeat = Heartbeat::start(
            Arc::clone(&self.store),
            kind,
            id.clone(),
            self.config.worker_id.clone(),
            self.config.heartbeat_interval_seconds,
        );

        let outcome = self.kind_executor.execute(&task);
        heartbeat.stop();

        match outcome {
            Ok(outcome) => {
                self.store.release_success(
                    kind,
                    &id,
                    SuccessResult {
                        result_url: outcome.result_url,
                        result_local_path: outcome.result_local_path,
                        extra_fields: outcome.extra_fields,
                    },
                    Utc::now(),
                )?;
                info!(kind = %kind, id = %id, "task succeeded");
            }
            Err(e) => {
                self.release_failure(kind, &id, &e)?;
            }
        }

        Ok(true)
    }

    fn release_failure(&self, kind: TaskKind, id: &str, e: &ExecutorError) -> Result<(), ExecutorError> {
        let Some(task) = self.store.get_task(kind, id)? else {
            warn!(kind = %kind, id, "task disappeared before failure could be recorded");
            return Ok(());
        };
        let record = task.record();
        let new_retry_count = record.retry_count + 1;
        let now = Utc::now();
        let message = e.to_string();

        if new_retry_count < record.max_retries {
            self.store.reopen_as_pending(kind, id, new_retry_count, &message, now)?;
            warn!(
                kind = %kind, id, retry_count = new_retry_count, max_retries = record.max_retries,
                error = %message, "task failed, will retry"
            );
        } else {
            self.store.finalize_as_failed(kind, id, new_retry_count, &message, now)?;
            error!(kind = %kind, id, error = %message, "task failed permanently");
        }
        Ok(())
    }

    /// Runs until `stop()` is called from another thread, sleeping `idle_sleep`
    /// whenever a poll finds nothing to claim. A run_once error is logged and
    /// treated the same as an idle poll rather than crashing the loop.
    pub fn run_loop(&self) {
        self.running.store(true, Ordering::Relaxed);
        info!(kind = %self.kind(), worker_id = %self.config.worker_id, "executor started");

        while self.running.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.config.idle_sleep),
                Err(e) => {
                    error!(kind = %self.kind(), error = %e, "error in run loop");
                    thread::sleep(self.config.idle_sleep);
                }
            }
        }
        info!(kind = %self.kind(), "executor stopped");
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind_executor::ExecutionOutcome;
    use genqueue_model::{ImageTask, Task, TaskRecord, TaskStatus};
    use genqueue_store::memory::InMemoryStore;

    struct AlwaysSucceeds;
    impl KindExecutor for AlwaysSucceeds {
        fn kind(&self) -> TaskKind {
            TaskKind::Image
        }
        fn execute(&self, _task: &Task) -> Result<ExecutionOutcome, ExecutorError> {
            Ok(ExecutionOutcome {
                result_url: Some("https://example.com/out.png".to_string()),
                ..Default::default()
            })
        }
    }

    struct AlwaysFails;
    impl KindExecutor for AlwaysFails {
        fn kind(&self) -> TaskKind {
            TaskKind::Image
        }
        fn execute(&self, _task: &Task) -> Result<ExecutionOutcome, ExecutorError> {
            Err(ExecutorError::Backend("synthetic failure".to_string()))
        }
    }

    fn image(id: &str, max_retries: i64) -> Task {
        let mut record = TaskRecord::new(id.to_string(), "text2image".to_string(), 10, max_retries, 300);
        record.expire_at = Some(Utc::now() + chrono::Duration::hours(1));
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

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            worker_id: "test-worker".to_string(),
            heartbeat_interval_seconds: 30,
            lock_timeout_seconds: 60,
            idle_sleep: StdDuration::from_millis(10),
            current_project_id: None,
        }
    }

    #[test]
    fn successful_run_once_marks_task_success() {
        let store: Arc<dyn TaskRepository> = Arc::new(InMemoryStore::new());
        store.create_task(&image("t1", 3)).unwrap();

        let executor = Executor::new(Arc::clone(&store), AlwaysSucceeds, config());
        assert!(executor.run_once().unwrap());

        match store.get_task(TaskKind::Image, "t1").unwrap().unwrap() {
            Task::Image(t) => {
                assert_eq!(t.record.status, TaskStatus::Success);
                assert_eq!(t.record.result_url.as_deref(), Some("https://example.com/out.png"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn failure_under_retry_limit_goes_back_to_pending() {
        let store: Arc<dyn TaskRepository> = Arc::new(InMemoryStore::new());
        store.create_task(&image("t1", 3)).unwrap();

        let executor = Executor::new(Arc::clone(&store), AlwaysFails, config());
        executor.run_once().unwrap();

        match store.get_task(TaskKind::Image, "t1").unwrap().unwrap() {
            Task::Image(t) => {
                assert_eq!(t.record.status, TaskStatus::Pending);
                assert_eq!(t.record.retry_count, 1);
                assert!(t.record.locked_by.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn failure_at_retry_limit_becomes_permanently_failed() {
        let store: Arc<dyn TaskRepository> = Arc::new(InMemoryStore::new());
        store.create_task(&image("t1", 1)).unwrap();

        let executor = Executor::new(Arc::clone(&store), AlwaysFails, config());
        executor.run_once().unwrap();

        match store.get_task(TaskKind::Image, "t1").unwrap().unwrap() {
            Task::Image(t) => {
                assert_eq!(t.record.status, TaskStatus::Failed);
                assert_eq!(t.record.retry_count, 1);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn run_once_returns_false_when_nothing_to_claim() {
        let store: Arc<dyn TaskRepository> = Arc::new(InMemoryStore::new());
        let executor = Executor::new(store, AlwaysSucceeds, config());
        assert!(!executor.run_once().unwrap());
    }
}
