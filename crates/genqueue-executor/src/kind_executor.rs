use genqueue_model::{Task, TaskKind};

use crate::error::ExecutorError;

/// Result of successfully executing a task: the remote URL and/or a downloaded local
/// path, whichever the back-end and task configuration produced.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub result_url: Option<String>,
    pub result_local_path: Option<String>,
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

/// The seam between the generic claim/heartbeat/release loop and kind-specific
/// generation logic. One implementation each for image, video, and audio.
pub trait KindExecutor: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Performs the actual generation call against whichever back-end the task's
    /// settings resolve to, blocking until it either succeeds or exhausts its
    /// internal retries.
    fn execute(&self, task: &Task) -> Result<ExecutionOutcome, ExecutorError>;
}
