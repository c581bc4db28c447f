use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskStatus;

/// Fields common to every task kind, embedded by composition into `ImageTask`,
/// `VideoTask`, and `AudioTask` so the lifecycle columns stay identical across tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub subtype: String,
    pub status: TaskStatus,
    pub priority: i64,
    pub depends_on: Option<String>,
    pub project_id: Option<String>,

    pub result_url: Option<String>,
    pub result_local_path: Option<String>,
    pub error: Option<String>,

    pub max_retries: i64,
    pub retry_count: i64,
    pub timeout_seconds: i64,
    pub expire_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub processed: bool,
}

impl TaskRecord {
    /// A brand-new `pending` record. `id` is expected to already be a fresh UUID.
    pub fn new(id: String, subtype: String, priority: i64, max_retries: i64, timeout_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            subtype,
            status: TaskStatus::Pending,
            priority,
            depends_on: None,
            project_id: None,
            result_url: None,
            result_local_path: None,
            error: None,
            max_retries,
            retry_count: 0,
            timeout_seconds,
            expire_at: None,
            locked_by: None,
            locked_at: None,
            started_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            processed: false,
        }
    }

    pub fn is_leasable_status(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }
}
