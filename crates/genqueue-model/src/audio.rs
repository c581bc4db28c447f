use serde::{Deserialize, Serialize};

use crate::TaskRecord;

/// `subtype`: `text2speech`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTask {
    #[serde(flatten)]
    pub record: TaskRecord,

    pub text: String,
    pub voice_ref: Option<String>,
    pub emotion: Option<String>,
    pub emotion_intensity: Option<String>,
    pub speed: f64,
    pub provider: String,
    pub output_dir: Option<String>,

    pub result_duration_ms: Option<i64>,

    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
    pub dialogue_index: Option<i64>,
}

pub const DEFAULT_SPEED: f64 = 1.0;
