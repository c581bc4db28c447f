use serde::{Deserialize, Serialize};

use crate::image::split_paths;
use crate::TaskRecord;

/// `subtype`: `text2video` | `frames2video` | `reference2video`.
///
/// For `frames2video`, `reference_images` is ordered: first entry is the first frame,
/// second is the last frame. For `reference2video` the list is an unordered reference set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoTask {
    #[serde(flatten)]
    pub record: TaskRecord,

    pub prompt: String,
    pub aspect_ratio: String,
    pub resolution: Option<String>,
    pub reference_images: Option<String>,
    pub duration: i64,
    pub provider: String,
    pub output_dir: Option<String>,

    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
}

impl VideoTask {
    pub fn reference_image_paths(&self) -> Vec<String> {
        split_paths(self.reference_images.as_deref())
    }
}

pub const DEFAULT_DURATION_SECONDS: i64 = 5;
