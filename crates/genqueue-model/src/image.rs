use serde::{Deserialize, Serialize};

use crate::TaskRecord;

/// `subtype`: `text2image` | `image2image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTask {
    #[serde(flatten)]
    pub record: TaskRecord,

    pub prompt: String,
    pub aspect_ratio: String,
    pub resolution: Option<String>,
    /// Comma-separated local file paths.
    pub reference_images: Option<String>,
    pub provider: String,
    pub output_dir: Option<String>,

    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
    /// 1..4.
    pub slot: Option<i64>,
}

impl ImageTask {
    pub fn reference_image_paths(&self) -> Vec<String> {
        split_paths(self.reference_images.as_deref())
    }
}

pub(crate) fn split_paths(csv: Option<&str>) -> Vec<String> {
    csv.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
