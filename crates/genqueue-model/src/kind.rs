use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which back-end/table a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Image,
    Video,
    Audio,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Image, TaskKind::Video, TaskKind::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
            TaskKind::Audio => "audio",
        }
    }

    /// Table name this kind is persisted under.
    pub fn table_name(&self) -> &'static str {
        match self {
            TaskKind::Image => "image_task",
            TaskKind::Video => "video_task",
            TaskKind::Audio => "audio_task",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(TaskKind::Image),
            "video" => Ok(TaskKind::Video),
            "audio" => Ok(TaskKind::Audio),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}
