use std::path::{Path, PathBuf};

use genqueue_model::{Task, TaskKind};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::client::{
    compress_image_if_needed, download_file, extension_from_url, video_reference_budget_kb, GenerationClient,
};
use crate::error::ExecutorError;
use crate::kind_executor::{ExecutionOutcome, KindExecutor};
use crate::settings::{resolve_backend, BackendConfig};

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi"];

pub struct VideoExecutor {
    fallback: BackendConfig,
    settings_file: Option<PathBuf>,
    runtime: Runtime,
}

impl VideoExecutor {
    pub fn new(fallback: BackendConfig, settings_file: Option<PathBuf>) -> Result<Self, ExecutorError> {
        let runtime = Runtime::new()?;
        Ok(Self {
            fallback,
            settings_file,
            runtime,
        })
    }
}

impl KindExecutor for VideoExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Video
    }

    fn execute(&self, task: &Task) -> Result<ExecutionOutcome, ExecutorError> {
        let Task::Video(video) = task else {
            return Err(ExecutorError::InvalidTask("expected a video task".to_string()));
        };

        let existing_paths: Vec<String> = video
            .reference_image_paths()
            .into_iter()
            .filter(|p| Path::new(p).exists())
            .collect();

        let image_paths = match video.record.subtype.as_str() {
            "frames2video" => {
                if existing_paths.is_empty() {
                    return Err(ExecutorError::InvalidTask(
                        "frames2video requires at least 1 frame image".to_string(),
                    ));
                }
                info!(count = existing_paths.len(), "using frame(s) for frames2video");
                existing_paths
            }
            "reference2video" => {
                if existing_paths.is_empty() {
                    return Err(ExecutorError::InvalidTask(
                        "reference2video requires reference images".to_string(),
                    ));
                }
                info!(count = existing_paths.len(), "using reference image(s)");
                existing_paths
            }
            _ => {
                info!("using text2video mode (no images)");
                Vec::new()
            }
        };

        let mut references_base64 = Vec::with_capacity(image_paths.len());
        for path in &image_paths {
            references_base64.push(compress_image_if_needed(Path::new(path), video_reference_budget_kb())?);
            debug!(path, "added reference image for video generation");
        }

        let config = resolve_backend(self.settings_file.as_deref(), TaskKind::Video, &self.fallback);
        let client = GenerationClient::new(config)?;

        let result_url = self
            .runtime
            .block_on(client.generate_video(&video.prompt, &references_base64))?;

        let mut result_local_path = None;
        if let Some(output_dir) = &video.output_dir {
            let ext = extension_from_url(&result_url, ".mp4", VIDEO_EXTENSIONS);
            let local_path = Path::new(output_dir).join(format!("{}{}", video.record.id, ext));
            self.runtime.block_on(download_file(
                &reqwest::Client::new(),
                &result_url,
                &local_path,
            ))?;
            result_local_path = Some(local_path.display().to_string());
        }

        Ok(ExecutionOutcome {
            result_url: Some(result_url),
            result_local_path,
            extra_fields: serde_json::Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_model::{TaskRecord, VideoTask};

    fn video_task(subtype: &str, reference_images: Option<&str>) -> Task {
        let mut record = TaskRecord::new("vid-1".to_string(), subtype.to_string(), 10, 3, 300);
        record.subtype = subtype.to_string();
        Task::Video(VideoTask {
            record,
            prompt: "a dragon flying".to_string(),
            aspect_ratio: "16:9".to_string(),
            resolution: None,
            reference_images: reference_images.map(str::to_string),
            duration: 5,
            provider: "test".to_string(),
            output_dir: None,
            shot_id: None,
            shot_sequence: None,
        })
    }

    fn executor() -> VideoExecutor {
        let config = BackendConfig {
            api_url: "https://example.com".to_string(),
            api_key: "k".to_string(),
            model: "m".to_string(),
        };
        VideoExecutor::new(config, None).unwrap()
    }

    #[test]
    fn frames2video_without_existing_files_is_rejected() {
        let executor = executor();
        let task = video_task("frames2video", Some("/nonexistent/frame.png"));
        let err = executor.execute(&task).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTask(_)));
    }

    #[test]
    fn reference2video_without_any_images_is_rejected() {
        let executor = executor();
        let task = video_task("reference2video", None);
        let err = executor.execute(&task).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTask(_)));
    }
}
