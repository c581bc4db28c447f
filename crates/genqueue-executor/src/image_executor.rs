use std::path::{Path, PathBuf};

use genqueue_model::{Task, TaskKind};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::client::{
    compress_image_if_needed, download_file, extension_from_url, image_reference_budget_kb, GenerationClient,
};
use crate::error::ExecutorError;
use crate::kind_executor::{ExecutionOutcome, KindExecutor};
use crate::settings::{resolve_backend, BackendConfig};

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

pub struct ImageExecutor {
    fallback: BackendConfig,
    settings_file: Option<PathBuf>,
    runtime: Runtime,
}

impl ImageExecutor {
    pub fn new(fallback: BackendConfig, settings_file: Option<PathBuf>) -> Result<Self, ExecutorError> {
        let runtime = Runtime::new()?;
        Ok(Self {
            fallback,
            settings_file,
            runtime,
        })
    }
}

impl KindExecutor for ImageExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Image
    }

    fn execute(&self, task: &Task) -> Result<ExecutionOutcome, ExecutorError> {
        let Task::Image(image) = task else {
            return Err(ExecutorError::InvalidTask("expected an image task".to_string()));
        };

        let mut references = Vec::new();
        for path in image.reference_image_paths() {
            let p = Path::new(&path);
            if p.exists() {
                references.push(compress_image_if_needed(p, image_reference_budget_kb())?);
                debug!(path = %path, "added reference image");
            }
        }

        let config = resolve_backend(self.settings_file.as_deref(), TaskKind::Image, &self.fallback);
        let client = GenerationClient::new(config)?;

        let urls = self
            .runtime
            .block_on(client.generate_image(&image.prompt, &references, 1))?;
        let result_url = urls
            .into_iter()
            .next()
            .ok_or_else(|| ExecutorError::Backend("no image URL returned from API".to_string()))?;

        let mut result_local_path = None;
        if let Some(output_dir) = &image.output_dir {
            let ext = extension_from_url(&result_url, ".jpeg", IMAGE_EXTENSIONS);
            let local_path = Path::new(output_dir).join(format!("{}{}", image.record.id, ext));
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
    use genqueue_model::{ImageTask, TaskRecord};

    fn image_task(output_dir: Option<&str>) -> Task {
        let record = TaskRecord::new("img-1".to_string(), "text2image".to_string(), 10, 3, 300);
        Task::Image(ImageTask {
            record,
            prompt: "a cat".to_string(),
            aspect_ratio: "1:1".to_string(),
            resolution: None,
            reference_images: None,
            provider: "test".to_string(),
            output_dir: output_dir.map(str::to_string),
            shot_id: None,
            shot_sequence: None,
            slot: None,
        })
    }

    #[test]
    fn rejects_non_image_task() {
        let config = BackendConfig {
            api_url: "https://example.com".to_string(),
            api_key: "k".to_string(),
            model: "m".to_string(),
        };
        let executor = ImageExecutor::new(config, None).unwrap();

        let video = Task::Video(genqueue_model::VideoTask {
            record: TaskRecord::new("v".to_string(), "text2video".to_string(), 10, 3, 300),
            prompt: String::new(),
            aspect_ratio: String::new(),
            resolution: None,
            reference_images: None,
            duration: 5,
            provider: String::new(),
            output_dir: None,
            shot_id: None,
            shot_sequence: None,
        });

        let err = executor.execute(&video).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTask(_)));
    }

    #[test]
    fn construction_succeeds_with_fallback_config() {
        let config = BackendConfig {
            api_url: "https://example.com".to_string(),
            api_key: "k".to_string(),
            model: "m".to_string(),
        };
        assert!(ImageExecutor::new(config, None).is_ok());
        let _ = image_task(None);
    }
}
