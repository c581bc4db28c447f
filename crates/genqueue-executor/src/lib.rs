//! Per-worker claim/heartbeat/execute/release loop, kind-specific generation logic,
//! and the back-end HTTP client for the generative-media task queue.

mod audio_executor;
mod claim;
mod client;
mod emotion;
mod error;
mod executor;
mod heartbeat;
mod image_executor;
mod kind_executor;
mod resolver;
mod settings;
mod video_executor;
mod worker_id;

pub use audio_executor::AudioExecutor;
pub use claim::{claim_task, ProjectIdGetter};
pub use client::{extract_url_from_markdown, GenerationClient};
pub use emotion::build_emotion_vector;
pub use error::ExecutorError;
pub use executor::{Executor, ExecutorConfig};
pub use heartbeat::Heartbeat;
pub use image_executor::ImageExecutor;
pub use kind_executor::{ExecutionOutcome, KindExecutor};
pub use resolver::dependencies_met;
pub use settings::{resolve_backend, ApiMode, BackendConfig, CustomApi, CustomApiEntry, HostedService, Settings};
pub use video_executor::VideoExecutor;
pub use worker_id::generate_worker_id;
