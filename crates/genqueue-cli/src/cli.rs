use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use genqueue_model::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Image,
    Video,
    Audio,
    All,
}

/// Lease duration used when neither the config file nor `--lock-timeout` supplies
/// one. Video encodes run longer than image/audio generations, so it gets a longer
/// default lease.
pub fn default_lock_timeout(kind: TaskKind) -> i64 {
    match kind {
        TaskKind::Video => 120,
        TaskKind::Image | TaskKind::Audio => 60,
    }
}

/// Runs one or more kind-specific executors against a shared task queue database.
#[derive(Debug, Parser)]
#[command(name = "genqueue-runner", version, about)]
pub struct Args {
    /// Path to the SQLite database file. Must already exist.
    #[arg(long)]
    pub db: PathBuf,

    /// Which executor(s) to run.
    #[arg(long, value_enum)]
    pub r#type: TypeArg,

    /// Fallback API URL, used when no settings file resolves one.
    #[arg(long = "api-url")]
    pub api_url: String,

    /// Fallback API key.
    #[arg(long = "api-key")]
    pub api_key: String,

    /// Fallback model name.
    #[arg(long)]
    pub model: Option<String>,

    /// JSON settings file re-read on every claim for hosted/custom back-end config.
    #[arg(long = "settings-file")]
    pub settings_file: Option<PathBuf>,

    /// Worker identity; auto-generated when omitted.
    #[arg(long = "worker-id")]
    pub worker_id: Option<String>,

    #[arg(long, default_value_t = 30)]
    pub heartbeat: u64,

    /// Lease duration in seconds. Defaults to 60 for image/audio and 120 for video
    /// when omitted; use `TypeArg::default_lock_timeout` to resolve the per-kind
    /// default.
    #[arg(long = "lock-timeout")]
    pub lock_timeout: Option<i64>,

    #[arg(long = "idle-sleep", default_value_t = 1.0)]
    pub idle_sleep: f64,
}
