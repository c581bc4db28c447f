mod cli;
mod config;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{default_lock_timeout, Args, TypeArg};
use config::FileConfig;
use genqueue_executor::{
    generate_worker_id, AudioExecutor, BackendConfig, Executor, ExecutorConfig, ImageExecutor, KindExecutor,
    VideoExecutor,
};
use genqueue_manager::Manager;
use genqueue_model::TaskKind;
use genqueue_store::{SqliteStore, TaskRepository};

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "genqueue-runner exiting with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

fn run() -> Result<()> {
    let args = Args::parse();
    let file_config = FileConfig::load();

    if !args.db.exists() {
        bail!("database file does not exist: {}", args.db.display());
    }

    let heartbeat = file_config.heartbeat.unwrap_or(args.heartbeat);
    let lock_timeout_override = args.lock_timeout.or(file_config.lock_timeout);
    let idle_sleep = file_config.idle_sleep.unwrap_or(args.idle_sleep);
    let settings_file = args.settings_file.clone().or(file_config.settings_file);

    let store: Arc<dyn TaskRepository> =
        Arc::new(SqliteStore::open_existing(&args.db).with_context(|| format!("opening {}", args.db.display()))?);

    let _manager = Manager::new(Arc::clone(&store)).context("running startup recovery sweep")?;

    let worker_id = args.worker_id.clone().unwrap_or_else(generate_worker_id);
    let fallback = BackendConfig {
        api_url: args.api_url.clone(),
        api_key: args.api_key.clone(),
        model: args.model.clone().unwrap_or_default(),
    };

    let kinds = match args.r#type {
        TypeArg::Image => vec![TaskKind::Image],
        TypeArg::Video => vec![TaskKind::Video],
        TypeArg::Audio => vec![TaskKind::Audio],
        TypeArg::All => vec![TaskKind::Image, TaskKind::Video, TaskKind::Audio],
    };

    let mut stop_flags = Vec::new();
    let mut handles = Vec::new();

    for kind in kinds {
        let lock_timeout = lock_timeout_override.unwrap_or_else(|| default_lock_timeout(kind));
        let config = ExecutorConfig {
            worker_id: worker_id.clone(),
            heartbeat_interval_seconds: heartbeat,
            lock_timeout_seconds: lock_timeout,
            idle_sleep: Duration::from_secs_f64(idle_sleep.max(0.0)),
            current_project_id: None,
        };

        let store = Arc::clone(&store);
        let fallback = fallback.clone();
        let settings_file = settings_file.clone();

        match kind {
            TaskKind::Image => {
                let executor = Arc::new(Executor::new(store, ImageExecutor::new(fallback, settings_file)?, config));
                let stoppable: Arc<dyn StoppableExecutor> = Arc::clone(&executor);
                stop_flags.push(stoppable);
                handles.push(thread::spawn(move || executor.run_loop()));
            }
            TaskKind::Video => {
                let executor = Arc::new(Executor::new(store, VideoExecutor::new(fallback, settings_file)?, config));
                let stoppable: Arc<dyn StoppableExecutor> = Arc::clone(&executor);
                stop_flags.push(stoppable);
                handles.push(thread::spawn(move || executor.run_loop()));
            }
            TaskKind::Audio => {
                let executor = Arc::new(Executor::new(store, AudioExecutor::new(fallback, settings_file)?, config));
                let stoppable: Arc<dyn StoppableExecutor> = Arc::clone(&executor);
                stop_flags.push(stoppable);
                handles.push(thread::spawn(move || executor.run_loop()));
            }
        }
    }

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown_requested);
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::Relaxed);
    })
    .context("installing Ctrl-C handler")?;

    info!(worker_id, "genqueue-runner started, waiting for shutdown signal");
    while !shutdown_requested.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("shutdown signal received, stopping executors");
    for executor in &stop_flags {
        executor.stop();
    }
    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}

/// Lets `main` stop every kind's executor without knowing its concrete `KindExecutor` type.
trait StoppableExecutor: Send + Sync {
    fn stop(&self);
}

impl<K: KindExecutor> StoppableExecutor for Executor<K> {
    fn stop(&self) {
        Executor::stop(self)
    }
}
