use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] genqueue_store::StoreError),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("back-end request failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no API URL configured for this task kind")]
    MissingConfig,
}
