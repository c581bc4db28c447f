use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("the store file was not found at {0}")]
    MissingDatabase(String),

    #[error("record decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// True when the underlying sqlite error is a contended-lock timeout, the one
    /// condition the claim loop retries with back-off rather than propagating.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
        )
    }
}
