use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown task kind: {0}")]
    UnknownKind(String),

    #[error("malformed task reference: {0}")]
    MalformedRef(String),
}
