use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("collection already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("core error: {0}")]
    Core(#[from] reconcile_core::CoreError),
}
