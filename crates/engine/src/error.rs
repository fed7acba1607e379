use reconcile_core::CoreError;
use reconcile_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid operations {0:?}")]
    InvalidOperation(Vec<String>),

    #[error("missing configuration option: {0}")]
    MissingOption(String),

    #[error("invalid value for `{name}`: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("must provide `op` param, e.g. op=update:key1,key2")]
    MissingOperation,

    #[error("unknown operation `{0}`, expected one of: create, update, upsert, delete")]
    UnknownOperation(String),

    #[error("missing op params for `{0}` operation")]
    MissingOpParams(String),

    #[error("{0}")]
    EmptyQuery(String),
}

impl EngineError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidOption {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Defects of the run's configuration, as opposed to failures of one
    /// record. These are never worth retrying or skipping past.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidOperation(_)
                | EngineError::MissingOption(_)
                | EngineError::InvalidOption { .. }
                | EngineError::MissingOperation
                | EngineError::UnknownOperation(_)
                | EngineError::MissingOpParams(_)
        )
    }
}
