use thiserror::Error;

#[derive(Error, Debug)]
pub enum PsychoHistoryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PsychoHistoryError>;
