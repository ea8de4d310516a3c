use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Rule '{id}' not found")]
    RuleNotFound { id: String },

    #[error("Invalid threshold '{name}' = {value} for jurisdiction '{jurisdiction}'")]
    InvalidThreshold {
        jurisdiction: String,
        name: String,
        value: f64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
