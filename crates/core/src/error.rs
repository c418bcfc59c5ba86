use thiserror::Error;

pub type InsightsResult<T> = Result<T, InsightsError>;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid experiment '{experiment_id}': {reason}")]
    InvalidExperiment {
        experiment_id: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InsightsError {
    pub fn invalid_experiment(experiment_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExperiment {
            experiment_id: experiment_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for InsightsError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
