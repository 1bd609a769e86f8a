use thiserror::Error;

/// Main error type for the trading agent
#[derive(Error, Debug)]
pub enum RlError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Replay errors
    #[error("Insufficient data: replay buffer holds {available} valid transitions")]
    InsufficientData { available: usize },

    // Reward engine errors
    #[error("Reward switch rejected: {0}")]
    RewardSwitch(String),

    // Approximator errors
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Backend error: {0}")]
    Backend(String),

    // Persistence errors
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Checkpoint directory not empty: {0}")]
    CheckpointDirNotEmpty(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RlError {
    /// Build a configuration error from a list of validation failures
    pub fn invalid_config(errors: Vec<String>) -> Self {
        RlError::Configuration(errors.join("; "))
    }
}

/// Result type alias for RlError
pub type Result<T> = std::result::Result<T, RlError>;
