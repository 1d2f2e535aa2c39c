use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input validation failed before any simulation step ran. Carries the
    /// full list of violations, not just the first one found.
    #[error("input validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(violations: Vec<String>) -> Self {
        Error::Validation { violations }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
