//! Error types for the bridge

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a bridge turn or a workflow
///
/// Tool failures are not errors here; they are handed back to the model
/// or recorded as failed workflow steps.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Chat provider failure
    #[error(transparent)]
    Provider(#[from] orch_providers::ProviderError),

    /// Settings could not be loaded
    #[error(transparent)]
    Config(#[from] orch_providers::ConfigError),

    /// Tool catalogue could not be built
    #[error(transparent)]
    Catalogue(#[from] orch_mcp::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The model kept requesting tools past the round limit
    #[error("model still requesting tools after {rounds} rounds")]
    MaxRounds { rounds: usize },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl Error {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}
