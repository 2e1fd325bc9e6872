//! Error types for the MCP server

use thiserror::Error;

/// Result type alias for MCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running the server
///
/// Tool failures are never reported through this type; they travel as
/// envelope data. Only setup and transport problems end up here.
#[derive(Debug, Error)]
pub enum Error {
    /// Tool catalogue could not be registered
    #[error("registry error: {0}")]
    Registry(#[from] orch_dispatch::RegistryError),

    /// Provider construction failed
    #[error("provider error: {0}")]
    Provider(#[from] orch_providers::ProviderError),

    /// Settings could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] orch_providers::ConfigError),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument provided
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
