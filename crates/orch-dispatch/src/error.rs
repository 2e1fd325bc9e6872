//! Error types for the tool registry

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised by [`crate::ToolRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    /// No tool with this name is registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}
