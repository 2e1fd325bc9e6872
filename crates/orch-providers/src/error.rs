//! Error types for provider operations

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`Settings`](crate::config::Settings)
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable
    #[error("Invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Errors raised by browser, runner, tracker and chat providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with an unexpected status
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Upstream rejected the credentials
    #[error("{service} authentication failed (HTTP {status})")]
    Auth { service: &'static str, status: u16 },

    /// Caller-supplied value the provider refuses to use
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// The requested resource does not exist
    #[error("{what} not found")]
    NotFound { what: String },

    /// Upstream asked us to slow down
    #[error("{service} rate limit exceeded")]
    RateLimited { service: &'static str },

    /// Subprocess exited with non-zero status
    #[error("Command failed (exit code {code}): {stderr}")]
    ProcessExit { code: i32, stderr: String },

    /// An operation ran past its own deadline
    #[error("{operation} timed out after {} s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// WebDriver error payload
    #[error("WebDriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    /// Response did not have the expected shape
    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProviderError {
    /// Machine-readable tag forwarded in `HandlerError` envelopes
    pub fn sub_kind(&self) -> &'static str {
        match self {
            Self::Http(e) if e.is_timeout() => "UpstreamTimeout",
            Self::Http(e) if e.is_connect() => "UpstreamUnreachable",
            Self::Http(_) | Self::Status { .. } => "UpstreamHTTPError",
            Self::Auth { .. } => "AuthenticationFailed",
            Self::InvalidInput { .. } => "InvalidArguments",
            Self::NotFound { .. } => "NotFound",
            Self::RateLimited { .. } => "RateLimited",
            Self::ProcessExit { .. } => "ProcessExitNonZero",
            Self::Timeout { .. } => "ProcessTimeout",
            Self::WebDriver { error, .. } => match error.as_str() {
                "timeout" | "script timeout" => "BrowserTimeout",
                "no such element" | "stale element reference" => "ElementNotFound",
                "javascript error" => "ScriptError",
                "invalid session id" | "session not created" => "BrowserUnavailable",
                _ => "WebDriverError",
            },
            Self::Protocol(_) | Self::Json(_) => "InvalidResponse",
            Self::Io(_) => "IoError",
            Self::Config(_) => "ConfigError",
        }
    }
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
