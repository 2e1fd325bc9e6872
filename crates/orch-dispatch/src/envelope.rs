//! Response envelope
//!
//! Every dispatched request produces one [`ToolResult`], which serializes to
//! one of two shapes:
//!
//! ```text
//! { "ok": true,  "result": <payload> }
//! { "ok": false, "error": { "kind": "...", "message": "...", "subKind"?: "...", "detail"?: ... } }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaViolation;
use crate::tool::HandlerFault;

/// Failure kinds reported at the dispatcher boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedRequest,
    UnknownTool,
    InvalidArguments,
    HandlerError,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "MalformedRequest",
            Self::UnknownTool => "UnknownTool",
            Self::InvalidArguments => "InvalidArguments",
            Self::HandlerError => "HandlerError",
            Self::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ToolFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sub_kind: None,
            detail: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRequest, message)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: {name}"))
    }

    pub fn invalid_arguments(tool: &str, violation: &SchemaViolation) -> Self {
        let mut failure = Self::new(
            ErrorKind::InvalidArguments,
            format!("invalid arguments for {tool}: {violation}"),
        );
        failure.detail = Some(serde_json::json!({ "field": violation.field() }));
        failure
    }

    pub fn handler(fault: HandlerFault) -> Self {
        Self {
            kind: ErrorKind::HandlerError,
            message: fault.message,
            sub_kind: fault.sub_kind,
            detail: fault.detail,
        }
    }

    pub fn timeout(tool: &str, after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("tool {tool} timed out after {} ms", after.as_millis()),
        )
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_kind {
            Some(sub_kind) => write!(f, "{} ({}): {}", self.kind, sub_kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Outcome of one tool call: a success payload or a failure record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Envelope", from = "Envelope")]
pub enum ToolResult {
    Success(Value),
    Failure(ToolFailure),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Failure kind, if this is a failure
    pub fn kind(&self) -> Option<ErrorKind> {
        self.failure().map(|f| f.kind)
    }

    pub fn into_result(self) -> std::result::Result<Value, ToolFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// The envelope as a JSON value
    pub fn to_envelope(&self) -> Value {
        serde_json::to_value(Envelope::from(self.clone())).unwrap_or(Value::Null)
    }
}

/// Wire form of a [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl From<ToolResult> for Envelope {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Success(value) => Self {
                ok: true,
                result: Some(value),
                error: None,
            },
            ToolResult::Failure(failure) => Self {
                ok: false,
                result: None,
                error: Some(failure),
            },
        }
    }
}

impl From<Envelope> for ToolResult {
    fn from(envelope: Envelope) -> Self {
        match (envelope.ok, envelope.error) {
            (true, _) => Self::Success(envelope.result.unwrap_or(Value::Null)),
            (false, Some(failure)) => Self::Failure(failure),
            (false, None) => Self::Failure(ToolFailure::malformed(
                "failure envelope without an error record",
            )),
        }
    }
}
