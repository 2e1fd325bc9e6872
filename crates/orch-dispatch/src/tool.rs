//! Tool descriptors, calls and handlers

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::InputSchema;

/// Public description of a registered tool
///
/// Serializes to the `{ name, description, inputSchema }` shape used by
/// tool discovery. The optional timeout overrides the dispatcher default for
/// this tool and is not part of the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            timeout: None,
        }
    }

    /// Use a tool-specific timeout instead of the dispatcher default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One request to invoke a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A fault raised by a handler
///
/// `sub_kind` is a machine-readable tag supplied by the handler, such as
/// `BrowserTimeout`, `ProcessExitNonZero` or `UpstreamHTTPError`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    pub message: String,
    pub sub_kind: Option<String>,
    pub detail: Option<Value>,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sub_kind: None,
            detail: None,
        }
    }

    pub fn with_sub_kind(mut self, sub_kind: impl Into<String>) -> Self {
        self.sub_kind = Some(sub_kind.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Outcome of a handler invocation
pub type HandlerResult = std::result::Result<Value, HandlerFault>;

/// The function bound to a tool name
///
/// Handlers receive arguments that already passed schema validation. They
/// may fail with a [`HandlerFault`]; the dispatcher converts it into the
/// response envelope.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, arguments: Map<String, Value>) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, arguments: Map<String, Value>) -> HandlerResult {
        (self.0)(arguments).await
    }
}

/// Wrap an async closure as a handler
///
/// ```
/// use orch_dispatch::handler_fn;
/// use serde_json::Value;
///
/// let echo = handler_fn(|args| async move { Ok(Value::Object(args)) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
