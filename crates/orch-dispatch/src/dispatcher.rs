//! Request dispatcher
//!
//! The dispatcher is the single entry point that turns a request into a
//! [`ToolResult`]:
//!
//! 1. parse `{ tool, arguments }` into a [`ToolCall`] (`MalformedRequest`)
//! 2. resolve the tool in the registry (`UnknownTool`)
//! 3. validate arguments against the tool's schema (`InvalidArguments`)
//! 4. invoke the handler under a timeout (`Timeout`)
//! 5. convert handler faults (`HandlerError`)
//!
//! Nothing is retried here. The handler runs on its own task; when the
//! timeout expires that task is aborted, which drops the handler future and
//! everything it owns (child processes are spawned with `kill_on_drop`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::envelope::{ToolFailure, ToolResult};
use crate::registry::ToolRegistry;
use crate::tool::{HandlerFault, ToolCall, ToolDescriptor};

/// Timeout applied to tools that do not declare their own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes tool calls to their handlers
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Tool discovery: all descriptors in registration order
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// Parse a raw `{ tool, arguments }` request
    ///
    /// A missing or `null` `arguments` member is treated as an empty object.
    pub fn parse_request(request: &Value) -> Result<ToolCall, ToolFailure> {
        let Some(obj) = request.as_object() else {
            return Err(ToolFailure::malformed("request must be a JSON object"));
        };

        let name = match obj.get("tool") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(Value::String(_)) => {
                return Err(ToolFailure::malformed("field 'tool' must not be empty"));
            }
            Some(_) => return Err(ToolFailure::malformed("field 'tool' must be a string")),
            None => return Err(ToolFailure::malformed("missing field 'tool'")),
        };

        let arguments = match obj.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(_) => {
                return Err(ToolFailure::malformed(
                    "field 'arguments' must be a JSON object",
                ));
            }
        };

        Ok(ToolCall::new(name, arguments))
    }

    /// Parse and dispatch a raw request
    pub async fn dispatch_value(&self, request: &Value) -> ToolResult {
        match Self::parse_request(request) {
            Ok(call) => self.dispatch(call).await,
            Err(failure) => {
                warn!(error = %failure.message, "Malformed tool request");
                ToolResult::Failure(failure)
            }
        }
    }

    /// Dispatch a parsed call
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let ToolCall { name, arguments } = call;

        let (descriptor, handler) = match self.registry.lookup(&name) {
            Ok(entry) => entry,
            Err(_) => {
                warn!(tool = %name, "Unknown tool requested");
                return ToolResult::Failure(ToolFailure::unknown_tool(&name));
            }
        };

        if let Err(violation) = descriptor.input_schema.validate(&arguments) {
            warn!(tool = %name, field = violation.field(), "Invalid tool arguments");
            return ToolResult::Failure(ToolFailure::invalid_arguments(&name, &violation));
        }

        let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        debug!(tool = %name, timeout_ms = timeout.as_millis() as u64, "Invoking tool");

        let mut task = tokio::spawn(async move { handler.call(arguments).await });

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(value))) => ToolResult::Success(value),
            Ok(Ok(Err(fault))) => {
                warn!(tool = %name, error = %fault, sub_kind = ?fault.sub_kind, "Tool failed");
                ToolResult::Failure(ToolFailure::handler(fault))
            }
            Ok(Err(join_error)) => {
                let fault = if join_error.is_panic() {
                    HandlerFault::new(format!("handler for {name} panicked")).with_sub_kind("Panic")
                } else {
                    HandlerFault::new(format!("handler for {name} was cancelled"))
                        .with_sub_kind("Cancelled")
                };
                warn!(tool = %name, error = %fault, "Tool task did not complete");
                ToolResult::Failure(ToolFailure::handler(fault))
            }
            Err(_) => {
                task.abort();
                warn!(tool = %name, timeout_ms = timeout.as_millis() as u64, "Tool timed out");
                ToolResult::Failure(ToolFailure::timeout(&name, timeout))
            }
        };

        debug!(
            tool = %name,
            ok = result.is_success(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ErrorKind;
    use crate::schema::{InputSchema, ParamKind};
    use crate::tool::handler_fn;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_registry(calls: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new(
                    "echo",
                    "Echo text back",
                    InputSchema::new().required("text", ParamKind::String, ""),
                ),
                handler_fn(move |args| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Object(args))
                    }
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[rstest]
    #[case(json!("echo"), "request must be a JSON object")]
    #[case(json!({"arguments": {}}), "missing field 'tool'")]
    #[case(json!({"tool": 7}), "field 'tool' must be a string")]
    #[case(json!({"tool": ""}), "field 'tool' must not be empty")]
    #[case(json!({"tool": "echo", "arguments": [1]}), "field 'arguments' must be a JSON object")]
    fn parse_rejects_malformed(#[case] request: Value, #[case] message: &str) {
        let failure = Dispatcher::parse_request(&request).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::MalformedRequest);
        assert_eq!(failure.message, message);
    }

    #[rstest]
    #[case(json!({"tool": "echo"}))]
    #[case(json!({"tool": "echo", "arguments": null}))]
    fn parse_defaults_arguments(#[case] request: Value) {
        let call = Dispatcher::parse_request(&request).unwrap();
        assert_eq!(call.name, "echo");
        assert!(call.arguments.is_empty());
    }

    #[tokio::test]
    async fn malformed_request_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(echo_registry(Arc::clone(&calls)));

        let result = dispatcher
            .dispatch_value(&json!({"tool": "echo", "arguments": "text=hi"}))
            .await;
        assert_eq!(result.kind(), Some(ErrorKind::MalformedRequest));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_returns_handler_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(echo_registry(Arc::clone(&calls)));

        let result = dispatcher
            .dispatch_value(&json!({"tool": "echo", "arguments": {"text": "hi"}}))
            .await;
        assert_eq!(result, ToolResult::Success(json!({"text": "hi"})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(echo_registry(Arc::clone(&calls)));

        let result = dispatcher
            .dispatch(ToolCall::new("nonexistent", Map::new()))
            .await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::UnknownTool);
        assert!(failure.message.contains("nonexistent"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_skip_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(echo_registry(Arc::clone(&calls)));

        let result = dispatcher.dispatch(ToolCall::new("echo", Map::new())).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::InvalidArguments);
        assert!(failure.message.contains("text"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_fault_becomes_handler_error() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("click", "Click", InputSchema::new()),
                handler_fn(|_| async {
                    Err(HandlerFault::new("element not found").with_sub_kind("BrowserTimeout"))
                }),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let result = dispatcher.dispatch(ToolCall::new("click", Map::new())).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::HandlerError);
        assert_eq!(failure.message, "element not found");
        assert_eq!(failure.sub_kind.as_deref(), Some("BrowserTimeout"));
        assert!(result.payload().is_none());
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("boom", "Panics", InputSchema::new()),
                handler_fn(|_| async { panic!("handler bug") }),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let result = dispatcher.dispatch(ToolCall::new("boom", Map::new())).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::HandlerError);
        assert_eq!(failure.sub_kind.as_deref(), Some("Panic"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("slow", "Sleeps", InputSchema::new()),
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        let dispatcher =
            Dispatcher::new(Arc::new(registry)).with_default_timeout(Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let result = dispatcher.dispatch(ToolCall::new("slow", Map::new())).await;
        assert_eq!(result.kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn descriptor_timeout_overrides_default() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("run", "Long run", InputSchema::new())
                    .with_timeout(Duration::from_secs(300)),
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(json!({"passed": 3}))
                }),
            )
            .unwrap();
        let dispatcher =
            Dispatcher::new(Arc::new(registry)).with_default_timeout(Duration::from_secs(1));

        let result = dispatcher.dispatch(ToolCall::new("run", Map::new())).await;
        assert_eq!(result, ToolResult::Success(json!({"passed": 3})));
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));
        assert_eq!(dispatcher.default_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
    }
}
