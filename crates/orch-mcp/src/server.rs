//! MCP Server implementation
//!
//! Reads one JSON message per line and writes one response line per
//! request. A line carrying `"jsonrpc"` is handled as MCP JSON-RPC 2.0;
//! anything else is a bare envelope request (`{ tool, arguments }` or
//! `{ method: "tools/list" }`). Both paths end in the same [`Dispatcher`].

use orch_dispatch::{Dispatcher, ToolFailure, ToolResult};
use orch_providers::Settings;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{
    CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    PROTOCOL_VERSION, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, codes,
};
use crate::tools::{Profile, build_registry};
use crate::{Error, Result};

/// MCP server over one dispatcher
///
/// # Example
///
/// ```ignore
/// use orch_mcp::{McpServer, Profile};
/// use orch_providers::Settings;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = McpServer::from_settings(&Settings::default(), Profile::All)?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct McpServer {
    dispatcher: Dispatcher,
    name: String,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            name: "orch-mcp".to_string(),
        }
    }

    /// Build the catalogue for `profile` and wrap it in a server
    pub fn from_settings(settings: &Settings, profile: Profile) -> Result<Self> {
        let registry = build_registry(settings, profile)?;
        let dispatcher =
            Dispatcher::new(registry).with_default_timeout(settings.dispatch.default_timeout());
        Ok(Self::new(dispatcher))
    }

    /// Name reported in `serverInfo`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve stdin/stdout until stdin closes
    pub async fn run(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        tracing::info!(tools = self.dispatcher.registry().len(), "MCP server ready, listening on stdio");
        self.serve(stdin, stdout).await
    }

    /// Serve requests from `reader`, writing responses to `writer`
    ///
    /// Requests are handled strictly one at a time in arrival order. Only a
    /// read or write failure ends the loop.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!(request = %line, "Received message");

            let response = match self.handle_message(line).await {
                Ok(response) => response,
                Err(e) => serde_json::to_string(&JsonRpcResponse::error(
                    None,
                    codes::INTERNAL_ERROR,
                    format!("Internal error: {e}"),
                ))?,
            };
            if response.is_empty() {
                continue;
            }

            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle a single message
    ///
    /// Returns the response line, or an empty string for notifications.
    pub async fn handle_message(&self, message: &str) -> Result<String> {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) if message.contains("\"jsonrpc\"") => {
                return rpc_line(JsonRpcResponse::error(
                    None,
                    codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
            Err(e) => {
                let failure = ToolFailure::malformed(format!("invalid JSON: {e}"));
                return Ok(serde_json::to_string(&ToolResult::Failure(failure))?);
            }
        };

        if value.get("jsonrpc").is_some() {
            return self.handle_rpc(value).await;
        }

        if value.get("method").and_then(Value::as_str) == Some("tools/list") {
            let tools = json!({ "tools": self.dispatcher.list_tools() });
            return Ok(serde_json::to_string(&tools)?);
        }

        let result = self.dispatcher.dispatch_value(&value).await;
        Ok(serde_json::to_string(&result)?)
    }

    async fn handle_rpc(&self, value: Value) -> Result<String> {
        let id = value.get("id").cloned().filter(|id| !id.is_null());
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return rpc_line(JsonRpcResponse::error(
                    id,
                    codes::INVALID_REQUEST,
                    format!("Invalid Request: {e}"),
                ));
            }
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params)?,
            "initialized" | "notifications/initialized" => return Ok(String::new()),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                request.id,
                json!({ "tools": self.dispatcher.list_tools() }),
            ),
            "tools/call" => self.handle_tools_call(request.id, request.params).await?,
            method if request.id.is_none() && method.starts_with("notifications/") => {
                return Ok(String::new());
            }
            method => JsonRpcResponse::error(
                request.id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };

        rpc_line(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Value) -> Result<JsonRpcResponse> {
        if let Ok(params) = serde_json::from_value::<InitializeParams>(params) {
            tracing::info!(
                client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
                protocol = %params.protocol_version,
                "Client connected"
            );
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::success(id, serde_json::to_value(result)?))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> Result<JsonRpcResponse> {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return Ok(JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                ));
            }
        };

        let request = json!({ "tool": params.name, "arguments": params.arguments });
        let result = self.dispatcher.dispatch_value(&request).await;
        let call_result = CallToolResult::from(&result);

        Ok(JsonRpcResponse::success(id, serde_json::to_value(call_result)?))
    }
}

fn rpc_line(response: JsonRpcResponse) -> Result<String> {
    serde_json::to_string(&response).map_err(Error::from)
}
