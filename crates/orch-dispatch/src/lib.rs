//! Tool dispatch core for the test orchestrator
//!
//! This crate holds the one piece both orchestrator servers share: a registry
//! of named tools and a dispatcher that turns a raw request into exactly one
//! response envelope.
//!
//! # Architecture
//!
//! ```text
//! [ transport (stdio JSON lines / MCP) ]
//!        | { tool, arguments }
//!        v
//! [ Dispatcher ] --parse--> ToolCall
//!        |        --resolve--> ToolRegistry
//!        |        --validate--> InputSchema
//!        |        --invoke (timeout)--> ToolHandler --> provider
//!        v
//! [ ToolResult ] --> { ok: true, result } | { ok: false, error }
//! ```
//!
//! Every failure the dispatcher can observe is reported as data with one of
//! the [`ErrorKind`] values; nothing a handler does can abort the request loop.

pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod schema;
pub mod tool;

pub use dispatcher::{DEFAULT_TIMEOUT, Dispatcher};
pub use envelope::{Envelope, ErrorKind, ToolFailure, ToolResult};
pub use error::{RegistryError, Result};
pub use registry::ToolRegistry;
pub use schema::{InputSchema, ParamKind, ParamSpec, SchemaViolation};
pub use tool::{HandlerFault, HandlerResult, ToolCall, ToolDescriptor, ToolHandler, handler_fn};
