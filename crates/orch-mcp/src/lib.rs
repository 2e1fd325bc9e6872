//! MCP server for the test orchestrator
//!
//! Exposes browser automation and Karate test tools to MCP clients and to
//! plain line-delimited JSON callers.
//!
//! # Architecture
//!
//! ```text
//! [ MCP client / envelope caller ]
//!        | (JSON lines on stdio)
//!        v
//! [ McpServer ] --JSON-RPC or envelope--> [ Dispatcher ]
//!        |
//!        v
//! [ tool catalogue ] --> BrowserProvider | TestRunner | TicketTracker | ChatCompletion
//! ```
//!
//! Tool failures are always answered as data: an `{ ok: false }` envelope
//! on the bare transport, `isError: true` on MCP.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
pub use server::McpServer;
pub use tools::{Profile, Providers, build_registry, build_registry_with, names};
