//! Model-driven front end for the orchestrator tools
//!
//! Two ways of driving the tool catalogue built by `orch-mcp`:
//!
//! - [`Bridge`]: a chat session where a completion model requests tools and
//!   receives their envelopes back as tool messages
//! - [`JiraWorkflow`]: reads a Jira ticket, opens the first URL in its
//!   description and performs each instruction, through the model when one
//!   is configured and with built-in rules otherwise
//!
//! Both go through an [`orch_dispatch::Dispatcher`], so timeouts, argument
//! validation and failure envelopes are identical to the MCP server.

pub mod bridge;
pub mod error;
pub mod prompts;
pub mod workflow;

pub use bridge::{Bridge, DEFAULT_MAX_ROUNDS, tool_specs};
pub use error::{Error, Result};
pub use workflow::{
    Instruction, JiraWorkflow, StepRecord, StepStatus, WorkflowReport, WorkflowStatus,
    extract_url, parse_steps,
};
