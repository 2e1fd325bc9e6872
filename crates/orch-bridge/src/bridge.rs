//! Chat loop between a completion model and the tool dispatcher
//!
//! Each user turn may take several model rounds: whenever the model asks
//! for tools, every call goes through the same [`Dispatcher`] the MCP
//! server uses, and the resulting envelope is returned to the model as a
//! tool message.

use std::sync::Arc;

use orch_dispatch::{Dispatcher, ToolFailure, ToolRegistry, ToolResult};
use orch_providers::{ChatCompletion, ChatMessage, ToolCallRequest, ToolSpec};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::prompts;

/// Round limit when none is configured
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Model-facing function specs for every registered tool, in registration order
pub fn tool_specs(registry: &ToolRegistry) -> Vec<ToolSpec> {
    registry
        .list()
        .into_iter()
        .map(|descriptor| ToolSpec {
            parameters: descriptor.input_schema.to_json_schema(),
            name: descriptor.name,
            description: descriptor.description,
        })
        .collect()
}

/// A conversation with tool access
pub struct Bridge {
    chat: Arc<dyn ChatCompletion>,
    dispatcher: Dispatcher,
    tools: Vec<ToolSpec>,
    history: Vec<ChatMessage>,
    max_rounds: usize,
}

impl Bridge {
    /// Start a conversation with the browser automation system prompt
    pub fn new(chat: Arc<dyn ChatCompletion>, dispatcher: Dispatcher) -> Self {
        let tools = tool_specs(dispatcher.registry());
        Self {
            chat,
            dispatcher,
            tools,
            history: vec![ChatMessage::system(prompts::browser_automation_system_prompt())],
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Replace the system prompt; clears the conversation
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.history = vec![ChatMessage::system(prompt)];
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Forget everything after the system prompt
    pub fn reset(&mut self) {
        self.history.truncate(1);
    }

    /// Run one user turn to completion and return the model's answer
    ///
    /// # Errors
    ///
    /// Fails when the chat provider fails or when the model is still asking
    /// for tools after `max_rounds` rounds. Tool failures are not errors;
    /// the model sees them as `ok: false` envelopes.
    pub async fn process_message(&mut self, text: &str) -> Result<String> {
        self.history.push(ChatMessage::user(text));

        for round in 1..=self.max_rounds {
            let completion = self.chat.complete(&self.history, &self.tools).await?;
            let calls = completion.tool_calls().to_vec();

            if calls.is_empty() {
                let reply = completion.message.text().to_string();
                self.history.push(completion.message);
                debug!(round, "Model answered");
                return Ok(reply);
            }

            debug!(round, calls = calls.len(), "Model requested tools");
            self.history.push(completion.message);
            for call in &calls {
                let result = self.invoke(call).await;
                self.history
                    .push(ChatMessage::tool(call.id.clone(), result.to_envelope().to_string()));
            }
        }

        Err(Error::MaxRounds {
            rounds: self.max_rounds,
        })
    }

    async fn invoke(&self, call: &ToolCallRequest) -> ToolResult {
        let name = &call.function.name;
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(arguments) => arguments,
                Err(e) => {
                    return ToolResult::Failure(ToolFailure::malformed(format!(
                        "arguments for {name} are not valid JSON: {e}"
                    )));
                }
            }
        };

        info!(tool = %name, "Invoking tool for model");
        self.dispatcher
            .dispatch_value(&json!({ "tool": name, "arguments": arguments }))
            .await
    }
}
