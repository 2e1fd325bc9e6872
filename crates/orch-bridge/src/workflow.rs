//! Ticket-driven browser workflow
//!
//! Fetches a Jira ticket, splits its description into instructions, opens
//! the first URL it mentions and then works through the instructions,
//! either by asking the model (when a [`Bridge`] is attached) or with a
//! small set of built-in rules.

use std::sync::LazyLock;

use orch_dispatch::{Dispatcher, ToolResult};
use orch_mcp::names;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::prompts;

static URL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"https?://\S+").ok());

/// Characters that end a URL embedded in ticket markup
const URL_TERMINATORS: &[char] = &['"', '\'', ')', ']', '}', ',', ';', '|', '\\'];

/// Split a ticket description into instruction lines
///
/// Lines are separated by real or escaped (`\r\n` as text) line breaks.
/// Heading markers and non-breaking spaces are removed, `Navigate to [url]`
/// loses its brackets and blank lines are dropped.
pub fn parse_steps(description: &str) -> Vec<String> {
    description
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .split('\n')
        .filter_map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix("# ")
                .or_else(|| line.strip_prefix('#'))
                .unwrap_or(line);
            let line = line.replace("\\xa0", " ").replace('\u{a0}', " ");
            let mut line = line.trim().to_string();

            if line.starts_with("Navigate to [") && line.ends_with(']') {
                line = line
                    .replacen("Navigate to [", "Navigate to ", 1)
                    .trim_end_matches(']')
                    .to_string();
            }

            (!line.is_empty()).then_some(line)
        })
        .collect()
}

/// First `http(s)://` URL in `text`, cut at the first markup terminator
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL_RE.as_ref()?.find(text)?.as_str();
    let url = found.split(URL_TERMINATORS).next().unwrap_or(found);
    (!url.ends_with("://")).then(|| url.to_string())
}

/// What a rule-driven run does with one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Screenshot,
    Click { target: String },
    Verify { target: String },
    Navigate { url: String },
    Unsupported,
}

impl Instruction {
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("take a screenshot") || lower.contains("take the screenshot") {
            Self::Screenshot
        } else if lower.contains("click") {
            click_target(text)
                .map(|target| Self::Click { target })
                .unwrap_or(Self::Unsupported)
        } else if lower.contains("check for") {
            Self::Verify {
                target: verification_target(text),
            }
        } else if lower.contains("navigate to") {
            extract_url(text)
                .map(|url| Self::Navigate { url })
                .unwrap_or(Self::Unsupported)
        } else {
            Self::Unsupported
        }
    }
}

fn click_target(instruction: &str) -> Option<String> {
    let lower = instruction.to_lowercase();
    let known = [
        ("sign in", "sign in button"),
        ("microsoft account", "Microsoft Account button"),
        ("login", "login button"),
        ("submit", "submit button"),
    ];
    if let Some((_, target)) = known.iter().find(|(needle, _)| lower.contains(needle)) {
        return Some(target.to_string());
    }

    if let Some((_, rest)) = lower.split_once("click on") {
        let rest = rest.trim();
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
    }

    instruction
        .split_whitespace()
        .find(|word| {
            let word = word.to_lowercase();
            ["button", "link", "tab", "menu"].iter().any(|w| word.contains(w))
        })
        .map(str::to_string)
}

fn verification_target(instruction: &str) -> String {
    let lower = instruction.to_lowercase();
    match lower.split_once("check for") {
        Some((_, rest)) => {
            let rest = rest.trim();
            rest.split(" and then")
                .next()
                .and_then(|r| r.split(" then").next())
                .unwrap_or(rest)
                .trim()
                .to_string()
        }
        None => instruction.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// One recorded action of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub tool: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl StepRecord {
    fn new(tool: &str, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            status,
            message: message.into(),
            instruction: None,
        }
    }

    fn for_instruction(mut self, instruction: &str) -> Self {
        self.instruction = Some(instruction.to_string());
        self
    }

    fn from_result(tool: &str, result: &ToolResult) -> Self {
        match result {
            ToolResult::Success(payload) => {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string());
                Self::new(tool, StepStatus::Success, message)
            }
            ToolResult::Failure(failure) => Self::new(tool, StepStatus::Failed, failure.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

/// Result of a ticket workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub jira_key: String,
    pub status: WorkflowStatus,
    pub description: String,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowReport {
    fn new(jira_key: &str) -> Self {
        Self {
            jira_key: jira_key.to_string(),
            status: WorkflowStatus::Completed,
            description: String::new(),
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Runs a ticket through the browser tools
pub struct JiraWorkflow {
    dispatcher: Dispatcher,
    bridge: Option<Bridge>,
    use_rules: bool,
}

impl JiraWorkflow {
    /// Workflow that interprets instructions with built-in rules
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            bridge: None,
            use_rules: true,
        }
    }

    /// Hand every instruction to the model instead of the built-in rules
    pub fn with_bridge(mut self, bridge: Bridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Record instructions as skipped instead of interpreting them
    pub fn without_rules(mut self) -> Self {
        self.use_rules = false;
        self
    }

    async fn call(&self, tool: &str, arguments: Value) -> ToolResult {
        self.dispatcher
            .dispatch_value(&json!({ "tool": tool, "arguments": arguments }))
            .await
    }

    pub async fn run(&mut self, jira_key: &str) -> WorkflowReport {
        let mut report = WorkflowReport::new(jira_key);
        info!(jira_key, "Starting ticket workflow");

        let fetched = self
            .call(names::FETCH_JIRA_STORY, json!({ "jira_key": jira_key }))
            .await;
        let ticket = match fetched {
            ToolResult::Success(ticket) => ticket,
            ToolResult::Failure(failure) => {
                warn!(jira_key, error = %failure, "Could not fetch ticket");
                report.steps.push(StepRecord::new(
                    names::FETCH_JIRA_STORY,
                    StepStatus::Failed,
                    failure.to_string(),
                ));
                report.status = WorkflowStatus::Failed;
                report.error = Some(failure.message);
                return report;
            }
        };

        report.description = ticket
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let summary = ticket.get("summary").and_then(Value::as_str).unwrap_or_default();
        report.steps.push(StepRecord::new(
            names::FETCH_JIRA_STORY,
            StepStatus::Success,
            format!("Fetched {jira_key}: {summary}"),
        ));

        let instructions = parse_steps(&report.description);
        info!(jira_key, instructions = instructions.len(), "Parsed ticket description");

        let Some(url) = extract_url(&report.description) else {
            warn!(jira_key, "No URL found in ticket description");
            report.steps.push(StepRecord::new(
                "url_extraction",
                StepStatus::Failed,
                "No URL found in Jira description",
            ));
            return report;
        };

        let navigated = self.call(names::NAVIGATE, json!({ "url": url })).await;
        report
            .steps
            .push(StepRecord::from_result(names::NAVIGATE, &navigated));

        let shot = self
            .call(names::SCREENSHOT, json!({ "name": format!("{jira_key}_screenshot") }))
            .await;
        report
            .steps
            .push(StepRecord::from_result(names::SCREENSHOT, &shot));

        for (index, instruction) in instructions.iter().enumerate() {
            let step = self.perform(jira_key, index + 1, instruction).await;
            report.steps.push(step.for_instruction(instruction));
        }

        info!(
            jira_key,
            succeeded = report.count(StepStatus::Success),
            failed = report.count(StepStatus::Failed),
            "Ticket workflow finished"
        );
        report
    }

    async fn perform(&mut self, jira_key: &str, number: usize, instruction: &str) -> StepRecord {
        if let Some(bridge) = self.bridge.as_mut() {
            let prompt = prompts::instruction_prompt(jira_key, instruction);
            return match bridge.process_message(&prompt).await {
                Ok(reply) => StepRecord::new("llm", StepStatus::Success, reply),
                Err(e) => StepRecord::new("llm", StepStatus::Failed, e.to_string()),
            };
        }

        if !self.use_rules {
            return StepRecord::new("instruction", StepStatus::Skipped, "No model attached");
        }

        match Instruction::classify(instruction) {
            Instruction::Screenshot => {
                let name = format!("step_{number}_screenshot");
                let result = self.call(names::SCREENSHOT, json!({ "name": name })).await;
                StepRecord::from_result(names::SCREENSHOT, &result)
            }
            Instruction::Verify { target } => {
                let name = format!("verification_step_{number}");
                let result = self.call(names::SCREENSHOT, json!({ "name": name })).await;
                let mut step = StepRecord::from_result(names::SCREENSHOT, &result);
                if step.status == StepStatus::Success {
                    step.message = format!("Captured {name} to check for {target}");
                }
                step
            }
            Instruction::Navigate { url } => {
                let result = self.call(names::NAVIGATE, json!({ "url": url })).await;
                StepRecord::from_result(names::NAVIGATE, &result)
            }
            Instruction::Click { target } => self.click(&target).await,
            Instruction::Unsupported => StepRecord::new(
                "instruction",
                StepStatus::Skipped,
                "No rule matches this instruction",
            ),
        }
    }

    async fn click(&self, target: &str) -> StepRecord {
        let found = self
            .call(
                names::EXTRACT_SELECTOR,
                json!({ "user_message": format!("find the {target}") }),
            )
            .await;

        let selector = match &found {
            ToolResult::Success(payload) => payload.get("selector").and_then(Value::as_str),
            ToolResult::Failure(_) => None,
        };
        let Some(selector) = selector else {
            let mut step = StepRecord::from_result(names::EXTRACT_SELECTOR, &found);
            step.status = StepStatus::Failed;
            step.message = format!("Could not find element to click: {target} ({})", step.message);
            return step;
        };

        let clicked = self.call(names::CLICK, json!({ "selector": selector })).await;
        StepRecord::from_result(names::CLICK, &clicked)
    }
}
