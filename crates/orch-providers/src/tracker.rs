//! Ticket tracker (Jira REST v2)

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{JiraAuthMode, JiraConfig};
use crate::error::{ProviderError, Result};

const SERVICE: &str = "Jira";

/// Issue key (`PROJ-123`) or numeric issue id
static ISSUE_KEY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:[A-Za-z][A-Za-z0-9_]*-\d+|\d+)$").ok());

/// The parts of an issue the workflows consume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    /// Plain-text description; empty when the issue has none
    pub description: String,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    /// The raw `fields` object
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub fields: Value,
}

/// Ticket lookup capability
#[async_trait]
pub trait TicketTracker: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Ticket>;
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    key: String,
    #[serde(default)]
    fields: Value,
}

/// Flatten a description that may be plain text (v2) or an Atlassian
/// document (v3 style rich text)
pub fn description_text(value: &Value) -> String {
    fn walk(node: &Value, out: &mut String) {
        if let Some(text) = node.get("text").and_then(Value::as_str) {
            out.push_str(text);
        }
        if node.get("type").and_then(Value::as_str) == Some("hardBreak") {
            out.push('\n');
        }
        if let Some(children) = node.get("content").and_then(Value::as_array) {
            for child in children {
                walk(child, out);
            }
            if matches!(
                node.get("type").and_then(Value::as_str),
                Some("paragraph" | "heading" | "listItem")
            ) {
                out.push('\n');
            }
        }
    }

    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) => {
            let mut out = String::new();
            walk(value, &mut out);
            out.trim_end().to_string()
        }
        _ => String::new(),
    }
}

/// Jira client authenticating with a bearer token or basic credentials
#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn issue_url(&self, key: &str) -> Result<String> {
        if !ISSUE_KEY_RE.as_ref().is_some_and(|re| re.is_match(key)) {
            return Err(ProviderError::InvalidInput {
                field: "jira_key".to_string(),
                message: format!("'{key}' is not a Jira issue key"),
            });
        }
        Ok(format!("{}/rest/api/2/issue/{}", self.config.base_url, key))
    }
}

#[async_trait]
impl TicketTracker for JiraClient {
    async fn fetch(&self, key: &str) -> Result<Ticket> {
        let url = self.issue_url(key)?;
        debug!(%url, "Fetching Jira issue");

        let request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        let request = match self.config.auth {
            JiraAuthMode::Bearer => request.bearer_auth(&self.config.api_token),
            JiraAuthMode::Basic => request.basic_auth(
                self.config.email.as_deref().unwrap_or_default(),
                Some(&self.config.api_token),
            ),
        };

        let response = request.send().await?;
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Auth {
                    service: SERVICE,
                    status: status.as_u16(),
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::NotFound {
                    what: format!("Jira issue {key}"),
                });
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status {
                    service: SERVICE,
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let issue: IssueResponse = response.json().await?;
        let field_str = |name: &str| {
            issue
                .fields
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let nested_name = |name: &str| {
            issue
                .fields
                .pointer(&format!("/{name}/name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Ticket {
            summary: field_str("summary").unwrap_or_default(),
            description: issue
                .fields
                .get("description")
                .map(description_text)
                .unwrap_or_default(),
            status: nested_name("status"),
            issue_type: nested_name("issuetype"),
            key: issue.key,
            fields: issue.fields,
        })
    }
}
