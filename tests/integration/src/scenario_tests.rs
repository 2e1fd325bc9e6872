//! Scenario-based Integration Tests
//!
//! Each scenario wires real crates together with only the outermost
//! dependency faked: a wiremock Jira, a recording browser, a scripted
//! model. Scenarios cover:
//! - Ticket workflow against the Jira REST client
//! - One dispatcher shared by the model bridge and the MCP server
//! - Provider failures surfacing as tagged envelopes

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use orch_bridge::{Bridge, JiraWorkflow, StepStatus, WorkflowStatus};
use orch_dispatch::{Dispatcher, ToolResult};
use orch_mcp::{McpServer, Providers, build_registry_with, names};
use orch_providers::{JiraAuthMode, JiraClient, JiraConfig, Settings};
use orch_test_utils::{FakeBrowser, FakeChat, FakeTracker};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Everything a scenario needs to reach the tools
struct Stack {
    dispatcher: Dispatcher,
    browser: Arc<FakeBrowser>,
    screenshots: TempDir,
}

impl Stack {
    fn build(providers: Providers, browser: Arc<FakeBrowser>) -> Self {
        let screenshots = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.browser.screenshots_dir = screenshots.path().to_path_buf();

        let registry = build_registry_with(&providers, &settings).unwrap();
        Self {
            dispatcher: Dispatcher::new(registry).with_default_timeout(Duration::from_secs(5)),
            browser,
            screenshots,
        }
    }

    /// Browser and tracker wired, selector extraction answered by `chat`
    fn with_tracker(tracker: Arc<dyn orch_providers::TicketTracker>, chat: FakeChat) -> Self {
        let browser = Arc::new(FakeBrowser::new().with_html("<button id=\"login\">Log in</button>"));
        let providers = Providers {
            browser: Some(browser.clone()),
            runner: None,
            tracker: Some(tracker),
            chat: Some(Arc::new(chat)),
        };
        Self::build(providers, browser)
    }

    fn shot(&self, name: &str) -> std::path::PathBuf {
        self.screenshots.path().join(format!("{name}.png"))
    }
}

fn jira_client(server: &MockServer) -> Arc<JiraClient> {
    Arc::new(JiraClient::new(JiraConfig {
        base_url: server.uri(),
        email: None,
        api_token: "pat-123".to_string(),
        auth: JiraAuthMode::Bearer,
    }))
}

fn is_png(path: &Path) -> bool {
    std::fs::read(path)
        .map(|bytes| bytes.starts_with(&[0x89, b'P', b'N', b'G']))
        .unwrap_or(false)
}

// =============================================================================
// Scenario 1: Ticket workflow over Jira REST
// =============================================================================

mod s1_jira_workflow {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn rules_run_ticket_from_jira() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/WEB-12"))
            .and(header("authorization", "Bearer pat-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "WEB-12",
                "fields": {
                    "summary": "Login smoke test",
                    "description": "# Navigate to [https://shop.example.com/login]\r\n\
                                    # Click the login button\r\n\
                                    # Take a screenshot",
                    "status": { "name": "To Do" },
                    "issuetype": { "name": "Story" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stack = Stack::with_tracker(jira_client(&server), FakeChat::new().reply("#login"));
        let report = JiraWorkflow::new(stack.dispatcher.clone()).run("WEB-12").await;

        assert_eq!(report.status, WorkflowStatus::Completed);
        assert_eq!(report.count(StepStatus::Failed), 0);
        assert_eq!(report.steps[0].message, "Fetched WEB-12: Login smoke test");
        assert_eq!(
            stack.browser.actions().first().map(String::as_str),
            Some("navigate https://shop.example.com/login load")
        );
        assert!(stack.browser.actions().contains(&"click #login".to_string()));

        assert!(is_png(&stack.shot("WEB-12_screenshot")));
        assert!(is_png(&stack.shot("step_3_screenshot")));
    }

    #[tokio::test]
    async fn rejected_token_fails_workflow() {
        let server = MockServer::start().await;
        Mock::given(path("/rest/api/2/issue/WEB-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let stack = Stack::with_tracker(jira_client(&server), FakeChat::new());
        let report = JiraWorkflow::new(stack.dispatcher.clone()).run("WEB-1").await;

        assert_eq!(report.status, WorkflowStatus::Failed);
        assert!(report.error.is_some());
        assert!(report.steps[0].message.contains("HandlerError (AuthenticationFailed)"));
        assert!(stack.browser.actions().is_empty());
    }
}

// =============================================================================
// Scenario 2: Bridge and MCP server share one dispatcher
// =============================================================================

mod s2_shared_dispatcher {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn model_sees_same_envelope_as_mcp_client() {
        let tracker = Arc::new(FakeTracker::new().with_ticket("QA-1", "Story", "text"));
        let stack = Stack::with_tracker(tracker, FakeChat::new());
        let server = McpServer::new(stack.dispatcher.clone());

        let arguments = json!({"selector": "#login"});
        let direct = server
            .handle_message(&json!({"tool": names::HOVER, "arguments": arguments}).to_string())
            .await
            .unwrap();
        let direct: Value = serde_json::from_str(&direct).unwrap();

        let model = Arc::new(
            FakeChat::new()
                .call_tool("call_1", names::HOVER, &arguments.to_string())
                .reply("Hovered"),
        );
        let mut bridge = Bridge::new(model.clone(), stack.dispatcher.clone());
        assert_eq!(bridge.process_message("hover the login button").await.unwrap(), "Hovered");

        let fed_back: Value =
            serde_json::from_str(model.requests()[1].last().unwrap().text()).unwrap();
        assert_eq!(fed_back, direct);
        assert_eq!(direct["result"]["message"], "Hovered over #login");
        assert_eq!(
            stack.browser.actions(),
            vec!["hover #login".to_string(), "hover #login".to_string()]
        );
    }

    #[tokio::test]
    async fn model_tool_list_matches_mcp_catalogue() {
        let tracker = Arc::new(FakeTracker::new());
        let stack = Stack::with_tracker(tracker, FakeChat::new());
        let server = McpServer::new(stack.dispatcher.clone());

        let listed: Value = serde_json::from_str(
            &server
                .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
                .await
                .unwrap(),
        )
        .unwrap();
        let mcp_names: Vec<String> = listed["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();

        let bridge = Bridge::new(Arc::new(FakeChat::new()), stack.dispatcher.clone());
        let model_names: Vec<String> = bridge.tools().iter().map(|t| t.name.clone()).collect();

        assert_eq!(model_names, mcp_names);
        assert_eq!(mcp_names.len(), 9);
    }
}

// =============================================================================
// Scenario 3: Provider failures keep their tags
// =============================================================================

mod s3_failure_tags {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn missing_element_is_tagged_through_mcp() {
        let browser = Arc::new(FakeBrowser::new().missing("#gone"));
        let providers = Providers {
            browser: Some(browser.clone()),
            ..Providers::default()
        };
        let stack = Stack::build(providers, browser);
        let server = McpServer::new(stack.dispatcher.clone());

        let response: Value = serde_json::from_str(
            &server
                .handle_message(
                    &json!({
                        "jsonrpc": "2.0",
                        "id": "c-1",
                        "method": "tools/call",
                        "params": {"name": names::CLICK, "arguments": {"selector": "#gone"}}
                    })
                    .to_string(),
                )
                .await
                .unwrap(),
        )
        .unwrap();

        assert_eq!(response["id"], "c-1");
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"]["kind"], "HandlerError");
        assert_eq!(result["structuredContent"]["error"]["subKind"], "ElementNotFound");
        assert!(stack.browser.actions().is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_browser() {
        let browser = Arc::new(FakeBrowser::new());
        let providers = Providers {
            browser: Some(browser.clone()),
            ..Providers::default()
        };
        let stack = Stack::build(providers, browser);

        let result = stack
            .dispatcher
            .dispatch_value(&json!({"tool": names::FILL, "arguments": {"selector": "#q"}}))
            .await;

        match result {
            ToolResult::Failure(failure) => {
                assert_eq!(failure.kind.as_str(), "InvalidArguments");
                assert_eq!(failure.detail, Some(json!({"field": "value"})));
            }
            ToolResult::Success(payload) => panic!("expected failure, got {payload}"),
        }
        assert!(stack.browser.actions().is_empty());
    }
}
