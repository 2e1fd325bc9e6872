//! Tool handlers
//!
//! Each handler takes the provider it drives plus the validated argument
//! object, and returns a JSON payload or a [`HandlerFault`]. Provider
//! errors keep their sub-kind on the way out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use orch_dispatch::{HandlerFault, HandlerResult};
use orch_providers::{
    BrowserProvider, ChatCompletion, ChatMessage, ProviderError, ScreenshotOptions, TestRunner,
    TicketTracker, WaitUntil,
};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Navigation timeout when the caller gives none
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Convert a provider error into a handler fault, keeping its sub-kind
pub fn fault(error: ProviderError) -> HandlerFault {
    HandlerFault::new(error.to_string()).with_sub_kind(error.sub_kind())
}

fn parse_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T, HandlerFault> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| {
        HandlerFault::new(format!("Invalid arguments: {e}")).with_sub_kind("InvalidArguments")
    })
}

fn to_payload<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| fault(e.into()))
}

fn message(text: String) -> HandlerResult {
    Ok(json!({ "message": text }))
}

/// Reduce a screenshot name to `[A-Za-z0-9_-]`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// Browser
// ============================================================================

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    wait_until: Option<WaitUntil>,
}

pub async fn handle_navigate(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: NavigateArgs = parse_args(arguments)?;
    let timeout = Duration::from_millis(args.timeout.unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS));
    let wait_until = args.wait_until.unwrap_or_default();

    let page = browser
        .navigate(&args.url, wait_until, timeout)
        .await
        .map_err(fault)?;

    Ok(json!({
        "message": format!("Navigated to {} with {} wait", args.url, wait_until.as_str()),
        "url": page.url,
        "title": page.title,
    }))
}

#[derive(Debug, Deserialize)]
struct ScreenshotArgs {
    name: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

pub async fn handle_screenshot(
    browser: Arc<dyn BrowserProvider>,
    screenshots_dir: PathBuf,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: ScreenshotArgs = parse_args(arguments)?;
    let file_stem = sanitize_name(&args.name);
    if file_stem.is_empty() {
        return Err(HandlerFault::new("Screenshot name must not be empty")
            .with_sub_kind("InvalidArguments"));
    }

    let viewport = match (args.width, args.height) {
        (None, None) => None,
        (width, height) => Some((width.unwrap_or(800), height.unwrap_or(600))),
    };
    let options = ScreenshotOptions {
        selector: args.selector,
        viewport,
    };
    let path = screenshot_path(&screenshots_dir, &file_stem);

    let bytes = browser.screenshot(&path, &options).await.map_err(fault)?;

    Ok(json!({
        "message": format!("Screenshot '{}' saved to {}", args.name, path.display()),
        "path": path,
        "bytes": bytes,
    }))
}

fn screenshot_path(dir: &Path, file_stem: &str) -> PathBuf {
    dir.join(format!("{file_stem}.png"))
}

#[derive(Debug, Deserialize)]
struct SelectorArgs {
    selector: String,
}

#[derive(Debug, Deserialize)]
struct SelectorValueArgs {
    selector: String,
    value: String,
}

pub async fn handle_click(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: SelectorArgs = parse_args(arguments)?;
    browser.click(&args.selector).await.map_err(fault)?;
    message(format!("Clicked on {}", args.selector))
}

pub async fn handle_fill(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: SelectorValueArgs = parse_args(arguments)?;
    browser.fill(&args.selector, &args.value).await.map_err(fault)?;
    message(format!("Filled {} with {}", args.selector, args.value))
}

pub async fn handle_select(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: SelectorValueArgs = parse_args(arguments)?;
    browser.select(&args.selector, &args.value).await.map_err(fault)?;
    message(format!("Selected {} in {}", args.value, args.selector))
}

pub async fn handle_hover(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: SelectorArgs = parse_args(arguments)?;
    browser.hover(&args.selector).await.map_err(fault)?;
    message(format!("Hovered over {}", args.selector))
}

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    script: String,
}

pub async fn handle_evaluate(
    browser: Arc<dyn BrowserProvider>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: EvaluateArgs = parse_args(arguments)?;
    let evaluation = browser.evaluate(&args.script).await.map_err(fault)?;
    to_payload(&evaluation)
}

#[derive(Debug, Deserialize)]
struct ExtractSelectorArgs {
    user_message: String,
}

/// Prompt asking the model for one CSS selector matching `request`
pub fn selector_prompt(html: &str, request: &str) -> String {
    format!(
        "Given the following HTML content of a web page:\n\n{html}\n\n\
         User request: '{request}'\n\n\
         Provide the CSS selector that best matches the user's request. \
         Return only the CSS selector."
    )
}

/// Strip whitespace, code fences and quotes the model may wrap around a selector
fn clean_selector(reply: &str) -> String {
    reply
        .trim()
        .trim_start_matches("```css")
        .trim_matches('`')
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

pub async fn handle_extract_selector(
    browser: Arc<dyn BrowserProvider>,
    chat: Arc<dyn ChatCompletion>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: ExtractSelectorArgs = parse_args(arguments)?;
    let html = browser.page_content().await.map_err(fault)?;

    let messages = [ChatMessage::user(selector_prompt(&html, &args.user_message))];
    let completion = chat.complete(&messages, &[]).await.map_err(fault)?;

    let selector = clean_selector(completion.message.text());
    if selector.is_empty() {
        return Err(HandlerFault::new("Model returned an empty selector")
            .with_sub_kind("InvalidResponse"));
    }
    tracing::debug!(%selector, "Extracted selector");
    Ok(json!({ "selector": selector }))
}

// ============================================================================
// Ticket tracker
// ============================================================================

#[derive(Debug, Deserialize)]
struct JiraArgs {
    jira_key: String,
}

pub async fn handle_fetch_jira_story(
    tracker: Arc<dyn TicketTracker>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: JiraArgs = parse_args(arguments)?;
    let ticket = tracker.fetch(args.jira_key.trim()).await.map_err(fault)?;
    to_payload(&ticket)
}

// ============================================================================
// Karate
// ============================================================================

#[derive(Debug, Deserialize)]
struct RunArgs {
    feature_path: String,
    #[serde(default)]
    tags: Option<String>,
}

/// Run one feature; a failing Maven run is a `ProcessExitNonZero` fault
/// carrying the full outcome as detail
pub async fn handle_run_karate_test(
    runner: Arc<dyn TestRunner>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: RunArgs = parse_args(arguments)?;
    let tags = args.tags.as_deref().filter(|t| !t.trim().is_empty());
    let outcome = runner.run(&args.feature_path, tags).await.map_err(fault)?;

    if outcome.success {
        return to_payload(&outcome);
    }

    let detail = serde_json::to_value(&outcome).map_err(|e| fault(e.into()))?;
    Err(HandlerFault::new(format!(
        "Karate run of {} failed (exit code {})",
        args.feature_path, outcome.exit_code
    ))
    .with_sub_kind("ProcessExitNonZero")
    .with_detail(detail))
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    pattern: Option<String>,
}

pub async fn handle_list_karate_features(
    runner: Arc<dyn TestRunner>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: ListArgs = parse_args(arguments)?;
    let features = runner
        .list_features(args.pattern.as_deref())
        .await
        .map_err(fault)?;

    Ok(json!({
        "count": features.len(),
        "features": to_payload(&features)?,
    }))
}

#[derive(Debug, Deserialize)]
struct ResultsArgs {
    #[serde(default)]
    detailed: Option<bool>,
}

pub async fn handle_get_test_results(
    runner: Arc<dyn TestRunner>,
    arguments: Map<String, Value>,
) -> HandlerResult {
    let args: ResultsArgs = parse_args(arguments)?;
    let summary = runner.latest_results(args.detailed.unwrap_or(false)).await.map_err(fault)?;
    to_payload(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_providers::RunOutcome;
    use orch_test_utils::{FakeBrowser, FakeChat, FakeRunner, FakeTracker};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[rstest]
    #[case("login page", "login_page")]
    #[case("../etc/passwd", "___etc_passwd")]
    #[case("PROJ-12_screenshot", "PROJ-12_screenshot")]
    #[case("", "")]
    fn sanitize_screenshot_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(name), expected);
    }

    #[rstest]
    #[case("#submit", "#submit")]
    #[case("  button.primary \n", "button.primary")]
    #[case("`#login`", "#login")]
    #[case("```css\ninput[name='q']\n```", "input[name='q']")]
    #[case("\"#nav a\"", "#nav a")]
    fn clean_selector_replies(#[case] reply: &str, #[case] expected: &str) {
        assert_eq!(clean_selector(reply), expected);
    }

    #[tokio::test]
    async fn navigate_reports_wait_mode() {
        let browser = Arc::new(FakeBrowser::new());
        let result = handle_navigate(
            browser.clone(),
            args(json!({"url": "https://example.com", "wait_until": "networkidle"})),
        )
        .await
        .unwrap();

        assert_eq!(
            result["message"],
            "Navigated to https://example.com with networkidle wait"
        );
        assert_eq!(browser.actions(), vec!["navigate https://example.com networkidle"]);
    }

    #[tokio::test]
    async fn click_on_missing_element_keeps_sub_kind() {
        let browser = Arc::new(FakeBrowser::new().missing("#gone"));
        let fault = handle_click(browser, args(json!({"selector": "#gone"})))
            .await
            .unwrap_err();

        assert_eq!(fault.sub_kind.as_deref(), Some("ElementNotFound"));
        assert!(fault.message.contains("no such element"));
    }

    #[tokio::test]
    async fn fill_select_hover_messages() {
        let browser: Arc<dyn BrowserProvider> = Arc::new(FakeBrowser::new());

        let filled = handle_fill(browser.clone(), args(json!({"selector": "#q", "value": "rust"})))
            .await
            .unwrap();
        let selected = handle_select(browser.clone(), args(json!({"selector": "#lang", "value": "en"})))
            .await
            .unwrap();
        let hovered = handle_hover(browser, args(json!({"selector": "#menu"})))
            .await
            .unwrap();

        assert_eq!(filled["message"], "Filled #q with rust");
        assert_eq!(selected["message"], "Selected en in #lang");
        assert_eq!(hovered["message"], "Hovered over #menu");
    }

    #[tokio::test]
    async fn screenshot_writes_sanitized_file() {
        let temp = TempDir::new().unwrap();
        let browser = Arc::new(FakeBrowser::new());

        let result = handle_screenshot(
            browser.clone(),
            temp.path().to_path_buf(),
            args(json!({"name": "home page"})),
        )
        .await
        .unwrap();

        let expected = temp.path().join("home_page.png");
        assert!(expected.exists());
        assert_eq!(result["bytes"], 4);
        assert_eq!(
            browser.actions(),
            vec![format!("screenshot {}", expected.display())]
        );
    }

    #[tokio::test]
    async fn screenshot_rejects_empty_name() {
        let temp = TempDir::new().unwrap();
        let fault = handle_screenshot(
            Arc::new(FakeBrowser::new()),
            temp.path().to_path_buf(),
            args(json!({"name": ""})),
        )
        .await
        .unwrap_err();
        assert_eq!(fault.sub_kind.as_deref(), Some("InvalidArguments"));
    }

    #[tokio::test]
    async fn evaluate_returns_result_and_logs() {
        let browser = Arc::new(FakeBrowser::new().with_evaluate_result(json!(42)));
        let result = handle_evaluate(browser, args(json!({"script": "6 * 7"})))
            .await
            .unwrap();
        assert_eq!(result, json!({"result": 42, "logs": []}));
    }

    #[tokio::test]
    async fn extract_selector_prompts_with_page_html() {
        let browser = Arc::new(FakeBrowser::new().with_html("<button id=\"go\">Go</button>"));
        let chat = Arc::new(FakeChat::new().reply("  #go \n"));

        let result = handle_extract_selector(
            browser,
            chat.clone(),
            args(json!({"user_message": "the go button"})),
        )
        .await
        .unwrap();

        assert_eq!(result, json!({"selector": "#go"}));
        let prompt = chat.requests()[0][0].text().to_string();
        assert!(prompt.contains("<button id=\"go\">Go</button>"));
        assert!(prompt.contains("User request: 'the go button'"));
    }

    #[tokio::test]
    async fn fetch_jira_story_maps_not_found() {
        let tracker = Arc::new(FakeTracker::new().with_ticket("QA-1", "Login", "Navigate to x"));

        let found = handle_fetch_jira_story(tracker.clone(), args(json!({"jira_key": "QA-1"})))
            .await
            .unwrap();
        assert_eq!(found["summary"], "Login");

        let fault = handle_fetch_jira_story(tracker, args(json!({"jira_key": "QA-2"})))
            .await
            .unwrap_err();
        assert_eq!(fault.sub_kind.as_deref(), Some("NotFound"));
    }

    #[tokio::test]
    async fn run_karate_failure_is_process_exit_fault() {
        let runner = Arc::new(FakeRunner::new().with_outcome(RunOutcome {
            success: false,
            exit_code: 1,
            passed: Some(2),
            failed: Some(1),
            report_path: None,
            stdout: "scenarios:  3 | passed:  2 | failed:  1".to_string(),
            stderr: String::new(),
        }));

        let fault = handle_run_karate_test(
            runner.clone(),
            args(json!({"feature_path": "users.feature", "tags": "@smoke"})),
        )
        .await
        .unwrap_err();

        assert_eq!(fault.sub_kind.as_deref(), Some("ProcessExitNonZero"));
        assert_eq!(fault.detail.as_ref().unwrap()["failed"], 1);
        assert_eq!(
            runner.runs(),
            vec![("users.feature".to_string(), Some("@smoke".to_string()))]
        );
    }

    #[tokio::test]
    async fn run_karate_ignores_blank_tags() {
        let runner = Arc::new(FakeRunner::new());
        let result = handle_run_karate_test(
            runner.clone(),
            args(json!({"feature_path": "a.feature", "tags": " "})),
        )
        .await
        .unwrap();

        assert_eq!(result["success"], true);
        assert_eq!(runner.runs(), vec![("a.feature".to_string(), None)]);
    }

    #[tokio::test]
    async fn list_features_counts() {
        let runner = Arc::new(
            FakeRunner::new()
                .with_feature("users.feature", &["get user"])
                .with_feature("orders/list.feature", &["list", "page"]),
        );
        let result = handle_list_karate_features(runner, Map::new()).await.unwrap();

        assert_eq!(result["count"], 2);
        assert_eq!(result["features"][1]["name"], "list");
    }

    #[tokio::test]
    async fn results_include_details_on_request() {
        let runner = Arc::new(FakeRunner::new());
        let brief = handle_get_test_results(runner.clone(), Map::new()).await.unwrap();
        let detailed = handle_get_test_results(runner, args(json!({"detailed": true})))
            .await
            .unwrap();

        assert!(brief.get("detailed_results").is_none());
        assert_eq!(detailed["detailed_results"], json!([]));
    }
}
