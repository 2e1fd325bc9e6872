//! Scripted fakes for the provider traits

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use orch_providers::{
    BrowserProvider, ChatCompletion, ChatMessage, Completion, Evaluation, FeatureInfo, PageInfo,
    ProviderError, Result, RunOutcome, ScreenshotOptions, TestRunner, TestSummary, Ticket,
    TicketTracker, ToolCallRequest, ToolSpec, WaitUntil,
};
use serde_json::Value;

/// In-memory browser that records every action
///
/// Actions are recorded as short strings such as `navigate https://a`,
/// `click #go` or `screenshot shots/a.png`. Selectors registered with
/// [`FakeBrowser::missing`] fail with a WebDriver `no such element` error.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    actions: Mutex<Vec<String>>,
    missing: Mutex<Vec<String>>,
    html: Mutex<String>,
    evaluate_result: Mutex<Value>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_html(self, html: &str) -> Self {
        *self.html.lock().unwrap() = html.to_string();
        self
    }

    pub fn with_evaluate_result(self, value: Value) -> Self {
        *self.evaluate_result.lock().unwrap() = value;
        self
    }

    pub fn missing(self, selector: &str) -> Self {
        self.missing.lock().unwrap().push(selector.to_string());
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }

    fn check(&self, selector: &str) -> Result<()> {
        if self.missing.lock().unwrap().iter().any(|s| s == selector) {
            return Err(ProviderError::WebDriver {
                error: "no such element".to_string(),
                message: format!("Unable to locate element: {selector}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserProvider for FakeBrowser {
    async fn navigate(&self, url: &str, wait_until: WaitUntil, _timeout: Duration) -> Result<PageInfo> {
        self.record(format!("navigate {url} {}", wait_until.as_str()));
        Ok(PageInfo {
            url: url.to_string(),
            title: "Fake Page".to_string(),
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.check(selector)?;
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.check(selector)?;
        self.record(format!("fill {selector} {value}"));
        Ok(())
    }

    async fn select(&self, selector: &str, value: &str) -> Result<()> {
        self.check(selector)?;
        self.record(format!("select {selector} {value}"));
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.check(selector)?;
        self.record(format!("hover {selector}"));
        Ok(())
    }

    async fn screenshot(&self, path: &Path, options: &ScreenshotOptions) -> Result<u64> {
        if let Some(selector) = &options.selector {
            self.check(selector)?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let png = [0x89, b'P', b'N', b'G'];
        std::fs::write(path, png)?;
        self.record(format!("screenshot {}", path.display()));
        Ok(png.len() as u64)
    }

    async fn evaluate(&self, script: &str) -> Result<Evaluation> {
        self.record(format!("evaluate {script}"));
        Ok(Evaluation {
            result: self.evaluate_result.lock().unwrap().clone(),
            logs: Vec::new(),
        })
    }

    async fn page_content(&self) -> Result<String> {
        Ok(self.html.lock().unwrap().clone())
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Chat provider that replays scripted completions
///
/// Each call to `complete` pops the next scripted response and records the
/// messages it received. Running out of script is a protocol error.
#[derive(Debug, Default)]
pub struct FakeChat {
    script: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    tools_seen: Mutex<Vec<Vec<String>>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain assistant answer
    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(Completion {
            message: ChatMessage::assistant(text),
            finish_reason: Some("stop".to_string()),
        }))
    }

    /// Queue a turn requesting one tool call
    pub fn call_tool(self, id: &str, name: &str, arguments: &str) -> Self {
        self.push(Ok(Completion {
            message: ChatMessage::assistant_tool_calls(vec![ToolCallRequest::new(
                id, name, arguments,
            )]),
            finish_reason: Some("tool_calls".to_string()),
        }))
    }

    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Err(error))
    }

    fn push(self, item: Result<Completion>) -> Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    /// Message histories received, one per call
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool names offered on each call
    pub fn tools_seen(&self) -> Vec<Vec<String>> {
        self.tools_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.tools_seen
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Protocol("chat script exhausted".to_string())))
    }
}

/// Tracker backed by a map of tickets
#[derive(Debug, Default)]
pub struct FakeTracker {
    tickets: HashMap<String, Ticket>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticket(mut self, key: &str, summary: &str, description: &str) -> Self {
        self.tickets.insert(
            key.to_string(),
            Ticket {
                key: key.to_string(),
                summary: summary.to_string(),
                description: description.to_string(),
                status: Some("Open".to_string()),
                issue_type: Some("Story".to_string()),
                fields: Value::Null,
            },
        );
        self
    }
}

#[async_trait]
impl TicketTracker for FakeTracker {
    async fn fetch(&self, key: &str) -> Result<Ticket> {
        self.tickets
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                what: format!("Jira issue {key}"),
            })
    }
}

/// Runner that returns a canned outcome and records runs
#[derive(Debug)]
pub struct FakeRunner {
    outcome: RunOutcome,
    features: Vec<FeatureInfo>,
    runs: Mutex<Vec<(String, Option<String>)>>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            outcome: RunOutcome {
                success: true,
                exit_code: 0,
                passed: Some(1),
                failed: Some(0),
                report_path: None,
                stdout: "scenarios:  1 | passed:  1 | failed:  0".to_string(),
                stderr: String::new(),
            },
            features: Vec::new(),
            runs: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_feature(mut self, path: &str, scenarios: &[&str]) -> Self {
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        self.features.push(FeatureInfo {
            path: path.to_string(),
            full_path: PathBuf::from("features").join(path),
            name,
            scenarios: scenarios.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// `(feature_path, tags)` of every run
    pub fn runs(&self) -> Vec<(String, Option<String>)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestRunner for FakeRunner {
    async fn run(&self, feature_path: &str, tags: Option<&str>) -> Result<RunOutcome> {
        self.runs
            .lock()
            .unwrap()
            .push((feature_path.to_string(), tags.map(str::to_string)));
        Ok(self.outcome.clone())
    }

    async fn list_features(&self, _pattern: Option<&str>) -> Result<Vec<FeatureInfo>> {
        Ok(self.features.clone())
    }

    async fn latest_results(&self, detailed: bool) -> Result<TestSummary> {
        let passed = self.outcome.passed.unwrap_or(0);
        let failed = self.outcome.failed.unwrap_or(0);
        Ok(TestSummary {
            report: PathBuf::from("karate-reports/fake.json"),
            total_scenarios: passed + failed,
            passed_scenarios: passed,
            failed_scenarios: failed,
            duration_ms: None,
            detailed_results: detailed.then(|| Value::Array(Vec::new())),
        })
    }
}
