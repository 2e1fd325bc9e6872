//! Tool catalogue
//!
//! Binds the provider-backed handlers to tool names and input schemas.
//!
//! # Browser profile
//! - `playwright_navigate`, `playwright_screenshot`, `playwright_click`,
//!   `playwright_fill`, `playwright_select`, `playwright_hover`,
//!   `playwright_evaluate`
//! - `extract_selector_by_page_content` (needs a chat provider)
//! - `fetch_jira_story` (needs a ticket tracker)
//!
//! # Karate profile
//! - `run_karate_test`, `list_karate_features`, `get_test_results`

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use orch_dispatch::{
    HandlerResult, InputSchema, ParamKind, ToolDescriptor, ToolHandler, ToolRegistry, handler_fn,
};
use orch_providers::{
    AzureOpenAiClient, BrowserProvider, ChatCompletion, JiraClient, KarateRunner, Settings,
    TestRunner, TicketTracker, WebDriverBrowser,
};
use serde_json::{Map, Value};

use crate::Result;
use crate::handlers;

/// Tool names shared by the server and the bridge workflow
pub mod names {
    pub const NAVIGATE: &str = "playwright_navigate";
    pub const SCREENSHOT: &str = "playwright_screenshot";
    pub const CLICK: &str = "playwright_click";
    pub const FILL: &str = "playwright_fill";
    pub const SELECT: &str = "playwright_select";
    pub const HOVER: &str = "playwright_hover";
    pub const EVALUATE: &str = "playwright_evaluate";
    pub const EXTRACT_SELECTOR: &str = "extract_selector_by_page_content";
    pub const FETCH_JIRA_STORY: &str = "fetch_jira_story";
    pub const RUN_KARATE_TEST: &str = "run_karate_test";
    pub const LIST_KARATE_FEATURES: &str = "list_karate_features";
    pub const GET_TEST_RESULTS: &str = "get_test_results";
}

/// Dispatcher timeout for navigation, which carries its own page-load timeout
const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(90);

/// Slack between the Maven process timeout and the dispatcher timeout
const KARATE_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Which tool set a server exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Browser automation tools
    Browser,
    /// Karate test runner tools
    Karate,
    /// Both tool sets
    #[default]
    All,
}

impl Profile {
    pub fn includes_browser(&self) -> bool {
        matches!(self, Self::Browser | Self::All)
    }

    pub fn includes_karate(&self) -> bool {
        matches!(self, Self::Karate | Self::All)
    }
}

/// Providers the catalogue binds tools to; absent providers leave their
/// tools unregistered
#[derive(Clone, Default)]
pub struct Providers {
    pub browser: Option<Arc<dyn BrowserProvider>>,
    pub runner: Option<Arc<dyn TestRunner>>,
    pub tracker: Option<Arc<dyn TicketTracker>>,
    pub chat: Option<Arc<dyn ChatCompletion>>,
}

impl Providers {
    /// Real providers for `profile`, built from settings
    ///
    /// The tracker and chat provider are only created when their settings
    /// are complete.
    pub fn from_settings(settings: &Settings, profile: Profile) -> Self {
        let mut providers = Self::default();

        if profile.includes_browser() {
            providers.browser = Some(Arc::new(WebDriverBrowser::new(settings.browser.clone())));
            providers.tracker = settings
                .jira()
                .map(|config| Arc::new(JiraClient::new(config)) as Arc<dyn TicketTracker>);
            providers.chat = settings
                .llm()
                .map(|config| Arc::new(AzureOpenAiClient::new(config)) as Arc<dyn ChatCompletion>);
        }
        if profile.includes_karate() {
            providers.runner = Some(Arc::new(KarateRunner::new(settings.karate.clone())));
        }

        providers
    }

    /// Release whatever the providers started; failures are only logged
    pub async fn shutdown(&self) {
        if let Some(browser) = &self.browser {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "Failed to close browser");
            }
        }
    }
}

/// Build the registry for `profile` from settings
pub fn build_registry(settings: &Settings, profile: Profile) -> Result<Arc<ToolRegistry>> {
    build_registry_with(&Providers::from_settings(settings, profile), settings)
}

/// Build a registry from explicit providers
pub fn build_registry_with(providers: &Providers, settings: &Settings) -> Result<Arc<ToolRegistry>> {
    let registry = Arc::new(ToolRegistry::new());
    let catalogue = Catalogue {
        registry: &registry,
        settings,
    };

    if let Some(browser) = &providers.browser {
        catalogue.browser_tools(browser)?;
        if let Some(chat) = &providers.chat {
            catalogue.extract_selector_tool(browser, chat)?;
        }
    }
    if let Some(tracker) = &providers.tracker {
        catalogue.jira_tool(tracker)?;
    }
    if let Some(runner) = &providers.runner {
        catalogue.karate_tools(runner)?;
    }

    tracing::info!(tools = registry.len(), "Tool catalogue ready");
    Ok(registry)
}

/// Bind a provider-taking handler function to one provider instance
fn bind<P, F, Fut>(provider: &Arc<P>, f: F) -> Arc<dyn ToolHandler>
where
    P: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<P>, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let provider = Arc::clone(provider);
    handler_fn(move |arguments| f(Arc::clone(&provider), arguments))
}

struct Catalogue<'a> {
    registry: &'a ToolRegistry,
    settings: &'a Settings,
}

impl Catalogue<'_> {
    /// Register with the configured per-tool timeout, falling back to `builtin`
    fn add(
        &self,
        descriptor: ToolDescriptor,
        builtin: Option<Duration>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        let timeout = self.settings.dispatch.timeout_for(&descriptor.name).or(builtin);
        let descriptor = match timeout {
            Some(timeout) => descriptor.with_timeout(timeout),
            None => descriptor,
        };
        self.registry.register(descriptor, handler)?;
        Ok(())
    }

    fn browser_tools(&self, browser: &Arc<dyn BrowserProvider>) -> Result<()> {
        self.add(
            ToolDescriptor::new(
                names::NAVIGATE,
                "Navigate to a URL",
                InputSchema::new()
                    .required("url", ParamKind::String, "URL to navigate to")
                    .optional("timeout", ParamKind::unsigned(), "Navigation timeout in milliseconds")
                    .optional(
                        "wait_until",
                        ParamKind::one_of(["load", "networkidle"]),
                        "Page state to wait for",
                    ),
            ),
            Some(NAVIGATE_TIMEOUT),
            bind(browser, handlers::handle_navigate),
        )?;

        let screenshots_dir: PathBuf = self.settings.browser.screenshots_dir.clone();
        self.add(
            ToolDescriptor::new(
                names::SCREENSHOT,
                "Take a screenshot of the current page or a specific element",
                InputSchema::new()
                    .required("name", ParamKind::String, "Name for the screenshot file")
                    .optional("selector", ParamKind::String, "CSS selector of the element to capture")
                    .optional("width", ParamKind::unsigned_u32(), "Viewport width in pixels")
                    .optional("height", ParamKind::unsigned_u32(), "Viewport height in pixels"),
            ),
            None,
            bind(browser, move |browser, arguments| {
                handlers::handle_screenshot(browser, screenshots_dir.clone(), arguments)
            }),
        )?;

        self.add(
            ToolDescriptor::new(
                names::CLICK,
                "Click an element on the page",
                InputSchema::new().required("selector", ParamKind::String, "CSS selector"),
            ),
            None,
            bind(browser, handlers::handle_click),
        )?;

        self.add(
            ToolDescriptor::new(
                names::FILL,
                "Fill out an input field",
                InputSchema::new()
                    .required("selector", ParamKind::String, "CSS selector of the input")
                    .required("value", ParamKind::String, "Value to fill"),
            ),
            None,
            bind(browser, handlers::handle_fill),
        )?;

        self.add(
            ToolDescriptor::new(
                names::SELECT,
                "Select an option in a SELECT element",
                InputSchema::new()
                    .required("selector", ParamKind::String, "CSS selector of the select element")
                    .required("value", ParamKind::String, "Option value to select"),
            ),
            None,
            bind(browser, handlers::handle_select),
        )?;

        self.add(
            ToolDescriptor::new(
                names::HOVER,
                "Hover over an element on the page",
                InputSchema::new().required("selector", ParamKind::String, "CSS selector"),
            ),
            None,
            bind(browser, handlers::handle_hover),
        )?;

        self.add(
            ToolDescriptor::new(
                names::EVALUATE,
                "Execute JavaScript in the browser console",
                InputSchema::new().required("script", ParamKind::String, "JavaScript to execute"),
            ),
            None,
            bind(browser, handlers::handle_evaluate),
        )
    }

    fn extract_selector_tool(
        &self,
        browser: &Arc<dyn BrowserProvider>,
        chat: &Arc<dyn ChatCompletion>,
    ) -> Result<()> {
        let chat = Arc::clone(chat);
        self.add(
            ToolDescriptor::new(
                names::EXTRACT_SELECTOR,
                "Find the CSS selector on the current page that matches a description",
                InputSchema::new().required(
                    "user_message",
                    ParamKind::String,
                    "Description of the element to find",
                ),
            ),
            None,
            bind(browser, move |browser, arguments| {
                handlers::handle_extract_selector(browser, Arc::clone(&chat), arguments)
            }),
        )
    }

    fn jira_tool(&self, tracker: &Arc<dyn TicketTracker>) -> Result<()> {
        self.add(
            ToolDescriptor::new(
                names::FETCH_JIRA_STORY,
                "Fetch a Jira story by key",
                InputSchema::new().required("jira_key", ParamKind::String, "Issue key, e.g. QA-123"),
            ),
            None,
            bind(tracker, handlers::handle_fetch_jira_story),
        )
    }

    fn karate_tools(&self, runner: &Arc<dyn TestRunner>) -> Result<()> {
        let run_timeout = self.settings.karate.process_timeout() + KARATE_TIMEOUT_SLACK;
        self.add(
            ToolDescriptor::new(
                names::RUN_KARATE_TEST,
                "Run a Karate feature file",
                InputSchema::new()
                    .required(
                        "feature_path",
                        ParamKind::String,
                        "Path of the feature file relative to the features directory",
                    )
                    .optional("tags", ParamKind::String, "Karate tag expression, e.g. @smoke"),
            ),
            Some(run_timeout),
            bind(runner, handlers::handle_run_karate_test),
        )?;

        self.add(
            ToolDescriptor::new(
                names::LIST_KARATE_FEATURES,
                "List available Karate feature files",
                InputSchema::new().optional(
                    "pattern",
                    ParamKind::String,
                    "Glob pattern relative to the features directory",
                ),
            ),
            None,
            bind(runner, handlers::handle_list_karate_features),
        )?;

        self.add(
            ToolDescriptor::new(
                names::GET_TEST_RESULTS,
                "Summarize the most recent Karate test report",
                InputSchema::new().optional(
                    "detailed",
                    ParamKind::Boolean,
                    "Include per-scenario results",
                ),
            ),
            None,
            bind(runner, handlers::handle_get_test_results),
        )
    }
}
