//! Providers for the orchestrator tools
//!
//! Each external capability sits behind an async trait so tools can be
//! tested against fakes:
//!
//! | Trait | Implementation | Backend |
//! |-------|----------------|---------|
//! | [`BrowserProvider`] | [`WebDriverBrowser`] | W3C WebDriver endpoint |
//! | [`TestRunner`] | [`KarateRunner`] | `mvn test` + Karate JSON reports |
//! | [`TicketTracker`] | [`JiraClient`] | Jira REST v2 |
//! | [`ChatCompletion`] | [`AzureOpenAiClient`] | Azure OpenAI chat completions |
//!
//! Every [`ProviderError`] carries a [`sub_kind`](ProviderError::sub_kind)
//! tag that tool handlers forward to callers.

pub mod browser;
pub mod chat;
pub mod config;
pub mod error;
pub mod runner;
pub mod tracker;

pub use browser::{
    BrowserProvider, Evaluation, PageInfo, ScreenshotOptions, WaitUntil, WebDriverBrowser,
};
pub use chat::{
    AzureOpenAiClient, ChatCompletion, ChatMessage, Completion, FunctionCall, Role,
    ToolCallRequest, ToolSpec,
};
pub use config::{JiraAuthMode, JiraConfig, LlmConfig, Settings};
pub use error::{ConfigError, ProviderError, Result};
pub use runner::{FeatureInfo, KarateRunner, RunOutcome, TestRunner, TestSummary};
pub use tracker::{JiraClient, Ticket, TicketTracker};
