//! Settings loading
//!
//! Settings come from an optional TOML file; environment variables then
//! override individual values. Every section is optional and falls back to
//! its defaults, so an empty file (or no file) is valid.
//!
//! ```toml
//! [dispatch]
//! default_timeout_secs = 30
//!
//! [dispatch.tool_timeouts]
//! playwright_navigate = 60
//!
//! [browser]
//! webdriver_url = "http://localhost:4444"
//! browser_name = "chrome"
//!
//! [karate]
//! base_path = "."
//!
//! [jira]
//! base_url = "https://jira.example.com"
//! api_token = "..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_timeout_secs() -> u64 {
    30
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_browser_name() -> String {
    "chrome".to_string()
}

fn default_true() -> bool {
    true
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_implicit_wait_ms() -> u64 {
    5_000
}

fn default_page_load_timeout_ms() -> u64 {
    30_000
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_features_dir() -> PathBuf {
    PathBuf::from("karate-tests/features")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("karate-tests/target/karate-reports")
}

fn default_mvn_command() -> String {
    "mvn".to_string()
}

fn default_process_timeout_secs() -> u64 {
    300
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_max_completion_tokens() -> u32 {
    2_000
}

fn default_max_rounds() -> usize {
    8
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSection {
    /// Timeout for tools without their own override
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Per-tool timeout overrides, in seconds
    #[serde(default)]
    pub tool_timeouts: BTreeMap<String, u64>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            tool_timeouts: BTreeMap::new(),
        }
    }
}

impl DispatchSection {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Configured override for `tool`, if any
    pub fn timeout_for(&self, tool: &str) -> Option<Duration> {
        self.tool_timeouts.get(tool).copied().map(Duration::from_secs)
    }
}

/// WebDriver browser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// `chrome`, `firefox` or `MicrosoftEdge`
    #[serde(default = "default_browser_name")]
    pub browser_name: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,

    #[serde(default = "default_implicit_wait_ms")]
    pub implicit_wait_ms: u64,

    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            headless: true,
            screenshots_dir: default_screenshots_dir(),
            implicit_wait_ms: default_implicit_wait_ms(),
            page_load_timeout_ms: default_page_load_timeout_ms(),
        }
    }
}

/// Karate project settings
///
/// `features_dir` and `reports_dir` are resolved against `base_path` when
/// relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarateSection {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    #[serde(default = "default_features_dir")]
    pub features_dir: PathBuf,

    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    #[serde(default = "default_mvn_command")]
    pub mvn_command: String,

    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,
}

impl Default for KarateSection {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            features_dir: default_features_dir(),
            reports_dir: default_reports_dir(),
            mvn_command: default_mvn_command(),
            process_timeout_secs: default_process_timeout_secs(),
        }
    }
}

impl KarateSection {
    pub fn features_path(&self) -> PathBuf {
        self.base_path.join(&self.features_dir)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.base_path.join(&self.reports_dir)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}

/// How requests to Jira authenticate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JiraAuthMode {
    /// `Authorization: Bearer <api_token>` (Jira Data Center PAT)
    #[default]
    Bearer,
    /// HTTP basic with `email:api_token` (Jira Cloud)
    Basic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub auth: JiraAuthMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub azure_endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            azure_endpoint: None,
            api_version: default_api_version(),
            api_key: None,
            deployment: None,
            max_completion_tokens: default_max_completion_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Completion rounds allowed per chat turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

/// Complete Jira connection details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: Option<String>,
    pub api_token: String,
    pub auth: JiraAuthMode,
}

/// Complete Azure OpenAI connection details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_version: String,
    pub api_key: String,
    pub deployment: String,
    pub max_completion_tokens: u32,
}

/// All settings for the orchestrator binaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub karate: KarateSection,
    #[serde(default)]
    pub jira: JiraSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Environment variables that override file settings
pub const ENV_OVERRIDES: &[&str] = &[
    "JIRA_BASE_URL",
    "JIRA_EMAIL",
    "JIRA_API_TOKEN",
    "JIRA_AUTH",
    "AZURE_OPEN_AI_ENDPOINT",
    "AZURE_OPEN_AI_API_VERSION",
    "AZURE_OPEN_AI_API_KEY",
    "AZURE_OPEN_AI_DEPLOYMENT_MODEL",
    "WEBDRIVER_URL",
    "KARATE_BASE_PATH",
];

impl Settings {
    /// Parse settings from TOML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from `path` (if given) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::parse(&content)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override values from an environment lookup
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JIRA_BASE_URL") {
            self.jira.base_url = Some(v);
        }
        if let Some(v) = get("JIRA_EMAIL") {
            self.jira.email = Some(v);
        }
        if let Some(v) = get("JIRA_API_TOKEN") {
            self.jira.api_token = Some(v);
        }
        if let Some(v) = get("JIRA_AUTH") {
            self.jira.auth = match v.to_ascii_lowercase().as_str() {
                "bearer" => JiraAuthMode::Bearer,
                "basic" => JiraAuthMode::Basic,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "JIRA_AUTH".to_string(),
                        message: format!("expected 'bearer' or 'basic', got '{other}'"),
                    });
                }
            };
        }
        if let Some(v) = get("AZURE_OPEN_AI_ENDPOINT") {
            self.llm.azure_endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPEN_AI_API_VERSION") {
            self.llm.api_version = v;
        }
        if let Some(v) = get("AZURE_OPEN_AI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("AZURE_OPEN_AI_DEPLOYMENT_MODEL") {
            self.llm.deployment = Some(v);
        }
        if let Some(v) = get("WEBDRIVER_URL") {
            self.browser.webdriver_url = v;
        }
        if let Some(v) = get("KARATE_BASE_PATH") {
            self.karate.base_path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Jira connection details, or `None` if incomplete
    ///
    /// Basic auth additionally requires an email.
    pub fn jira(&self) -> Option<JiraConfig> {
        let base_url = self.jira.base_url.clone()?;
        let api_token = self.jira.api_token.clone()?;
        if self.jira.auth == JiraAuthMode::Basic && self.jira.email.is_none() {
            return None;
        }
        Some(JiraConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: self.jira.email.clone(),
            api_token,
            auth: self.jira.auth,
        })
    }

    /// Azure OpenAI connection details, or `None` if incomplete
    pub fn llm(&self) -> Option<LlmConfig> {
        Some(LlmConfig {
            endpoint: self.llm.azure_endpoint.clone()?.trim_end_matches('/').to_string(),
            api_version: self.llm.api_version.clone(),
            api_key: self.llm.api_key.clone()?,
            deployment: self.llm.deployment.clone()?,
            max_completion_tokens: self.llm.max_completion_tokens,
        })
    }
}
