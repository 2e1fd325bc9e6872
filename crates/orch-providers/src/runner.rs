//! Karate test runner
//!
//! Runs feature files through Maven, lists the available features and reads
//! the JSON reports Karate leaves behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::KarateSection;
use crate::error::{ConfigError, ProviderError, Result};

/// Outcome of one Maven run
///
/// A non-zero exit is a completed run with `success == false`, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: i32,
    /// Scenario counts parsed from Karate's console summary, when present
    pub passed: Option<u32>,
    pub failed: Option<u32>,
    pub report_path: Option<PathBuf>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    /// Path relative to the features directory
    pub path: String,
    pub full_path: PathBuf,
    pub name: String,
    pub scenarios: Vec<String>,
}

/// Summary of the most recent report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub report: PathBuf,
    pub total_scenarios: u32,
    pub passed_scenarios: u32,
    pub failed_scenarios: u32,
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<Value>,
}

/// Test execution capability used by the Karate tools
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, feature_path: &str, tags: Option<&str>) -> Result<RunOutcome>;

    /// Feature files matching `pattern` (default `**/*.feature`), sorted by path
    async fn list_features(&self, pattern: Option<&str>) -> Result<Vec<FeatureInfo>>;

    async fn latest_results(&self, detailed: bool) -> Result<TestSummary>;
}

static SUMMARY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"scenarios:\s*(\d+)\s*\|\s*passed:\s*(\d+)\s*\|\s*failed:\s*(\d+)").ok()
});

/// `mvn test` driven Karate runner
#[derive(Debug, Clone)]
pub struct KarateRunner {
    settings: KarateSection,
}

impl KarateRunner {
    pub fn new(settings: KarateSection) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &KarateSection {
        &self.settings
    }

    /// The `-Dkarate.options=...` argument for a run
    pub fn karate_options(feature_path: &str, tags: Option<&str>) -> String {
        let feature_path = feature_path.trim_start_matches('/');
        match tags.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tags) => format!("-Dkarate.options=classpath:features/{feature_path} --tags {tags}"),
            None => format!("-Dkarate.options=classpath:features/{feature_path}"),
        }
    }

    fn timeout(&self) -> Duration {
        self.settings.process_timeout()
    }
}

/// Pull `(passed, failed)` from Karate's console summary line
pub fn parse_console_summary(stdout: &str) -> Option<(u32, u32)> {
    let re = SUMMARY_RE.as_ref()?;
    let caps = re.captures_iter(stdout).last()?;
    let passed = caps.get(2)?.as_str().parse().ok()?;
    let failed = caps.get(3)?.as_str().parse().ok()?;
    Some((passed, failed))
}

/// Scenario titles declared in a feature file
pub fn parse_scenarios(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("Scenario Outline:")
                .or_else(|| line.strip_prefix("Scenario:"))
        })
        .map(|title| title.trim().to_string())
        .collect()
}

/// Count scenarios in a Karate JSON report
///
/// Handles both the cucumber layout (array of features with `elements`) and
/// Karate's native per-feature layout (`scenarioResults`).
pub fn summarize_report(report: &Value) -> (u32, u32, Option<f64>) {
    let mut passed = 0;
    let mut failed = 0;
    let mut duration = None;

    match report {
        Value::Array(features) => {
            for element in features
                .iter()
                .filter_map(|f| f.get("elements").and_then(Value::as_array))
                .flatten()
            {
                if cucumber_passed(element) {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
        }
        Value::Object(feature) => {
            if let Some(scenarios) = feature.get("scenarioResults").and_then(Value::as_array) {
                for scenario in scenarios {
                    if scenario.get("failed").and_then(Value::as_bool).unwrap_or(false) {
                        failed += 1;
                    } else {
                        passed += 1;
                    }
                }
            }
            duration = feature.get("durationMillis").and_then(Value::as_f64);
        }
        _ => {}
    }

    (passed, failed, duration)
}

fn cucumber_passed(element: &Value) -> bool {
    if let Some(status) = element.get("status").and_then(Value::as_str) {
        return status == "passed";
    }
    element
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps.iter().all(|s| {
                s.pointer("/result/status").and_then(Value::as_str) == Some("passed")
            })
        })
        .unwrap_or(false)
}

/// Reject paths that climb out of the features directory
fn confined(field: &str, value: &str) -> Result<()> {
    if value.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ProviderError::InvalidInput {
            field: field.to_string(),
            message: format!("'{value}' must stay inside the features directory"),
        });
    }
    Ok(())
}

fn bad_pattern(key: &str, error: glob::PatternError) -> ProviderError {
    ProviderError::Config(ConfigError::Invalid {
        key: key.to_string(),
        message: error.to_string(),
    })
}

fn newest_json(dir: &Path) -> Result<Option<PathBuf>> {
    let pattern = dir.join("*.json");
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern).map_err(|e| bad_pattern("karate.reports_dir", e))?;

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for path in paths.flatten() {
        let modified = std::fs::metadata(&path)?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[async_trait]
impl TestRunner for KarateRunner {
    async fn run(&self, feature_path: &str, tags: Option<&str>) -> Result<RunOutcome> {
        confined("feature_path", feature_path)?;
        let options = Self::karate_options(feature_path, tags);
        info!(feature = %feature_path, tags = ?tags, "Running Karate feature");

        let child = tokio::process::Command::new(&self.settings.mvn_command)
            .arg("test")
            .arg(&options)
            .current_dir(&self.settings.base_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(feature = %feature_path, "Karate run timed out");
                return Err(ProviderError::Timeout {
                    operation: format!("{} test", self.settings.mvn_command),
                    after: self.timeout(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        let counts = parse_console_summary(&stdout);
        let report = self.settings.reports_path().join("karate-summary.html");

        debug!(exit_code, ?counts, "Karate run finished");
        Ok(RunOutcome {
            success: output.status.success(),
            exit_code,
            passed: counts.map(|(p, _)| p),
            failed: counts.map(|(_, f)| f),
            report_path: report.exists().then_some(report),
            stdout,
            stderr,
        })
    }

    async fn list_features(&self, pattern: Option<&str>) -> Result<Vec<FeatureInfo>> {
        let root = self.settings.features_path();
        if !root.is_dir() {
            return Err(ProviderError::NotFound {
                what: format!("features directory {}", root.display()),
            });
        }

        let pattern = pattern.unwrap_or("**/*.feature");
        confined("pattern", pattern)?;
        if Path::new(pattern).has_root() {
            return Err(ProviderError::InvalidInput {
                field: "pattern".to_string(),
                message: format!("'{pattern}' must be relative to the features directory"),
            });
        }
        let full_pattern = root.join(pattern);
        let entries =
            glob::glob(&full_pattern.to_string_lossy()).map_err(|e| bad_pattern("pattern", e))?;

        let mut features = Vec::new();
        for path in entries.flatten().filter(|p| p.is_file()) {
            let relative = path
                .strip_prefix(&root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let scenarios = match tokio::fs::read_to_string(&path).await {
                Ok(content) => parse_scenarios(&content),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read feature file");
                    Vec::new()
                }
            };
            features.push(FeatureInfo {
                path: relative,
                full_path: path,
                name,
                scenarios,
            });
        }

        features.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(features)
    }

    async fn latest_results(&self, detailed: bool) -> Result<TestSummary> {
        let dir = self.settings.reports_path();
        let Some(report) = newest_json(&dir)? else {
            return Err(ProviderError::NotFound {
                what: format!("test results in {}; run tests first", dir.display()),
            });
        };

        let content = tokio::fs::read_to_string(&report).await?;
        let results: Value = serde_json::from_str(&content)?;
        let (passed, failed, duration_ms) = summarize_report(&results);

        Ok(TestSummary {
            report,
            total_scenarios: passed + failed,
            passed_scenarios: passed,
            failed_scenarios: failed,
            duration_ms,
            detailed_results: detailed.then_some(results),
        })
    }
}
