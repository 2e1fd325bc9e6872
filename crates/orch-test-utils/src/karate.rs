//! [`KarateProject`] builder for Karate runner scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use orch_providers::config::KarateSection;
use tempfile::TempDir;

/// A temporary Karate project laid out the way the runner expects:
/// `karate-tests/features/**.feature` and
/// `karate-tests/target/karate-reports/*.json`.
///
/// # Example
///
/// ```rust,no_run
/// use orch_test_utils::KarateProject;
///
/// let project = KarateProject::new()
///     .feature("users/get.feature", &["get user", "list users"])
///     .report("users.json", r#"[{"elements":[{"status":"passed"}]}]"#);
/// let settings = project.settings();
/// ```
pub struct KarateProject {
    temp_dir: TempDir,
}

impl Default for KarateProject {
    fn default() -> Self {
        Self::new()
    }
}

impl KarateProject {
    /// Create an empty project directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root().join("karate-tests/features")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root().join("karate-tests/target/karate-reports")
    }

    /// Write a feature file declaring the given scenarios.
    pub fn feature(self, relative: &str, scenarios: &[&str]) -> Self {
        let path = self.features_dir().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let name = Path::new(relative)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("feature");
        let mut content = format!("Feature: {name}\n\n");
        for scenario in scenarios {
            content.push_str(&format!("  Scenario: {scenario}\n    * print 'ok'\n\n"));
        }
        fs::write(path, content).unwrap();
        self
    }

    /// Write a JSON report file.
    pub fn report(self, file_name: &str, json: &str) -> Self {
        let dir = self.reports_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file_name), json).unwrap();
        self
    }

    /// Runner settings pointing at this project.
    pub fn settings(&self) -> KarateSection {
        KarateSection {
            base_path: self.root().to_path_buf(),
            ..KarateSection::default()
        }
    }
}
