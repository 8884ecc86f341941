//! Main test runner that orchestrates the dev server, browser sessions and checks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::assertions::{check_all, CheckContext};
use crate::downloads::{remove_exported, sha256_file, Removal};
use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightConfig, PlaywrightHandle, StepResult};
use crate::server::{DevServer, ServerConfig};
use crate::spec::{Scenario, Suite, Vars};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub suite: String,
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub page_errors: Vec<String>,
    pub failures: Vec<String>,
    pub exported_sha256: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn from_results(results: Vec<ScenarioResult>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Why a run cannot happen in this environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    DevServer(String),
    Playwright,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Dev server handle (if started)
    server: Option<DevServer>,
}

impl TestRunner {
    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, server: None }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Attach to or spawn the dev server
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        self.server = Some(DevServer::start(self.config.server.clone()).await?);
        Ok(())
    }

    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Check that a dev server and Playwright are available
    pub async fn preflight(&mut self) -> Result<(), Unavailable> {
        if let Err(e) = self.start_server().await {
            return Err(Unavailable::DevServer(e.to_string()));
        }
        if let Some(server) = &self.server {
            let mode = if server.is_spawned() { "spawned" } else { "attached" };
            info!("Using dev server at {} ({})", server.url(), mode);
        }
        PlaywrightHandle::check_playwright_installed(&self.config.playwright.app_dir)
            .map_err(|_| Unavailable::Playwright)
    }

    pub fn load_suites(&self) -> E2eResult<Vec<Suite>> {
        Suite::load_all(&self.config.specs_dir, &self.config.vars)
    }

    /// Run every scenario of every suite
    pub async fn run_all(&mut self) -> E2eResult<SuiteResult> {
        let suites = self.load_suites()?;
        let selected: Vec<(&Suite, &Scenario)> = suites
            .iter()
            .flat_map(|suite| suite.scenarios.iter().map(move |s| (suite, s)))
            .collect();
        self.run_selected(&selected).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<SuiteResult> {
        let suites = self.load_suites()?;
        let selected: Vec<(&Suite, &Scenario)> = suites
            .iter()
            .flat_map(|suite| suite.scenarios_tagged(tag).into_iter().map(move |s| (suite, s)))
            .collect();
        self.run_selected(&selected).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&mut self, name: &str) -> E2eResult<SuiteResult> {
        let suites = self.load_suites()?;
        let selected: Vec<(&Suite, &Scenario)> = suites
            .iter()
            .filter_map(|suite| suite.scenario(name).map(|s| (suite, s)))
            .collect();
        if selected.is_empty() {
            return Err(E2eError::SpecParse(format!("Scenario not found: {}", name)));
        }
        self.run_selected(&selected).await
    }

    /// Run all scenarios of one suite
    pub async fn run_suite(&mut self, suite: &Suite) -> E2eResult<SuiteResult> {
        let selected: Vec<(&Suite, &Scenario)> =
            suite.scenarios.iter().map(|s| (suite, s)).collect();
        self.run_selected(&selected).await
    }

    async fn run_selected(&mut self, selected: &[(&Suite, &Scenario)]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(selected.len());

        self.start_server().await?;

        info!("Running {} scenario(s)...", selected.len());

        for (suite, scenario) in selected {
            let result = self.run_scenario(suite, scenario).await;
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let summary = SuiteResult::from_results(results, start.elapsed().as_millis() as u64);

        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            summary.passed, summary.failed, summary.duration_ms
        );

        Ok(summary)
    }

    /// Run a single scenario; teardown runs whatever the outcome
    pub async fn run_scenario(&self, suite: &Suite, scenario: &Scenario) -> ScenarioResult {
        let started_at = Utc::now();
        let start = Instant::now();
        debug!("Running scenario: {} / {}", suite.name, scenario.name);

        let mut result = ScenarioResult {
            suite: suite.name.clone(),
            name: scenario.name.clone(),
            success: false,
            started_at,
            duration_ms: 0,
            steps: vec![],
            page_errors: vec![],
            failures: vec![],
            exported_sha256: None,
            screenshot: None,
            error: None,
        };

        // A stale export from an earlier run would satisfy the file checks
        if suite.teardown.remove_exported {
            remove_exported(&self.config.exported_file);
        }

        if let Err(e) = self.execute(suite, scenario, &mut result).await {
            result.error = Some(e.to_string());
        }

        if suite.teardown.remove_exported {
            if let Removal::Failed(reason) = remove_exported(&self.config.exported_file) {
                warn!("Teardown of '{}' left the export behind: {}", scenario.name, reason);
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.success = result.error.is_none() && result.failures.is_empty();
        result
    }

    async fn execute(
        &self,
        suite: &Suite,
        scenario: &Scenario,
        result: &mut ScenarioResult,
    ) -> E2eResult<()> {
        let mut pw_config = self.config.playwright.clone();
        pw_config.viewport_width = suite.viewport.width;
        pw_config.viewport_height = suite.viewport.height;
        let playwright = PlaywrightHandle::unchecked(pw_config);

        let steps = scenario.full_steps(&suite.setup);
        let outcome = playwright.run_steps(&scenario.name, &steps).await?;

        result.steps = outcome.steps.clone();
        result.page_errors = outcome.page_errors.clone();
        result.screenshot = outcome.screenshot.clone();

        if let Some(failed) = outcome.failed_step() {
            return Err(E2eError::StepFailed {
                step: failed.step_name.clone(),
                reason: failed.error.clone().unwrap_or_default(),
            });
        }

        if scenario.reads_export() && self.config.exported_file.is_file() {
            result.exported_sha256 = sha256_file(&self.config.exported_file).ok();
        }

        let ctx = CheckContext {
            captures: &outcome.captures,
            exported_file: &self.config.exported_file,
            schema_path: &self.config.schema_path,
        };
        result.failures = check_all(&scenario.expect, &ctx);
        if let Some(first) = result.failures.first() {
            return Err(E2eError::AssertionFailed(first.clone()));
        }

        Ok(())
    }

    /// Write results to JSON file
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub playwright: PlaywrightConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub schema_path: PathBuf,
    pub exported_file: PathBuf,
    pub vars: Vars,
}
