//! Declarative YAML suite specification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A suite of scenarios sharing setup and teardown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags applied to every scenario in the suite
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size the browser starts with
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Steps run at the start of every scenario's browser session
    #[serde(default)]
    pub setup: Vec<TestStep>,

    pub scenarios: Vec<Scenario>,

    #[serde(default)]
    pub teardown: Teardown,
}

fn default_viewport() -> Viewport {
    Viewport { width: 1000, height: 800 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One browser session: setup, then these steps, then the expectations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Run without the suite's setup steps
    #[serde(default)]
    pub skip_setup: bool,

    pub steps: Vec<TestStep>,

    /// Checked after the browser session has ended
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teardown {
    /// Delete the exported floorplan after every scenario
    #[serde(default = "default_true")]
    pub remove_exported: bool,
}

impl Default for Teardown {
    fn default() -> Self {
        Self { remove_exported: true }
    }
}

fn default_true() -> bool {
    true
}

/// A single step in a browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Reload the current page
    Refresh,

    /// Resize the browser viewport
    ResizeWindow {
        width: u32,
        height: u32,
    },

    /// Type into an input after its current text, or replace it with `clear`.
    /// File inputs receive the value as a path to upload.
    SetValue {
        selector: String,
        value: String,
        #[serde(default)]
        clear: bool,
    },

    /// Wait for an element to become visible
    WaitVisible {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Click an element
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a fixed amount of time
    Pause {
        ms: u64,
    },

    /// Run a script body in the page, optionally keeping its return value
    Evaluate {
        script: String,
        #[serde(default)]
        capture: Option<String>,
    },

    /// Collect page and console errors for the rest of the session
    FailOnError,

    /// Flag uncaught errors in the current document
    SetFlagOnError,

    /// Fail if any error was flagged or collected so far
    CheckForErrors,

    /// Read the real-world-unit to pixel transform of the grid
    GetScales {
        #[serde(default = "default_grid_selector")]
        grid_selector: String,
    },

    /// Draw a closed square on the grid, in real-world units
    DrawSquare {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        side: f64,
    },

    /// Wait for a download to start, then until started downloads are saved
    AwaitDownloads {
        #[serde(default = "default_download_timeout")]
        timeout_ms: u64,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_timeout() -> u64 {
    100
}

fn default_download_timeout() -> u64 {
    5000
}

fn default_grid_selector() -> String {
    "#grid svg".to_string()
}

/// A check made against the session's captures or the exported file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Expectation {
    ExportedFileExists,
    ExportedMatchesSchema,
    CaptureEquals {
        capture: String,
        expected: serde_json::Value,
        #[serde(default)]
        message: Option<String>,
    },
    CaptureFalsy {
        capture: String,
        #[serde(default)]
        message: Option<String>,
    },
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Refresh => "refresh".to_string(),
            TestStep::ResizeWindow { width, height } => format!("resize:{}x{}", width, height),
            TestStep::SetValue { selector, .. } => format!("set_value:{}", selector),
            TestStep::WaitVisible { selector, .. } => format!("wait_visible:{}", selector),
            TestStep::Click { selector, .. } => format!("click:{}", selector),
            TestStep::Pause { ms } => format!("pause:{}ms", ms),
            TestStep::Evaluate { capture, .. } => match capture {
                Some(name) => format!("evaluate:{}", name),
                None => "evaluate".to_string(),
            },
            TestStep::FailOnError => "fail_on_error".to_string(),
            TestStep::SetFlagOnError => "set_flag_on_error".to_string(),
            TestStep::CheckForErrors => "check_for_errors".to_string(),
            TestStep::GetScales { .. } => "get_scales".to_string(),
            TestStep::DrawSquare { x, y, side } => format!("draw_square:{}@{},{}", side, x, y),
            TestStep::AwaitDownloads { .. } => "await_downloads".to_string(),
            TestStep::Log { message } => {
                let end = message
                    .char_indices()
                    .nth(30)
                    .map(|(i, _)| i)
                    .unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }
}

/// Values substituted for `${name}` placeholders
#[derive(Debug, Clone, Default)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl AsRef<str>) {
        self.values.insert(name.to_string(), value.as_ref().to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Expand every `${name}` in `input`; unknown names are an error
    pub fn expand(&self, input: &str) -> E2eResult<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                E2eError::SpecParse(format!("unterminated placeholder in {:?}", input))
            })?;
            let name = &after[..end];
            let value = self
                .get(name)
                .ok_or_else(|| E2eError::UnknownVariable(name.to_string()))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn expand_yaml(&self, value: &mut serde_yaml::Value) -> E2eResult<()> {
        match value {
            serde_yaml::Value::String(s) => {
                if s.contains("${") {
                    *s = self.expand(s)?;
                }
            }
            serde_yaml::Value::Sequence(items) => {
                for item in items {
                    self.expand_yaml(item)?;
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    self.expand_yaml(item)?;
                }
            }
            serde_yaml::Value::Tagged(tagged) => self.expand_yaml(&mut tagged.value)?,
            _ => {}
        }
        Ok(())
    }
}

impl Scenario {
    /// Steps of the scenario's browser session, setup included
    pub fn full_steps(&self, setup: &[TestStep]) -> Vec<TestStep> {
        let mut steps = Vec::with_capacity(setup.len() + self.steps.len());
        if !self.skip_setup {
            steps.extend_from_slice(setup);
        }
        steps.extend_from_slice(&self.steps);
        steps
    }

    /// Whether the scenario exports a floorplan that later checks read
    pub fn reads_export(&self) -> bool {
        self.expect.iter().any(|e| {
            matches!(
                e,
                Expectation::ExportedFileExists | Expectation::ExportedMatchesSchema
            )
        })
    }
}

impl Suite {
    /// Parse a suite from a YAML string with no placeholders
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        Self::from_yaml_with_vars(yaml, &Vars::new())
    }

    /// Parse a suite from YAML, expanding `${...}` placeholders in strings
    pub fn from_yaml_with_vars(yaml: &str, vars: &Vars) -> E2eResult<Self> {
        let mut raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        vars.expand_yaml(&mut raw)?;
        let suite: Suite = serde_yaml::from_value(raw)?;
        suite.check()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path, vars: &Vars) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_with_vars(&content, vars)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory
    pub fn load_all(dir: &Path, vars: &Vars) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path(), vars)?);
        }

        Ok(suites)
    }

    fn check(&self) -> E2eResult<()> {
        let mut seen = std::collections::HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate scenario '{}' in suite '{}'",
                    scenario.name, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Scenarios carrying `tag`, directly or through the suite's tags
    pub fn scenarios_tagged<'a>(&'a self, tag: &str) -> Vec<&'a Scenario> {
        let suite_tagged = self.tags.iter().any(|t| t == tag);
        self.scenarios
            .iter()
            .filter(|s| suite_tagged || s.tags.iter().any(|t| t == tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_suite() {
        let yaml = r#"
name: smoke
tags: [smoke]
setup:
  - action: navigate
    url: http://localhost:8080
  - action: resize_window
    width: 1000
    height: 800
scenarios:
  - name: opens
    steps:
      - action: wait_visible
        selector: '.modal .open-floorplan'
      - action: check_for_errors
"#;
        let suite = Suite::from_yaml(yaml).unwrap();
        assert_eq!(suite.name, "smoke");
        assert_eq!(suite.viewport, Viewport { width: 1000, height: 800 });
        assert!(suite.teardown.remove_exported);

        let scenario = suite.scenario("opens").unwrap();
        let steps = scenario.full_steps(&suite.setup);
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[2],
            TestStep::WaitVisible {
                selector: ".modal .open-floorplan".to_string(),
                timeout_ms: 100
            }
        );
    }

    #[test]
    fn test_placeholders_are_expanded() {
        let yaml = r#"
name: vars
scenarios:
  - name: import
    steps:
      - action: set_value
        selector: '#importInput'
        value: '${fixtures_dir}/floorplan.json'
"#;
        let mut vars = Vars::new();
        vars.insert("fixtures_dir", "/fx");
        let suite = Suite::from_yaml_with_vars(yaml, &vars).unwrap();
        assert_eq!(
            suite.scenarios[0].steps[0],
            TestStep::SetValue {
                selector: "#importInput".to_string(),
                value: "/fx/floorplan.json".to_string(),
                clear: false,
            }
        );
    }

    #[test]
    fn test_await_downloads_default_timeout() {
        let yaml = r#"
name: downloads
scenarios:
  - name: export
    steps:
      - action: await_downloads
      - action: await_downloads
        timeout_ms: 250
"#;
        let suite = Suite::from_yaml(yaml).unwrap();
        assert_eq!(
            suite.scenarios[0].steps,
            vec![
                TestStep::AwaitDownloads { timeout_ms: 5000 },
                TestStep::AwaitDownloads { timeout_ms: 250 },
            ]
        );
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let err = Vars::new().expand("${nope}/x").unwrap_err();
        assert!(matches!(err, E2eError::UnknownVariable(name) if name == "nope"));
    }

    #[test]
    fn test_duplicate_scenarios_rejected() {
        let yaml = r#"
name: dup
scenarios:
  - name: a
    steps: []
  - name: a
    steps: []
"#;
        assert!(Suite::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_expectations_parse() {
        let yaml = r#"
name: expect
scenarios:
  - name: north
    tags: [north-axis]
    steps: []
    expect:
      - check: capture_equals
        capture: north_axis
        expected: 12
      - check: capture_falsy
        capture: legacy_north_axis
      - check: exported_matches_schema
"#;
        let suite = Suite::from_yaml(yaml).unwrap();
        let scenario = &suite.scenarios[0];
        assert_eq!(scenario.expect.len(), 3);
        assert!(scenario.reads_export());
        assert_eq!(suite.scenarios_tagged("north-axis").len(), 1);
        assert!(suite.scenarios_tagged("other").is_empty());
    }

    #[test]
    fn test_skip_setup() {
        let scenario = Scenario {
            name: "bare".to_string(),
            tags: vec![],
            skip_setup: true,
            steps: vec![TestStep::Refresh],
            expect: vec![],
        };
        assert_eq!(scenario.full_steps(&[TestStep::FailOnError]), vec![TestStep::Refresh]);
    }
}
