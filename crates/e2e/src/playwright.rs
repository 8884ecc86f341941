//! Playwright browser automation
//!
//! A scenario is rendered into a single Node script so the whole sequence
//! runs in one browser session, the way a Nightwatch test case does. The
//! script reports back as JSON lines on stdout:
//!
//! ```text
//! {"event":"step","index":0,"name":"navigate:...","ok":true,"duration_ms":41}
//! {"event":"capture","name":"north_axis","value":12}
//! {"event":"page_error","message":"TypeError: ..."}
//! {"event":"download","path":"/home/u/Downloads/floorplan_e2e_exported.json"}
//! {"event":"done","ok":true}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::TestStep;

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// One line of the script's event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Step {
        index: usize,
        name: String,
        ok: bool,
        duration_ms: u64,
        #[serde(default)]
        error: Option<String>,
    },
    Capture {
        name: String,
        #[serde(default)]
        value: Value,
    },
    PageError {
        message: String,
    },
    Download {
        path: PathBuf,
    },
    Log {
        message: String,
    },
    Done {
        ok: bool,
    },
}

/// Everything a browser session reported
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub steps: Vec<StepResult>,
    pub captures: BTreeMap<String, Value>,
    pub page_errors: Vec<String>,
    pub downloads: Vec<PathBuf>,
    pub completed: bool,
    pub screenshot: Option<PathBuf>,
}

impl SessionOutcome {
    /// Fold an event stream into an outcome
    pub fn from_events(events: Vec<ScriptEvent>) -> Self {
        let mut outcome = SessionOutcome::default();
        for event in events {
            match event {
                ScriptEvent::Step { name, ok, duration_ms, error, .. } => {
                    outcome.steps.push(StepResult {
                        success: ok,
                        step_name: name,
                        duration_ms,
                        error,
                    });
                }
                ScriptEvent::Capture { name, value } => {
                    outcome.captures.insert(name, value);
                }
                ScriptEvent::PageError { message } => outcome.page_errors.push(message),
                ScriptEvent::Download { path } => outcome.downloads.push(path),
                ScriptEvent::Log { message } => info!("[TEST LOG] {}", message),
                ScriptEvent::Done { ok } => outcome.completed = ok,
            }
        }
        outcome
    }

    /// The step that stopped the session, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Parse the event lines of a script's stdout, skipping anything else
pub fn parse_events(stdout: &str) -> Vec<ScriptEvent> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Ignoring non-event line ({}): {}", e, line);
                None
            }
        })
        .collect()
}

/// Encode a string as a JavaScript literal
fn js(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Turn a session name into something safe for a file name
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

const FLAG_ON_ERROR_JS: &str = r#"(() => {
  if (!window.__e2eErrors) {
    window.__e2eErrors = [];
    window.addEventListener('error', (e) => window.__e2eErrors.push(String(e.message)));
    window.addEventListener('unhandledrejection', (e) => window.__e2eErrors.push(String(e.reason)));
  }
  return true;
})()"#;

/// Fails the step with every error seen by the session or the in-page flag
const CHECK_FOR_ERRORS_JS: &str = concat!(
    "      const flagged = await page.evaluate('window.__e2eErrors || []');\n",
    "      const errors = [...new Set(pageErrors.concat(flagged))];\n",
    "      if (errors.length > 0) {\n",
    "        throw new Error('page reported errors: ' + errors.join('; '));\n",
    "      }"
);

/// Real-world units to page pixels, inset one pixel so points on the view's
/// edge still hit the grid element
const TO_PX_JS: &str = r#"const inset = (v, lo, size) =>
  Math.min(Math.max(v, lo + 1), lo + size - 1);

const toPx = (x, y) => ({
  x: inset(
    scales.left + (x - scales.min_x) / (scales.max_x - scales.min_x) * scales.width,
    scales.left,
    scales.width
  ),
  y: inset(
    scales.top + (scales.max_y - y) / (scales.max_y - scales.min_y) * scales.height,
    scales.top,
    scales.height
  ),
});"#;

fn scales_js(grid_selector: &str) -> String {
    format!(
        r#"(() => {{
  const grid = document.querySelector({sel});
  if (!grid) throw new Error('grid not found: ' + {sel});
  const rect = grid.getBoundingClientRect();
  const view = window.application.$store.state.project.view;
  return {{
    left: rect.left, top: rect.top, width: rect.width, height: rect.height,
    min_x: view.min_x, max_x: view.max_x, min_y: view.min_y, max_y: view.max_y
  }};
}})()"#,
        sel = js(grid_selector)
    )
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.app_dir)?;
        Ok(Self::unchecked(config))
    }

    /// Create a handle without probing for Playwright
    pub fn unchecked(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Check if Playwright is installed for the application checkout
    pub fn check_playwright_installed(app_dir: &Path) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .current_dir(app_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    fn failure_screenshot(&self, session: &str) -> PathBuf {
        self.config
            .screenshot_dir
            .join(format!("{}-failure.png", slug(session)))
    }

    /// Build the Playwright script for one browser session
    pub fn build_script(&self, session: &str, steps: &[TestStep]) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"// session: {session}
const path = require('path');
const {{ chromium, firefox, webkit }} = require('playwright');

const emit = (event) => console.log(JSON.stringify(event));
const downloadsDir = {downloads};
const pageErrors = [];
const downloads = [];
let collectErrors = false;
let scales = null;

{to_px}

const step = async (index, name, body) => {{
  const started = Date.now();
  try {{
    await body();
  }} catch (error) {{
    emit({{
      event: 'step',
      index,
      name,
      ok: false,
      duration_ms: Date.now() - started,
      error: error.message
    }});
    throw error;
  }}
  emit({{ event: 'step', index, name, ok: true, duration_ms: Date.now() - started }});
}};

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }},
    acceptDownloads: true
  }});
  const page = await context.newPage();

  page.on('pageerror', (err) => {{
    if (!collectErrors) return;
    pageErrors.push(err.message);
    emit({{ event: 'page_error', message: err.message }});
  }});
  page.on('console', (msg) => {{
    if (!collectErrors || msg.type() !== 'error') return;
    pageErrors.push(msg.text());
    emit({{ event: 'page_error', message: msg.text() }});
  }});
  page.on('download', (download) => {{
    const target = path.join(downloadsDir, download.suggestedFilename());
    downloads.push(download.saveAs(target).then(() => {{
      emit({{ event: 'download', path: target }});
      return target;
    }}));
  }});

  let ok = true;
  try {{
"#,
            session = session.replace('\n', " "),
            to_px = TO_PX_JS,
            downloads = js(&self.config.downloads_dir.to_string_lossy()),
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = self.config.viewport_width,
            height = self.config.viewport_height,
        ));

        for (i, step) in steps.iter().enumerate() {
            script.push_str(&format!(
                "    await step({}, {}, async () => {{\n{}\n    }});\n",
                i,
                js(&step.name()),
                self.step_to_js(step)
            ));
        }

        script.push_str(&format!(
            r#"  }} catch (error) {{
    ok = false;
    try {{ await page.screenshot({{ path: {screenshot} }}); }} catch (_) {{}}
  }} finally {{
    await Promise.allSettled(downloads);
    await browser.close();
    emit({{ event: 'done', ok }});
  }}
  process.exit(ok ? 0 : 1);
}})();
"#,
            screenshot = js(&self.failure_screenshot(session).to_string_lossy()),
        ));

        script
    }

    /// Convert a step to the body of its `step(...)` callback
    fn step_to_js(&self, step: &TestStep) -> String {
        match step {
            TestStep::Navigate { url, wait_for_selector } => {
                let wait = wait_for_selector
                    .as_ref()
                    .map(|s| {
                        format!(
                            "\n      await page.waitForSelector({}, {{ state: 'visible' }});",
                            js(s)
                        )
                    })
                    .unwrap_or_default();
                format!("      await page.goto({});{}", js(url), wait)
            }
            TestStep::Refresh => "      await page.reload();".to_string(),
            TestStep::ResizeWindow { width, height } => {
                format!(
                    "      await page.setViewportSize({{ width: {}, height: {} }});",
                    width, height
                )
            }
            TestStep::SetValue { selector, value, clear } => {
                // Without `clear` the value is typed after the current text
                let type_text = if *clear {
                    format!("        await el.fill({});", js(value))
                } else {
                    format!(
                        concat!(
                            "        await el.focus();\n",
                            "        await el.press('End');\n",
                            "        await el.pressSequentially({});"
                        ),
                        js(value)
                    )
                };
                format!(
                    r#"      const el = page.locator({sel}).first();
      if ((await el.getAttribute('type')) === 'file') {{
        await el.setInputFiles({value});
      }} else {{
{type_text}
      }}"#,
                    sel = js(selector),
                    value = js(value),
                    type_text = type_text
                )
            }
            TestStep::WaitVisible { selector, timeout_ms } => {
                format!(
                    "      await page.waitForSelector({}, {{ state: 'visible', timeout: {} }});",
                    js(selector),
                    timeout_ms
                )
            }
            TestStep::Click { selector, timeout_ms } => {
                format!(
                    "      await page.click({}, {{ timeout: {} }});",
                    js(selector),
                    timeout_ms.unwrap_or(self.config.click_timeout_ms)
                )
            }
            TestStep::Pause { ms } => format!("      await page.waitForTimeout({});", ms),
            TestStep::Evaluate { script, capture } => {
                let expr = format!("(() => {{ {} }})()", script);
                let record = capture
                    .as_ref()
                    .map(|name| {
                        format!(
                            "\n      emit({{ event: 'capture', name: {}, value: {} }});",
                            js(name),
                            "value === undefined ? null : value"
                        )
                    })
                    .unwrap_or_default();
                format!("      const value = await page.evaluate({});{}", js(&expr), record)
            }
            TestStep::FailOnError => "      collectErrors = true;".to_string(),
            TestStep::SetFlagOnError => {
                format!("      await page.evaluate({});", js(FLAG_ON_ERROR_JS))
            }
            TestStep::CheckForErrors => CHECK_FOR_ERRORS_JS.to_string(),
            TestStep::GetScales { grid_selector } => {
                format!(
                    "      scales = await page.evaluate({});\n      {}",
                    js(&scales_js(grid_selector)),
                    "emit({ event: 'capture', name: 'scales', value: scales });"
                )
            }
            TestStep::DrawSquare { x, y, side } => {
                format!(
                    r#"      if (!scales) throw new Error('draw_square needs get_scales first');
      const corners = [
        [{x}, {y}],
        [{x} + {s}, {y}],
        [{x} + {s}, {y} + {s}],
        [{x}, {y} + {s}],
        [{x}, {y}],
      ];
      for (const [cx, cy] of corners) {{
        const p = toPx(cx, cy);
        await page.mouse.click(p.x, p.y);
      }}"#,
                    x = x,
                    y = y,
                    s = side
                )
            }
            TestStep::AwaitDownloads { timeout_ms } => {
                format!(
                    r#"      if (downloads.length === 0) {{
        await page.waitForEvent('download', {{ timeout: {t} }}).catch(() => {{
          throw new Error('no download was started within {t} ms');
        }});
      }}
      await Promise.all(downloads);"#,
                    t = timeout_ms
                )
            }
            TestStep::Log { message } => {
                format!("      emit({{ event: 'log', message: {} }});", js(message))
            }
        }
    }

    /// Execute a script via Node and return its stdout
    pub async fn run_script(&self, script: &str) -> E2eResult<String> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("session.js");
        std::fs::write(&script_path, script)?;
        std::fs::create_dir_all(&self.config.downloads_dir)?;
        std::fs::create_dir_all(&self.config.screenshot_dir)?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .current_dir(&self.config.app_dir)
            .env("NODE_PATH", self.config.app_dir.join("node_modules"))
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.session_timeout, cmd.output())
            .await
            .map_err(|_| {
                E2eError::Playwright(format!(
                    "browser session exceeded {:?}",
                    self.config.session_timeout
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                debug!("Playwright stderr:\n{}", stderr);
            }
            if !stdout.contains(r#""event":"done""#) {
                return Err(E2eError::Playwright(format!(
                    "Script failed:\nstdout: {}\nstderr: {}",
                    stdout, stderr
                )));
            }
        }

        Ok(stdout)
    }

    /// Run steps in one browser session
    pub async fn run_steps(
        &self,
        session: &str,
        steps: &[TestStep],
    ) -> E2eResult<SessionOutcome> {
        let script = self.build_script(session, steps);
        let stdout = self.run_script(&script).await?;
        let mut outcome = SessionOutcome::from_events(parse_events(&stdout));

        if outcome.failed_step().is_some() {
            let shot = self.failure_screenshot(session);
            if shot.exists() {
                outcome.screenshot = Some(shot);
            }
        } else if !outcome.completed {
            warn!("Session '{}' ended without reporting completion", session);
            return Err(E2eError::Playwright(format!(
                "session '{}' did not complete",
                session
            )));
        }

        Ok(outcome)
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Application checkout whose node_modules provides Playwright
    pub app_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    pub click_timeout_ms: u64,
    pub session_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            downloads_dir: PathBuf::from("Downloads"),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport_width: 1000,
            viewport_height: 800,
            browser: Browser::Chromium,
            headless: true,
            click_timeout_ms: 5000,
            session_timeout: Duration::from_secs(120),
        }
    }
}
