//! Suite configuration
//!
//! Defaults mirror the suite's historical Nightwatch globals: the dev server
//! on `localhost:8080`, downloads landing in `~/Downloads`, and the geometry
//! schema shipped inside the application checkout. A TOML file may override
//! any field; the test binary layers command-line flags on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::playwright::{Browser, PlaywrightConfig};
use crate::runner::RunnerConfig;
use crate::server::ServerConfig;
use crate::spec::Vars;

/// Suite configuration, as read from `floorplan-e2e.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// URL the floorplan editor is served from
    pub dev_server_url: String,

    /// Command that starts the dev server (None = attach to a running one)
    pub dev_server_command: Option<String>,

    /// Checkout of the floorplan editor (node_modules, schema)
    pub app_dir: PathBuf,

    /// Where the browser saves exported floorplans
    pub downloads_dir: PathBuf,

    /// Directory holding fixture floorplans
    pub fixtures_dir: PathBuf,

    /// Geometry schema (None = `<app_dir>/schema/geometry_schema.json`)
    pub schema_path: Option<PathBuf>,

    /// Directory of YAML suites
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Value typed into `#download-name` before exporting
    pub export_suffix: String,

    pub browser: Browser,

    pub headless: bool,

    /// Seconds to wait for the dev server to answer
    pub startup_timeout_secs: u64,

    /// Seconds a single browser session may run
    pub session_timeout_secs: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let crate_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            dev_server_url: "http://localhost:8080".to_string(),
            dev_server_command: None,
            app_dir: PathBuf::from("."),
            downloads_dir: default_downloads_dir(),
            fixtures_dir: crate_dir.join("fixtures"),
            schema_path: None,
            specs_dir: crate_dir.join("specs"),
            output_dir: PathBuf::from("test-results"),
            export_suffix: "_e2e_exported".to_string(),
            browser: Browser::Chromium,
            headless: true,
            startup_timeout_secs: 30,
            session_timeout_secs: 120,
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

impl SuiteConfig {
    /// Parse a config from TOML; missing fields keep their defaults
    pub fn from_toml_str(raw: &str) -> E2eResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load the config file if given, otherwise the defaults
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    E2eError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolved path of the geometry schema
    pub fn schema_path(&self) -> PathBuf {
        self.schema_path
            .clone()
            .unwrap_or_else(|| self.app_dir.join("schema").join("geometry_schema.json"))
    }

    /// File the editor writes when exporting with `export_suffix`
    pub fn exported_file(&self) -> PathBuf {
        crate::downloads::exported_file_path(&self.downloads_dir, &self.export_suffix)
    }

    /// Variables available to `${...}` placeholders in suites
    pub fn vars(&self) -> Vars {
        let mut vars = Vars::new();
        vars.insert("dev_server_url", &self.dev_server_url);
        vars.insert("fixtures_dir", self.fixtures_dir.to_string_lossy());
        vars.insert("downloads_dir", self.downloads_dir.to_string_lossy());
        vars.insert("exported_file", self.exported_file().to_string_lossy());
        vars.insert("export_suffix", &self.export_suffix);
        vars
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            server: ServerConfig {
                url: self.dev_server_url.clone(),
                command: self.dev_server_command.clone(),
                working_dir: self.app_dir.clone(),
                startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            },
            playwright: PlaywrightConfig {
                app_dir: self.app_dir.clone(),
                downloads_dir: self.downloads_dir.clone(),
                screenshot_dir: self.output_dir.join("screenshots"),
                browser: self.browser,
                headless: self.headless,
                session_timeout: Duration::from_secs(self.session_timeout_secs),
                ..Default::default()
            },
            specs_dir: self.specs_dir.clone(),
            output_dir: self.output_dir.clone(),
            schema_path: self.schema_path(),
            exported_file: self.exported_file(),
            vars: self.vars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SuiteConfig::default();
        assert_eq!(config.dev_server_url, "http://localhost:8080");
        assert!(config.downloads_dir.ends_with("Downloads"));
        assert_eq!(
            config.schema_path(),
            PathBuf::from("./schema/geometry_schema.json")
        );
        assert!(config
            .exported_file()
            .ends_with("floorplan_e2e_exported.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SuiteConfig::from_toml_str(
            r#"
dev_server_url = "http://127.0.0.1:9000"
app_dir = "/srv/editor"
browser = "firefox"
"#,
        )
        .unwrap();
        assert_eq!(config.dev_server_url, "http://127.0.0.1:9000");
        assert_eq!(config.browser, Browser::Firefox);
        assert_eq!(config.export_suffix, "_e2e_exported");
        assert_eq!(
            config.schema_path(),
            PathBuf::from("/srv/editor/schema/geometry_schema.json")
        );
    }

    #[test]
    fn test_vars_cover_exported_file() {
        let config = SuiteConfig {
            downloads_dir: PathBuf::from("/tmp/dl"),
            export_suffix: "_x".to_string(),
            ..Default::default()
        };
        let vars = config.vars();
        assert_eq!(vars.get("exported_file"), Some("/tmp/dl/floorplan_x.json"));
        assert_eq!(vars.get("export_suffix"), Some("_x"));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(SuiteConfig::from_toml_str("headless = \"maybe\"").is_err());
    }
}
