//! Floorplan editor E2E test framework
//!
//! This crate drives the floorplan editor's import and export through a real
//! browser:
//! - Attaches to (or spawns) the editor's dev server
//! - Controls Playwright by rendering each scenario into a Node script
//! - Parses declarative YAML suites with shared setup and teardown
//! - Validates exported floorplans against the geometry JSON Schema
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> DevServer                          │
//! │    ├── run_scenario(suite, scenario) -> ScenarioResult      │
//! │    │     ├── PlaywrightHandle::run_steps -> SessionOutcome  │
//! │    │     ├── check_all(expect) -> failures                  │
//! │    │     └── remove_exported()  (always)                    │
//! │    └── write_results(SuiteResult)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite (YAML)                                               │
//! │    ├── setup: [TestStep]                                    │
//! │    ├── scenarios: [{ name, steps, expect }]                 │
//! │    └── teardown: { remove_exported }                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod config;
pub mod downloads;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod schema;
pub mod server;
pub mod spec;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use runner::TestRunner;
pub use spec::{Expectation, Scenario, Suite, TestStep};

/// The import/export suite shipped with this crate
pub const IMPORT_FLOORPLANS_SUITE: &str = include_str!("../specs/import_floorplans.yaml");
