//! JSON Schema validation of floorplan documents

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Compiled floorplan schema.
///
/// The geometry schema is written against draft-04, so the draft is pinned
/// rather than sniffed from `$schema`.
pub struct SchemaValidator {
    compiled: JSONSchema,
}

impl SchemaValidator {
    pub fn from_value(schema: &Value) -> E2eResult<Self> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft4)
            .compile(schema)
            .map_err(|e| E2eError::Schema(format!("schema does not compile: {}", e)))?;
        Ok(Self { compiled })
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Schema(format!("cannot read schema {}: {}", path.display(), e))
        })?;
        let schema: Value = serde_json::from_str(&raw)?;
        Self::from_value(&schema)
    }

    /// Validate a document, collecting every violation
    pub fn validate(&self, document: &Value) -> E2eResult<()> {
        let violations: Vec<String> = match self.compiled.validate(document) {
            Ok(()) => return Ok(()),
            Err(errors) => errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        format!("/: {}", e)
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect(),
        };
        debug!("{} schema violation(s)", violations.len());
        Err(E2eError::SchemaViolations(violations))
    }

    /// Read a JSON file and validate it
    pub fn validate_file(&self, path: &Path) -> E2eResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            E2eError::AssertionFailed(format!(
                "floorplan file was not found at {}: {}",
                path.display(),
                e
            ))
        })?;
        let document: Value = serde_json::from_str(&raw)?;
        self.validate(&document)
    }
}
