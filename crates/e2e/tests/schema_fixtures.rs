//! Validation of fixture floorplans against the geometry schema copy.

use std::path::PathBuf;

use floorplan_e2e::assertions::{check_all, CheckContext};
use floorplan_e2e::downloads::{exported_file_path, remove_exported, Removal};
use floorplan_e2e::schema::SchemaValidator;
use floorplan_e2e::{E2eError, Expectation};
use serde_json::Value;
use std::collections::BTreeMap;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn schema_path() -> PathBuf {
    fixtures().join("schema").join("geometry_schema.json")
}

fn fixture() -> Value {
    let raw = std::fs::read_to_string(fixtures().join("floorplan-2017-08-31.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn fixture_satisfies_schema() {
    let validator = SchemaValidator::from_file(&schema_path()).unwrap();
    validator
        .validate_file(&fixtures().join("floorplan-2017-08-31.json"))
        .unwrap();
}

#[test]
fn fixture_keeps_north_axis_in_legacy_location() {
    let doc = fixture();
    assert_eq!(doc["project"]["config"]["north_axis"], 12);
    assert!(doc["project"].get("north_axis").is_none());
}

#[test]
fn broken_floorplan_reports_every_violation() {
    let mut doc = fixture();
    doc["project"]["grid"]["spacing"] = serde_json::json!(0);
    doc["stories"][0]["spaces"][0]["color"] = serde_json::json!("red");

    let validator = SchemaValidator::from_file(&schema_path()).unwrap();
    match validator.validate(&doc) {
        Err(E2eError::SchemaViolations(violations)) => {
            assert_eq!(violations.len(), 2, "{:?}", violations);
            assert!(violations.iter().any(|v| v.starts_with("/project/grid/spacing")));
            assert!(violations.iter().any(|v| v.starts_with("/stories/0/spaces/0/color")));
        }
        other => panic!("expected schema violations, got {:?}", other.err()),
    }
}

#[test]
fn exported_file_checks_then_teardown() {
    let downloads = tempfile::tempdir().unwrap();
    let exported = exported_file_path(downloads.path(), "_e2e_exported");
    std::fs::copy(fixtures().join("floorplan-2017-08-31.json"), &exported).unwrap();

    let captures = BTreeMap::new();
    let schema = schema_path();
    let ctx = CheckContext {
        captures: &captures,
        exported_file: &exported,
        schema_path: &schema,
    };
    let failures = check_all(
        &[Expectation::ExportedFileExists, Expectation::ExportedMatchesSchema],
        &ctx,
    );
    assert!(failures.is_empty(), "{:?}", failures);

    assert_eq!(remove_exported(&exported), Removal::Removed);
    let failures = check_all(&[Expectation::ExportedMatchesSchema], &ctx);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("floorplan file was not found"));
}
