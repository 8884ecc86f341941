//! Post-session checks against captured page state and the exported file

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::schema::SchemaValidator;
use crate::spec::Expectation;

/// What a finished browser session left behind
pub struct CheckContext<'a> {
    pub captures: &'a BTreeMap<String, Value>,
    pub exported_file: &'a Path,
    pub schema_path: &'a Path,
}

/// JavaScript truthiness of a JSON value
pub fn truthiness(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn capture<'a>(ctx: &'a CheckContext<'_>, name: &str) -> E2eResult<&'a Value> {
    ctx.captures
        .get(name)
        .ok_or_else(|| E2eError::AssertionFailed(format!("nothing captured as '{}'", name)))
}

/// Numbers compare by value so `12` and `12.0` agree
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Evaluate one expectation
pub fn check_expectation(expectation: &Expectation, ctx: &CheckContext<'_>) -> E2eResult<()> {
    match expectation {
        Expectation::ExportedFileExists => {
            if ctx.exported_file.is_file() {
                Ok(())
            } else {
                Err(E2eError::AssertionFailed(format!(
                    "floorplan file was not found at {}",
                    ctx.exported_file.display()
                )))
            }
        }
        Expectation::ExportedMatchesSchema => {
            let validator = SchemaValidator::from_file(ctx.schema_path)?;
            validator.validate_file(ctx.exported_file)
        }
        Expectation::CaptureEquals { capture: name, expected, message } => {
            let actual = capture(ctx, name)?;
            if json_eq(actual, expected) {
                Ok(())
            } else {
                Err(E2eError::AssertionFailed(format!(
                    "{}: expected {} but got {}",
                    message.as_deref().unwrap_or(name),
                    expected,
                    actual
                )))
            }
        }
        Expectation::CaptureFalsy { capture: name, message } => {
            let actual = capture(ctx, name)?;
            if truthiness(actual) {
                Err(E2eError::AssertionFailed(format!(
                    "{}: expected a falsy value but got {}",
                    message.as_deref().unwrap_or(name),
                    actual
                )))
            } else {
                Ok(())
            }
        }
    }
}

/// Evaluate every expectation, collecting failures
pub fn check_all(expectations: &[Expectation], ctx: &CheckContext<'_>) -> Vec<String> {
    expectations
        .iter()
        .filter_map(|e| check_expectation(e, ctx).err().map(|err| err.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(null), false)]
    #[test_case(json!(false), false)]
    #[test_case(json!(0), false)]
    #[test_case(json!(0.0), false)]
    #[test_case(json!(""), false)]
    #[test_case(json!(12), true)]
    #[test_case(json!("0"), true)]
    #[test_case(json!([]), true)]
    #[test_case(json!({}), true)]
    fn test_truthiness(value: Value, expected: bool) {
        assert_eq!(truthiness(&value), expected);
    }

    fn ctx<'a>(captures: &'a BTreeMap<String, Value>, exported: &'a Path) -> CheckContext<'a> {
        CheckContext {
            captures,
            exported_file: exported,
            schema_path: Path::new("/nonexistent/schema.json"),
        }
    }

    #[test]
    fn test_capture_equals_numeric() {
        let mut captures = BTreeMap::new();
        captures.insert("north_axis".to_string(), json!(12.0));
        let c = ctx(&captures, Path::new("/nonexistent"));

        let ok = Expectation::CaptureEquals {
            capture: "north_axis".to_string(),
            expected: json!(12),
            message: None,
        };
        assert!(check_expectation(&ok, &c).is_ok());

        let bad = Expectation::CaptureEquals {
            capture: "north_axis".to_string(),
            expected: json!(0),
            message: Some("north_axis moved".to_string()),
        };
        let err = check_expectation(&bad, &c).unwrap_err().to_string();
        assert!(err.contains("north_axis moved: expected 0 but got 12.0"));
    }

    #[test]
    fn test_capture_falsy_and_missing() {
        let mut captures = BTreeMap::new();
        captures.insert("legacy".to_string(), Value::Null);
        let c = ctx(&captures, Path::new("/nonexistent"));

        let falsy = Expectation::CaptureFalsy { capture: "legacy".to_string(), message: None };
        assert!(check_expectation(&falsy, &c).is_ok());

        let missing = Expectation::CaptureFalsy { capture: "other".to_string(), message: None };
        assert!(check_expectation(&missing, &c).is_err());
    }

    #[test]
    fn test_exported_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("floorplan_t.json");
        let captures = BTreeMap::new();

        let failures = check_all(&[Expectation::ExportedFileExists], &ctx(&captures, &path));
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("floorplan file was not found"));

        std::fs::write(&path, "{}").unwrap();
        assert!(check_all(&[Expectation::ExportedFileExists], &ctx(&captures, &path)).is_empty());
    }
}
