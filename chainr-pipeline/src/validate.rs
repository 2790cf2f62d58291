//! Schema validation for a submitted pipeline document. Runs before the
//! typed [`crate::model::Pipeline`] is ever constructed, so that every
//! violation in the document — not just the first one a derived
//! `Deserialize` would choke on — ends up in the error message.

use serde_json::Value;
use thiserror::Error;

use crate::model::Pipeline;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0}")]
    BadRequest(String),
}

const JOB_FIELDS: &[&str] = &["image", "run", "dependsOn"];
const DEPENDENCY_FIELDS: &[&str] = &["job", "conditions"];
const CONDITION_FIELDS: &[&str] = &["failure"];

/// Parses and validates a pipeline submission. On success returns a
/// [`Pipeline`] ready for scheduling; on failure, a
/// [`ValidationError::BadRequest`] whose message concatenates every schema
/// violation found, in document order.
pub fn validate(body: &str) -> Result<Pipeline, ValidationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ValidationError::BadRequest(format!("invalid JSON: {e}")))?;

    let mut violations = Vec::new();
    check_document(&value, &mut violations);

    if !violations.is_empty() {
        return Err(ValidationError::BadRequest(violations.join("; ")));
    }

    serde_json::from_value(value)
        .map_err(|e| ValidationError::BadRequest(format!("invalid pipeline: {e}")))
}

fn check_document(value: &Value, violations: &mut Vec<String>) {
    let Some(obj) = value.as_object() else {
        violations.push("document must be a JSON object".to_string());
        return;
    };

    match obj.get("kind") {
        Some(Value::String(kind)) if kind == "Pipeline" => {}
        Some(Value::String(other)) => {
            violations.push(format!("unknown kind \"{other}\", expected \"Pipeline\""))
        }
        Some(_) => violations.push("field \"kind\" must be a string".to_string()),
        None => violations.push("missing required field \"kind\"".to_string()),
    }

    match obj.get("jobs") {
        Some(Value::Object(jobs)) => {
            for (name, job) in jobs {
                check_job(name, job, violations);
            }
        }
        Some(_) => violations.push("field \"jobs\" must be an object".to_string()),
        None => violations.push("missing required field \"jobs\"".to_string()),
    }

    for key in obj.keys() {
        if key != "kind" && key != "jobs" {
            violations.push(format!("unknown top-level field \"{key}\""));
        }
    }
}

fn check_job(name: &str, value: &Value, violations: &mut Vec<String>) {
    let Some(obj) = value.as_object() else {
        violations.push(format!("job \"{name}\" must be an object"));
        return;
    };

    require_string(obj, "image", &format!("job \"{name}\""), violations);
    require_string(obj, "run", &format!("job \"{name}\""), violations);

    match obj.get("dependsOn") {
        Some(Value::Array(deps)) => {
            for (i, dep) in deps.iter().enumerate() {
                check_dependency(name, i, dep, violations);
            }
        }
        Some(_) => violations.push(format!("job \"{name}\" field \"dependsOn\" must be an array")),
        None => {}
    }

    reject_unknown_fields(obj, JOB_FIELDS, &format!("job \"{name}\""), violations);
}

fn check_dependency(job_name: &str, index: usize, value: &Value, violations: &mut Vec<String>) {
    let context = format!("job \"{job_name}\" dependsOn[{index}]");
    let Some(obj) = value.as_object() else {
        violations.push(format!("{context} must be an object"));
        return;
    };

    require_string(obj, "job", &context, violations);

    match obj.get("conditions") {
        Some(Value::Object(conditions)) => {
            if let Some(failure) = conditions.get("failure") {
                if !failure.is_boolean() {
                    violations.push(format!("{context} field \"conditions.failure\" must be a bool"));
                }
            }
            reject_unknown_fields(
                conditions,
                CONDITION_FIELDS,
                &format!("{context} conditions"),
                violations,
            );
        }
        Some(_) => violations.push(format!("{context} field \"conditions\" must be an object")),
        None => {}
    }

    reject_unknown_fields(obj, DEPENDENCY_FIELDS, &context, violations);
}

fn require_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    context: &str,
    violations: &mut Vec<String>,
) {
    match obj.get(field) {
        Some(Value::String(_)) => {}
        Some(_) => violations.push(format!("{context} field \"{field}\" must be a string")),
        None => violations.push(format!("{context} missing required field \"{field}\"")),
    }
}

fn reject_unknown_fields(
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
    context: &str,
    violations: &mut Vec<String>,
) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            violations.push(format!("{context} has unknown field \"{key}\""));
        }
    }
}
