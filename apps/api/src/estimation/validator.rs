//! Output Validator — checks a model response against the output contract.
//!
//! Two passes:
//! 1. structural: walk `OutputSchema` for presence, primitive types, numeric bounds,
//!    non-empty strings, minimum array lengths;
//! 2. semantic: invariants the schema cannot express (percentile ordering).
//!
//! Nothing is coerced. An out-of-range confidence is a violation, not a clamp;
//! inverted percentiles are a violation, not a sort.

use serde_json::Value;

use crate::errors::{EstimationFailure, Violation};
use crate::estimation::contract::{detect_legacy_shape, SalaryEstimate};
use crate::estimation::schema::{FieldKind, FieldSpec, OutputSchema};
use crate::llm_client::{strip_json_fences, ModelOutput};

const ROOT: &str = "$";

/// Validates `output` and returns the typed estimate, or a `ContractViolation`
/// naming every failing field and carrying the raw output.
pub fn validate(output: &ModelOutput, schema: &OutputSchema) -> Result<SalaryEstimate, EstimationFailure> {
    let violation = |violations: Vec<Violation>| EstimationFailure::ContractViolation {
        violations,
        raw: output.raw_text(),
    };

    let payload = match output {
        ModelOutput::Structured(value) => value.clone(),
        ModelOutput::Text(text) => serde_json::from_str(strip_json_fences(text)).map_err(|e| {
            violation(vec![Violation::new(
                ROOT,
                format!("response is not a JSON value: {e}"),
            )])
        })?,
    };

    let mut violations = validate_payload(&payload, schema);
    if !violations.is_empty() {
        if let Some(legacy) = detect_legacy_shape(&payload) {
            violations.push(Violation::new(
                ROOT,
                format!(
                    "response matches legacy contract {legacy}; expected {}",
                    schema.version
                ),
            ));
        }
        return Err(violation(violations));
    }

    let estimate: SalaryEstimate = serde_json::from_value(payload)
        .map_err(|e| violation(vec![Violation::new(ROOT, e.to_string())]))?;

    let violations = check_semantics(&estimate);
    if !violations.is_empty() {
        return Err(violation(violations));
    }

    Ok(estimate)
}

/// Structural pass only. Empty result means the payload fits the schema.
pub fn validate_payload(payload: &Value, schema: &OutputSchema) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_object(payload, schema.fields, "", &mut violations);
    violations
}

fn check_semantics(estimate: &SalaryEstimate) -> Vec<Violation> {
    let mut violations = Vec::new();
    let b = &estimate.salary.breakdown;
    if b.is_ordered() {
        return violations;
    }
    if b.p25 > b.p50 {
        violations.push(Violation::new(
            "salary.breakdown",
            format!("25th percentile ({}) is above the median ({})", b.p25, b.p50),
        ));
    }
    if b.p50 > b.p75 {
        violations.push(Violation::new(
            "salary.breakdown",
            format!("median ({}) is above the 75th percentile ({})", b.p50, b.p75),
        ));
    }
    violations
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        ROOT
    } else {
        path
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(value: &Value, fields: &[FieldSpec], path: &str, out: &mut Vec<Violation>) {
    let Some(object) = value.as_object() else {
        out.push(Violation::new(
            display_path(path),
            format!("expected object, got {}", type_name(value)),
        ));
        return;
    };
    for field in fields {
        let child = child_path(path, field.name);
        match object.get(field.name) {
            None | Some(Value::Null) => out.push(Violation::new(child, "missing required field")),
            Some(v) => check_value(v, &field.kind, &child, out),
        }
    }
}

fn check_value(value: &Value, kind: &FieldKind, path: &str, out: &mut Vec<Violation>) {
    match kind {
        FieldKind::Text { min_chars } => match value.as_str() {
            None => out.push(Violation::new(
                path,
                format!("expected string, got {}", type_name(value)),
            )),
            Some(s) if s.trim().chars().count() < *min_chars => {
                let problem = if *min_chars == 1 {
                    "must not be empty".to_string()
                } else {
                    format!("must be at least {min_chars} characters")
                };
                out.push(Violation::new(path, problem));
            }
            Some(_) => {}
        },
        FieldKind::CurrencyCode => match value.as_str() {
            Some(code) if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) => {}
            Some(code) => out.push(Violation::new(
                path,
                format!("expected a 3-letter uppercase currency code, got {code:?}"),
            )),
            None => out.push(Violation::new(
                path,
                format!("expected string, got {}", type_name(value)),
            )),
        },
        FieldKind::Number { min, max } => {
            let Some(n) = value.as_f64() else {
                out.push(Violation::new(
                    path,
                    format!("expected number, got {}", type_name(value)),
                ));
                return;
            };
            if let Some(min) = min {
                if n < *min {
                    out.push(Violation::new(path, format!("{n} is below the minimum {min}")));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    out.push(Violation::new(path, format!("{n} is above the maximum {max}")));
                }
            }
        }
        FieldKind::Object(fields) => check_object(value, fields, path, out),
        FieldKind::List { item, min_items } => {
            let Some(items) = value.as_array() else {
                out.push(Violation::new(
                    path,
                    format!("expected array, got {}", type_name(value)),
                ));
                return;
            };
            if items.len() < *min_items {
                out.push(Violation::new(
                    path,
                    format!("expected at least {min_items} item(s), got {}", items.len()),
                ));
            }
            for (i, v) in items.iter().enumerate() {
                check_value(v, item, &format!("{path}[{i}]"), out);
            }
        }
    }
}
