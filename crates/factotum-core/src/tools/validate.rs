//! Argument validation at the registry boundary
//!
//! Declared tool schemas use a JSON-Schema-like subset: object type, named
//! properties with types, a required set, and enumerations. Arguments are
//! validated here before any handler runs; handlers then deserialize into
//! typed structs.

use serde_json::Value;

/// Validate `args` against a declared schema. Returns the first violation.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    validate_value(schema, args, "arguments")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema_obj.get("type").and_then(|t| t.as_str()) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(format!(
                "{path}: value {value} is not one of the allowed values {}",
                Value::Array(allowed.clone())
            ));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
            for key in required.iter().filter_map(|k| k.as_str()) {
                if !obj.contains_key(key) {
                    return Err(format!("{path}: missing required field '{key}'"));
                }
            }
        }
        if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
            for (key, prop_schema) in properties {
                if let Some(field) = obj.get(key) {
                    validate_value(prop_schema, field, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema_obj.get("items"), value.as_array()) {
        for (idx, item) in array.iter().enumerate() {
            validate_value(items, item, &format!("{path}[{idx}]"))?;
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<(), String> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{path}: expected {expected}, got {}", type_name(value)))
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["read", "write"]},
                "path": {"type": "string"},
                "count": {"type": "integer"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["operation", "path"]
        })
    }

    #[test]
    fn valid_args_pass() {
        let args = json!({"operation": "read", "path": "/tmp/a", "count": 3});
        assert!(validate_args(&schema(), &args).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let args = json!({"operation": "read"});
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("missing required field 'path'"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let args = json!({"operation": "read", "path": 42});
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("expected string"));
    }

    #[test]
    fn enum_violation_is_reported() {
        let args = json!({"operation": "chmod", "path": "/tmp/a"});
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("not one of the allowed values"));
    }

    #[test]
    fn array_items_are_checked() {
        let args = json!({"operation": "read", "path": "/a", "tags": ["x", 1]});
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("tags[1]"));
    }

    #[test]
    fn non_object_args_fail_object_schema() {
        let err = validate_args(&schema(), &json!("nope")).unwrap_err();
        assert!(err.contains("expected object"));
    }
}
