//! Argument-schema hygiene
//!
//! Some dialects reject JSON-Schema keywords that others tolerate. Adapters
//! for those dialects pass declared schemas through `sanitize_schema` before
//! building the request payload.

use serde_json::Value;

/// Keywords stripped recursively for dialects that reject them.
const STRIPPED_KEYWORDS: [&str; 5] = [
    "$schema",
    "additionalProperties",
    "default",
    "examples",
    "title",
];

/// Return a copy of `schema` with unsupported keywords removed at every level.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned = map
                .iter()
                .filter(|(k, _)| !STRIPPED_KEYWORDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize_schema(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_unsupported_keywords_at_top_level() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "additionalProperties": false,
            "title": "X",
            "type": "object",
            "properties": {"n": {"type": "number"}}
        });
        let cleaned = sanitize_schema(&schema);
        assert_eq!(
            cleaned,
            json!({
                "type": "object",
                "properties": {"n": {"type": "number"}}
            })
        );
    }

    #[test]
    fn strips_recursively_inside_properties_and_arrays() {
        let schema = json!({
            "type": "object",
            "properties": {
                "item": {
                    "type": "object",
                    "default": {},
                    "properties": {
                        "tags": {
                            "type": "array",
                            "examples": [["a"]],
                            "items": {"type": "string", "title": "Tag"}
                        }
                    }
                }
            }
        });
        let cleaned = sanitize_schema(&schema);
        assert!(cleaned["properties"]["item"].get("default").is_none());
        assert!(cleaned["properties"]["item"]["properties"]["tags"]
            .get("examples")
            .is_none());
        assert!(cleaned["properties"]["item"]["properties"]["tags"]["items"]
            .get("title")
            .is_none());
        assert_eq!(
            cleaned["properties"]["item"]["properties"]["tags"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn keeps_enum_and_required() {
        let schema = json!({
            "type": "object",
            "required": ["op"],
            "properties": {"op": {"type": "string", "enum": ["read", "write"]}}
        });
        assert_eq!(sanitize_schema(&schema), schema);
    }
}
