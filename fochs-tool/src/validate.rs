//! Structural validation of tool input against its JSON Schema.

use serde_json::Value;

use crate::ToolError;

/// Validate a tool input against the tool's input schema.
///
/// Lightweight structural checks, no full JSON Schema engine:
/// - `null` input counts as `{}`; any other non-object input is rejected
/// - every `"required"` field must be present
/// - every input field must be declared under `"properties"`, unless the
///   schema sets `"additionalProperties": true`
/// - declared property `"type"`s must match
pub fn validate_input(input: &Value, schema: &Value) -> Result<(), ToolError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    let empty = serde_json::Map::new();
    let input_obj = match input {
        Value::Object(obj) => obj,
        Value::Null => &empty,
        other => {
            return Err(ToolError::InvalidInput(format!(
                "expected object input, got {}",
                json_type_name(other)
            )));
        }
    };

    if let Some(Value::Array(required)) = schema_obj.get("required") {
        for field_name in required.iter().filter_map(Value::as_str) {
            if !input_obj.contains_key(field_name) {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field: {field_name}"
                )));
            }
        }
    }

    let properties = schema_obj.get("properties").and_then(Value::as_object);
    let open = matches!(schema_obj.get("additionalProperties"), Some(Value::Bool(true)));

    for (field_name, value) in input_obj {
        match properties.and_then(|props| props.get(field_name)) {
            Some(prop_schema) => {
                if let Some(Value::String(expected)) = prop_schema.get("type") {
                    if !json_type_matches(value, expected) {
                        return Err(ToolError::InvalidInput(format!(
                            "field '{field_name}' expected type '{expected}', got {}",
                            json_type_name(value)
                        )));
                    }
                }
            }
            None if open => {}
            None => {
                return Err(ToolError::InvalidInput(format!(
                    "unexpected field: {field_name}"
                )));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
