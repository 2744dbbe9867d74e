//! Side-effect collaborators invoked when certain tools complete

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Tool whose completion persists a memory
pub const SAVE_TO_MEMORY: &str = "save_to_memory";
/// Tool whose completion updates a side panel
pub const UPDATE_PANEL: &str = "update_panel";

/// Persists memories the agent decides to keep
#[async_trait]
pub trait MemoryCollaborator: Send + Sync {
    /// Store a memory; the returned payload replaces the tool result
    async fn save(&self, parameters: &Value) -> Result<Value>;
}

/// Applies side panel updates
#[async_trait]
pub trait PanelCollaborator: Send + Sync {
    /// JSON Schema the update parameters must satisfy
    fn parameters_schema(&self) -> Value {
        default_panel_schema()
    }

    /// Apply an update; the returned payload replaces the tool result
    async fn update(&self, panel_type: &str, parameters: &Value) -> Result<Value>;
}

/// Schema requiring a string `panel_type` discriminator
pub fn default_panel_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "panel_type": { "type": "string", "minLength": 1 }
        },
        "required": ["panel_type"]
    })
}

/// Payload attached to a completion whose side-effect failed
pub fn failure_payload(message: impl Into<String>) -> Value {
    json!({ "success": false, "message": message.into() })
}

/// Recover tool parameters from a completion.
///
/// Looks at the explicit parameters first, then at `result.parameters`, and
/// finally treats the result itself as the parameters.
pub fn recover_parameters(parameters: Option<&Value>, result: &Value) -> Value {
    if let Some(params) = parameters.filter(|p| !p.is_null()) {
        return params.clone();
    }
    if let Some(params) = result.get("parameters").filter(|p| !p.is_null()) {
        return params.clone();
    }
    result.clone()
}

/// Normalize the panel discriminator so schema validation sees `panel_type`
pub(crate) fn with_panel_type(mut parameters: Value) -> Value {
    if let Value::Object(ref mut map) = parameters {
        if !map.contains_key("panel_type") {
            if let Some(kind) = map.get("type").cloned() {
                map.insert("panel_type".to_string(), kind);
            }
        }
    }
    parameters
}

/// Validate panel parameters with a pre-compiled validator
pub(crate) fn validate_panel_parameters(
    parameters: &Value,
    validator: &jsonschema::Validator,
) -> Result<String> {
    let errors: Vec<String> = validator
        .iter_errors(parameters)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if !errors.is_empty() {
        return Err(Error::InvalidParameters(errors.join("; ")));
    }

    parameters
        .get("panel_type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidParameters("panel_type must be a string".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> jsonschema::Validator {
        jsonschema::validator_for(&default_panel_schema()).unwrap()
    }

    #[test]
    fn test_recover_prefers_explicit_parameters() {
        let params = json!({"key": "home_airport"});
        let result = json!({"parameters": {"key": "other"}});
        assert_eq!(recover_parameters(Some(&params), &result), params);
    }

    #[test]
    fn test_recover_from_result_envelope() {
        let result = json!({"parameters": {"key": "seat", "value": "aisle"}});
        assert_eq!(
            recover_parameters(None, &result),
            json!({"key": "seat", "value": "aisle"})
        );
    }

    #[test]
    fn test_recover_falls_back_to_result() {
        let result = json!({"key": "seat"});
        assert_eq!(recover_parameters(Some(&Value::Null), &result), result);
    }

    #[test]
    fn test_panel_type_alias() {
        let params = with_panel_type(json!({"type": "itinerary", "data": {}}));
        assert_eq!(params["panel_type"], "itinerary");
    }

    #[test]
    fn test_validate_panel_parameters_ok() {
        let params = json!({"panel_type": "map", "data": {"pins": 3}});
        assert_eq!(validate_panel_parameters(&params, &validator()).unwrap(), "map");
    }

    #[test]
    fn test_validate_panel_parameters_missing_type() {
        let err = validate_panel_parameters(&json!({"data": {}}), &validator()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
        assert!(err.to_string().contains("panel_type"));
    }

    #[test]
    fn test_validate_panel_parameters_wrong_type() {
        let err = validate_panel_parameters(&json!({"panel_type": 7}), &validator()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
    }

    #[test]
    fn test_failure_payload_shape() {
        assert_eq!(
            failure_payload("disk full"),
            json!({"success": false, "message": "disk full"})
        );
    }
}
