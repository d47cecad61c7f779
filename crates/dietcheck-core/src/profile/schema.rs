//! JSON Schema validation for profiles.
//!
//! Profiles are validated against `schema/profile.schema.json` before they
//! are deserialized, so users get every problem with its location at once.

use std::sync::OnceLock;

const PROFILE_SCHEMA_JSON: &str = include_str!("../../schema/profile.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(PROFILE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(|e| format!("Failed to load schema: {}", e))
}

/// Validate a profile document against the schema.
///
/// Returns every validation error as `"<message> at <instance path>"`.
pub fn validate_profile_schema(profile_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(profile_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a profile document without collecting messages.
pub fn is_valid_profile(profile_json: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(profile_json))
        .unwrap_or(false)
}
