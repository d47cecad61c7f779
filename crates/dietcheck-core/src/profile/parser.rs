//! Profile parsing from YAML/JSON.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;

use super::schema::validate_profile_schema;
use super::UserDietaryProfile;

/// Errors that can occur when loading a profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Profile does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Profile validation failed: {0}")]
    ValidationError(String),
}

impl UserDietaryProfile {
    /// Parse a profile from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ProfileError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a profile from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a profile from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a profile from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Schema-check, deserialize and validate an already-parsed document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProfileError> {
        validate_profile_schema(&value).map_err(ProfileError::SchemaError)?;
        let profile: UserDietaryProfile = serde_json::from_value(value)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Structural checks the schema cannot express.
    ///
    /// Pattern syntax is not checked here: a malformed pattern only disables
    /// its own rule at evaluation time.
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.validate_conditions()?;
        self.validate_rules()
    }

    /// Checks on the allergy and medical sections, which evaluation cannot
    /// work around. Custom rules are checked one by one as they are evaluated.
    pub fn validate_conditions(&self) -> Result<(), ProfileError> {
        for (i, allergy) in self.allergies.iter().enumerate() {
            if allergy.allergen.trim().is_empty() {
                return Err(invalid(format!("allergies[{}].allergen is empty", i)));
            }
        }

        for (i, medical) in self.medical.iter().enumerate() {
            if medical.condition.trim().is_empty() {
                return Err(invalid(format!("medical[{}].condition is empty", i)));
            }
            for (nutrient, max) in &medical.thresholds {
                if !max.is_finite() || *max < 0.0 {
                    return Err(invalid(format!(
                        "medical[{}].thresholds.{} must be a finite non-negative number",
                        i, nutrient
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_rules(&self) -> Result<(), ProfileError> {
        let mut seen = HashSet::new();

        for (i, rule) in self.custom_rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(invalid(format!("custom_rules[{}].id is empty", i)));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(invalid(format!("Duplicate custom rule id: {}", rule.id)));
            }
            if rule.scope.pattern().is_some_and(|p| p.trim().is_empty()) {
                return Err(invalid(format!("rule {}: pattern is empty", rule.id)));
            }
            rule.check()
                .map_err(|e| invalid(format!("rule {}: {}", rule.id, e)))?;
        }

        Ok(())
    }
}

fn invalid(message: String) -> ProfileError {
    ProfileError::ValidationError(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{
        Comparison, LifestyleTag, ReligiousTag, RuleAction, RuleScope, RuleStatus,
    };
    use crate::types::Severity;

    const SAMPLE_YAML: &str = r#"
id: user-42
allergies:
  - allergen: milk
    severity: severe
  - allergen: peanuts
religious: [halal]
lifestyle: [vegan]
medical:
  - condition: diabetes
  - condition: hypertension
    thresholds:
      salt_100g: 1.0
strict_mode: true
custom_rules:
  - id: no-sulfites
    priority: 10
    scope:
      type: ingredient_pattern
      pattern: "sulfite*"
    action: block
  - id: late-caffeine
    priority: 3
    status: draft
    scope:
      type: temporal
      window:
        kind: daily
        start: "20:00:00"
        end: "06:00:00"
      pattern: "caffeine*"
    action: warn
  - id: low-protein
    scope:
      type: nutritional_threshold
      nutrient: proteins_100g
      comparison: below
      value: 2
    action: warn
    severity: low
"#;

    #[test]
    fn test_parse_yaml_profile() {
        let profile = UserDietaryProfile::from_yaml(SAMPLE_YAML).unwrap();

        assert_eq!(profile.id.as_deref(), Some("user-42"));
        assert_eq!(profile.allergies.len(), 2);
        assert_eq!(profile.allergies[0].severity, Severity::High);
        assert_eq!(profile.allergies[1].severity, Severity::High);
        assert_eq!(profile.religious, vec![ReligiousTag::Halal]);
        assert_eq!(profile.lifestyle, vec![LifestyleTag::Vegan]);
        assert!(profile.medical[0].thresholds.is_empty());
        assert!(profile.strict_mode);
        assert!(!profile.tolerate_uncertified);

        assert_eq!(profile.custom_rules[0].action, RuleAction::Block);
        assert_eq!(profile.custom_rules[1].status, RuleStatus::Draft);
        assert!(matches!(
            profile.custom_rules[2].scope,
            RuleScope::NutritionalThreshold {
                comparison: Comparison::Below,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_json_profile() {
        let profile = UserDietaryProfile::from_json(
            r#"{"allergies": [{"allergen": "lait", "severity": "anaphylactic"}], "lifestyle": ["gluten_free"]}"#,
        )
        .unwrap();
        assert_eq!(profile.allergies[0].severity, Severity::Critical);
        assert_eq!(profile.lifestyle, vec![LifestyleTag::GlutenFree]);
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let result = UserDietaryProfile::from_json(r#"{"allergys": []}"#);
        assert!(matches!(result, Err(ProfileError::SchemaError(_))));
    }

    #[test]
    fn test_duplicate_rule_ids_rejected() {
        let yaml = r#"
custom_rules:
  - id: r1
    scope: {type: ingredient_pattern, pattern: "a*"}
    action: warn
  - id: r1
    scope: {type: ingredient_pattern, pattern: "b*"}
    action: block
"#;
        let result = UserDietaryProfile::from_yaml(yaml);
        assert!(matches!(result, Err(ProfileError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_pattern_still_loads() {
        let yaml = r#"
custom_rules:
  - id: regexy
    scope: {type: ingredient_pattern, pattern: "(a+)+$"}
    action: block
"#;
        assert!(UserDietaryProfile::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_reversed_absolute_window_rejected() {
        let yaml = r#"
custom_rules:
  - id: window
    scope:
      type: temporal
      window: {kind: absolute, start: "2025-02-01T00:00:00Z", end: "2025-01-01T00:00:00Z"}
    action: warn
"#;
        let result = UserDietaryProfile::from_yaml(yaml);
        assert!(matches!(result, Err(ProfileError::ValidationError(_))));
    }

    #[test]
    fn test_empty_document_is_empty_profile() {
        let profile = UserDietaryProfile::from_json("{}").unwrap();
        assert!(profile.is_empty());
    }
}
