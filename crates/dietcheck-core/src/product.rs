//! Product snapshot as handed over by the product lookup service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DietaryFlag, TriState};

/// Baseline data-quality score for products that do not carry one.
pub const DEFAULT_QUALITY_SCORE: f64 = 0.5;

fn default_quality_score() -> f64 {
    DEFAULT_QUALITY_SCORE
}

/// Structural problems that stop an evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Raw product metadata plus the output fields the engine fills in.
///
/// Field names accept both snake_case and the camelCase spellings used by
/// mobile clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    /// Stable identifier (usually the barcode)
    #[serde(default)]
    pub code: String,

    #[serde(default, alias = "ingredientsText", skip_serializing_if = "Option::is_none")]
    pub ingredients_text: Option<String>,

    #[serde(
        default,
        alias = "ingredientTags",
        alias = "ingredients_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingredient_tags: Option<Vec<String>>,

    #[serde(
        default,
        alias = "allergenTags",
        alias = "allergens_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub allergen_tags: Option<Vec<String>>,

    #[serde(
        default,
        alias = "labelTags",
        alias = "labels_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub label_tags: Option<Vec<String>>,

    #[serde(
        default,
        alias = "categoryTags",
        alias = "categories_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_tags: Option<Vec<String>>,

    /// Explicit analysis tags such as `en:non-vegan`
    #[serde(
        default,
        alias = "ingredientsAnalysisTags",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingredients_analysis_tags: Option<Vec<String>>,

    /// "May contain" cross-contamination tags
    #[serde(
        default,
        alias = "traceTags",
        alias = "traces_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub trace_tags: Option<Vec<String>>,

    /// Nutrient key (e.g. `sugars_100g`) -> value
    #[serde(
        default,
        alias = "nutritionalValues",
        alias = "nutriments",
        skip_serializing_if = "Option::is_none"
    )]
    pub nutritional_values: Option<BTreeMap<String, f64>>,

    // Output fields
    #[serde(default, alias = "dietaryFlags", skip_serializing_if = "Option::is_none")]
    pub dietary_flags: Option<BTreeMap<DietaryFlag, TriState>>,

    #[serde(default, alias = "confidenceScores", skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<BTreeMap<DietaryFlag, f64>>,

    /// Input baseline; replaced by the adjusted score on enrichment
    #[serde(default = "default_quality_score", alias = "qualityScore")]
    pub quality_score: f64,

    #[serde(default, alias = "completenessScore", skip_serializing_if = "Option::is_none")]
    pub completeness_score: Option<f64>,
}

impl ProductSnapshot {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ingredients_text: None,
            ingredient_tags: None,
            allergen_tags: None,
            label_tags: None,
            category_tags: None,
            ingredients_analysis_tags: None,
            trace_tags: None,
            nutritional_values: None,
            dietary_flags: None,
            confidence_scores: None,
            quality_score: DEFAULT_QUALITY_SCORE,
            completeness_score: None,
        }
    }

    pub fn with_ingredients_text(mut self, text: impl Into<String>) -> Self {
        self.ingredients_text = Some(text.into());
        self
    }

    pub fn with_ingredient_tags(mut self, tags: &[&str]) -> Self {
        self.ingredient_tags = Some(owned(tags));
        self
    }

    pub fn with_allergen_tags(mut self, tags: &[&str]) -> Self {
        self.allergen_tags = Some(owned(tags));
        self
    }

    pub fn with_label_tags(mut self, tags: &[&str]) -> Self {
        self.label_tags = Some(owned(tags));
        self
    }

    pub fn with_category_tags(mut self, tags: &[&str]) -> Self {
        self.category_tags = Some(owned(tags));
        self
    }

    pub fn with_analysis_tags(mut self, tags: &[&str]) -> Self {
        self.ingredients_analysis_tags = Some(owned(tags));
        self
    }

    pub fn with_trace_tags(mut self, tags: &[&str]) -> Self {
        self.trace_tags = Some(owned(tags));
        self
    }

    pub fn with_nutrient(mut self, key: impl Into<String>, value: f64) -> Self {
        self.nutritional_values
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = score;
        self
    }

    /// Reject products that cannot be evaluated at all.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.code.trim().is_empty() {
            return Err(InputError::MissingField("code"));
        }
        Ok(())
    }

    /// A nutrient value, ignoring NaN and infinities.
    pub fn nutrient(&self, key: &str) -> Option<f64> {
        self.nutritional_values
            .as_ref()
            .and_then(|values| values.get(key))
            .copied()
            .filter(|v| v.is_finite())
    }
}

fn owned(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_aliases() {
        let product: ProductSnapshot = serde_json::from_str(
            r#"{
                "code": "3017620422003",
                "ingredientsText": "sugar, palm oil",
                "allergenTags": ["en:milk"],
                "labels_tags": ["en:vegetarian"],
                "nutriments": {"sugars_100g": 56.3}
            }"#,
        )
        .unwrap();

        assert_eq!(product.ingredients_text.as_deref(), Some("sugar, palm oil"));
        assert_eq!(product.allergen_tags, Some(vec!["en:milk".to_string()]));
        assert_eq!(product.label_tags, Some(vec!["en:vegetarian".to_string()]));
        assert_eq!(product.nutrient("sugars_100g"), Some(56.3));
        assert_eq!(product.quality_score, DEFAULT_QUALITY_SCORE);
    }

    #[test]
    fn test_missing_code_is_input_error() {
        let product: ProductSnapshot = serde_json::from_str(r#"{"ingredients_text": "x"}"#).unwrap();
        assert_eq!(product.validate(), Err(InputError::MissingField("code")));

        let product = ProductSnapshot::new("   ");
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_non_finite_nutrient_is_ignored() {
        let product = ProductSnapshot::new("1")
            .with_nutrient("salt_100g", f64::NAN)
            .with_nutrient("sugars_100g", 3.0);
        assert_eq!(product.nutrient("salt_100g"), None);
        assert_eq!(product.nutrient("sugars_100g"), Some(3.0));
        assert_eq!(product.nutrient("fat_100g"), None);
    }
}
