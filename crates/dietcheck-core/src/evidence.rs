//! Evidence linking for compliance findings.
//!
//! Every derived flag and every finding points back at the product field,
//! profile entry or text span that supports it.

use serde::{Deserialize, Serialize};

use crate::types::EvidenceSource;

/// A piece of evidence supporting a flag or finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// What this evidence supports
    pub claim: String,

    /// Where the evidence comes from
    pub source: EvidenceSource,

    /// Pointer to the location (e.g., "label_tags[2]", "ingredients_text[14:19]")
    pub pointer: String,
}

impl Evidence {
    /// Evidence from an entry of one of the product's tag arrays.
    pub fn from_tag(claim: impl Into<String>, source: EvidenceSource, index: usize) -> Self {
        Self {
            claim: claim.into(),
            source,
            pointer: format!("{}[{}]", source.field_name(), index),
        }
    }

    /// Evidence from a span of the normalized ingredient text.
    pub fn from_ingredients(claim: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::IngredientsText,
            pointer: format!("ingredients_text[{}:{}]", start, end),
        }
    }

    /// Evidence from a nutritional value.
    pub fn from_nutrition(claim: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::Nutrition,
            pointer: format!("nutritional_values.{}", key.as_ref()),
        }
    }

    /// Evidence from the user's profile (e.g., "profile.allergies[0]").
    pub fn from_profile(claim: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::Profile,
            pointer: path.into(),
        }
    }

    /// Evidence from a flag produced earlier in the pipeline.
    pub fn from_flag(claim: impl Into<String>, flag: impl AsRef<str>) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::DerivedFlags,
            pointer: format!("dietary_flags.{}", flag.as_ref()),
        }
    }
}
