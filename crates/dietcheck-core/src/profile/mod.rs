//! User dietary profiles.
//!
//! A profile holds the user's allergies, religious and lifestyle
//! requirements, medical thresholds and custom rules. Profiles are loaded
//! from YAML or JSON, checked against the embedded JSON Schema and then
//! structurally validated.

mod custom_rule;
mod parser;
mod schema;

pub use custom_rule::{
    Comparison, CustomRestrictionRule, RuleAction, RuleScope, RuleStatus, TimeWindow,
};
pub use parser::ProfileError;
pub use schema::{is_valid_profile, validate_profile_schema};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DietaryFlag, Severity};

fn default_allergy_severity() -> Severity {
    Severity::High
}

/// One allergy entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergyEntry {
    /// Allergen name in any supported spelling (`milk`, `lait`, `en:milk`)
    pub allergen: String,

    #[serde(default = "default_allergy_severity")]
    pub severity: Severity,
}

impl AllergyEntry {
    pub fn new(allergen: impl Into<String>, severity: Severity) -> Self {
        Self {
            allergen: allergen.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReligiousTag {
    Halal,
    Kosher,
}

impl ReligiousTag {
    pub fn flag(&self) -> DietaryFlag {
        match self {
            ReligiousTag::Halal => DietaryFlag::Halal,
            ReligiousTag::Kosher => DietaryFlag::Kosher,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifestyleTag {
    Vegan,
    Vegetarian,
    #[serde(alias = "gluten-free")]
    GlutenFree,
    Organic,
    Kosher,
    Halal,
}

impl LifestyleTag {
    pub fn flag(&self) -> DietaryFlag {
        match self {
            LifestyleTag::Vegan => DietaryFlag::Vegan,
            LifestyleTag::Vegetarian => DietaryFlag::Vegetarian,
            LifestyleTag::GlutenFree => DietaryFlag::GlutenFree,
            LifestyleTag::Organic => DietaryFlag::Organic,
            LifestyleTag::Kosher => DietaryFlag::Kosher,
            LifestyleTag::Halal => DietaryFlag::Halal,
        }
    }
}

/// A medical condition with per-nutrient upper limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalCondition {
    pub condition: String,

    /// Nutrient key -> maximum per 100g. Empty means "use the preset".
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

/// Everything the engine knows about one user's restrictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDietaryProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub allergies: Vec<AllergyEntry>,

    #[serde(default)]
    pub religious: Vec<ReligiousTag>,

    #[serde(default)]
    pub medical: Vec<MedicalCondition>,

    #[serde(default)]
    pub lifestyle: Vec<LifestyleTag>,

    #[serde(default)]
    pub custom_rules: Vec<CustomRestrictionRule>,

    /// Turn lifestyle warnings into violations
    #[serde(default)]
    pub strict_mode: bool,

    /// Accept uncertified products for religious requirements (warning only)
    #[serde(default)]
    pub tolerate_uncertified: bool,
}

impl UserDietaryProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allergy(mut self, allergen: impl Into<String>, severity: Severity) -> Self {
        self.allergies.push(AllergyEntry::new(allergen, severity));
        self
    }

    pub fn with_religious(mut self, tag: ReligiousTag) -> Self {
        self.religious.push(tag);
        self
    }

    pub fn with_lifestyle(mut self, tag: LifestyleTag) -> Self {
        self.lifestyle.push(tag);
        self
    }

    pub fn with_medical(
        mut self,
        condition: impl Into<String>,
        thresholds: &[(&str, f64)],
    ) -> Self {
        self.medical.push(MedicalCondition {
            condition: condition.into(),
            thresholds: thresholds
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        });
        self
    }

    pub fn with_rule(mut self, rule: CustomRestrictionRule) -> Self {
        self.custom_rules.push(rule);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Flags some religious or lifestyle requirement depends on.
    pub fn required_flags(&self) -> BTreeSet<DietaryFlag> {
        self.religious
            .iter()
            .map(ReligiousTag::flag)
            .chain(self.lifestyle.iter().map(LifestyleTag::flag))
            .collect()
    }

    /// Active rules at `now` with their list positions, in evaluation order:
    /// priority descending, then creation instant, then list position.
    pub fn active_rules(&self, now: DateTime<Utc>) -> Vec<(usize, &CustomRestrictionRule)> {
        let mut rules: Vec<(usize, &CustomRestrictionRule)> = self
            .custom_rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_active_at(now))
            .collect();

        rules.sort_by(|(ia, a), (ib, b)| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| match (a.created_at, b.created_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| ia.cmp(ib))
        });

        rules
    }

    pub fn is_empty(&self) -> bool {
        self.allergies.is_empty()
            && self.religious.is_empty()
            && self.medical.is_empty()
            && self.lifestyle.is_empty()
            && self.custom_rules.is_empty()
    }
}
