//! # dietcheck-core
//!
//! Deterministic dietary compliance analysis engine.
//!
//! Given a product's raw ingredient, label and allergen data and a user's
//! dietary profile, this crate answers:
//! - Which dietary flags does the product carry, and how sure are we?
//! - Which of the user's restrictions does it violate?
//! - Is it safe for this user?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same product, profile and instant always produce the same result
//! 2. **Traceable**: Every finding cites evidence; every flag carries derivation notes
//! 3. **Safety first**: Allergy and medical findings can never be suppressed by a custom rule
//! 4. **Bounded**: Custom patterns run on a step-budgeted glob matcher
//!
//! ## Example
//!
//! ```rust,ignore
//! use dietcheck_core::{evaluate, AlertLevel, ProductSnapshot, UserDietaryProfile};
//!
//! let profile = UserDietaryProfile::from_yaml_file("profile.yaml")?;
//! let product: ProductSnapshot = serde_json::from_str(&json)?;
//! let result = evaluate(&product, &profile)?;
//!
//! match result.alert_level {
//!     AlertLevel::Safe => println!("OK"),
//!     AlertLevel::Caution => println!("CAUTION: {}", result.explanation.join("; ")),
//!     AlertLevel::Violation => println!("VIOLATION: {}", result.explanation.join("; ")),
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod deriver;
pub mod engine;
pub mod evidence;
pub mod ingredients;
pub mod keywords;
pub mod normalizer;
pub mod product;
pub mod profile;
pub mod resolver;
pub mod rules;
pub mod scorer;
pub mod types;

// Re-export main types at crate root
pub use config::{ConfigError, EngineConfig};
pub use engine::ComplianceEngine;
pub use evidence::Evidence;
pub use product::{InputError, ProductSnapshot};
pub use profile::{
    AllergyEntry, Comparison, CustomRestrictionRule, LifestyleTag, MedicalCondition,
    ProfileError, ReligiousTag, RuleAction, RuleScope, RuleStatus, TimeWindow,
    UserDietaryProfile,
};
pub use rules::{PatternError, RestrictionCheck};
pub use types::{
    AlertLevel, ComplianceResult, DerivationNote, DietaryFlag, EvidenceSource, EvidenceTier,
    Finding, FindingKind, FlagDerivation, NoteStage, RestrictionCategory, Severity,
    Suppression, TriState,
};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use thiserror::Error;

/// Errors that can occur during evaluation
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Invalid product: {0}")]
    Input(#[from] InputError),

    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
}

lazy_static! {
    static ref DEFAULT_ENGINE: ComplianceEngine =
        ComplianceEngine::new(EngineConfig::default()).expect("default engine config is valid");
}

/// The engine built from the default configuration.
pub fn default_engine() -> &'static ComplianceEngine {
    &DEFAULT_ENGINE
}

/// Evaluate a product against a profile at the current instant.
///
/// This is the main entry point. It uses the default configuration; build a
/// [`ComplianceEngine`] to inject a different one.
///
/// # Returns
///
/// A `ComplianceResult` containing:
/// - `alert_level`: SAFE, CAUTION or VIOLATION
/// - `violations` / `warnings`: findings with evidence
/// - `explanation`: ranked, truncated reasons
/// - `derivation_notes`: the full audit trail
pub fn evaluate(
    product: &ProductSnapshot,
    profile: &UserDietaryProfile,
) -> Result<ComplianceResult, EvaluationError> {
    DEFAULT_ENGINE.evaluate(product, profile)
}

/// Evaluate at a fixed instant. Custom rule lifecycles and time windows are
/// resolved against `now`.
pub fn evaluate_at(
    product: &ProductSnapshot,
    profile: &UserDietaryProfile,
    now: DateTime<Utc>,
) -> Result<ComplianceResult, EvaluationError> {
    DEFAULT_ENGINE.evaluate_at(product, profile, now)
}

/// Derive dietary flags for a product without a profile.
pub fn derive_flags(product: &ProductSnapshot) -> FlagDerivation {
    DEFAULT_ENGINE.derive_flags(product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_evaluation() {
        let profile_yaml = r#"
allergies:
  - allergen: peanuts
    severity: severe
lifestyle:
  - vegetarian
"#;

        let profile = UserDietaryProfile::from_yaml(profile_yaml).unwrap();
        let product = ProductSnapshot::new("3017620422003")
            .with_ingredients_text("Sugar, palm oil, hazelnuts 13%, skimmed milk powder 8.7%, cocoa")
            .with_allergen_tags(&["en:milk", "en:nuts"])
            .with_label_tags(&["en:vegetarian"]);

        let result = evaluate(&product, &profile).unwrap();

        assert!(result.safe);
        assert_eq!(result.alert_level, AlertLevel::Safe);
        assert_eq!(result.dietary_flags[&DietaryFlag::Vegetarian], TriState::Yes);
    }

    #[test]
    fn test_peanut_allergy_blocked() {
        let profile = UserDietaryProfile::new().with_allergy("peanuts", Severity::High);
        let product = ProductSnapshot::new("1").with_ingredients_text("Roasted peanuts, salt");

        let result = evaluate(&product, &profile).unwrap();

        assert!(!result.safe);
        assert_eq!(result.alert_level, AlertLevel::Violation);
        assert_eq!(result.violations[0].id, "allergy:peanuts");
    }

    #[test]
    fn test_derive_flags_without_profile() {
        let product = ProductSnapshot::new("1").with_label_tags(&["en:halal"]);
        let flags = derive_flags(&product);
        assert_eq!(flags.value(DietaryFlag::Halal), TriState::Yes);
        assert!(flags.confidence(DietaryFlag::Halal) >= 0.9);
    }
}
