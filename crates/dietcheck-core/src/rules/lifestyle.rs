//! Lifestyle check
//!
//! **Question**: Does the product match the user's chosen diet?
//!
//! Lifestyle choices are advisory unless the profile is in strict mode.

use std::collections::BTreeSet;

use crate::evidence::Evidence;
use crate::types::{Finding, FindingKind, RestrictionCategory, Severity, TriState};

use super::{CheckOutcome, RestrictionCheck, RuleContext};

pub struct LifestyleCheck;

impl LifestyleCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LifestyleCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RestrictionCheck for LifestyleCheck {
    fn category(&self) -> RestrictionCategory {
        RestrictionCategory::Lifestyle
    }

    fn question(&self) -> &'static str {
        "Does the product match the user's chosen diet?"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let strict = ctx.profile.strict_mode;
        let chosen: BTreeSet<_> = ctx.profile.lifestyle.iter().map(|t| t.flag()).collect();

        for flag in chosen {
            let value = ctx.flags.value(flag);
            let (severity, confidence, message) = match value {
                TriState::Yes => continue,
                TriState::No => (
                    Severity::Medium,
                    ctx.flags.confidence(flag),
                    format!("Product is not {}", flag),
                ),
                TriState::Unknown => (
                    Severity::Low,
                    1.0,
                    format!("Could not determine whether the product is {}", flag),
                ),
            };

            let (kind, severity) = if strict {
                (FindingKind::Violation, Severity::High)
            } else {
                (FindingKind::Warning, severity)
            };

            let mut evidence = ctx.flags.evidence(flag).to_vec();
            evidence.push(Evidence::from_flag(format!("{} is {}", flag, value), flag.as_str()));

            outcome.findings.push(
                Finding::new(
                    kind,
                    RestrictionCategory::Lifestyle,
                    flag.as_str(),
                    severity,
                    confidence,
                    message,
                )
                .with_evidence(evidence),
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductSnapshot;
    use crate::profile::{LifestyleTag, UserDietaryProfile};
    use crate::rules::test_support::Fixture;

    fn run(product: ProductSnapshot, profile: UserDietaryProfile) -> CheckOutcome {
        let fixture = Fixture::new(product, profile);
        LifestyleCheck::new().evaluate(&fixture.context())
    }

    #[test]
    fn test_non_vegan_is_medium_warning() {
        let outcome = run(
            ProductSnapshot::new("1").with_analysis_tags(&["en:non-vegan"]),
            UserDietaryProfile::new().with_lifestyle(LifestyleTag::Vegan),
        );
        let f = &outcome.findings[0];
        assert_eq!(f.kind, FindingKind::Warning);
        assert_eq!(f.severity, Severity::Medium);
        assert_eq!(f.confidence, 0.8);
    }

    #[test]
    fn test_strict_mode_escalates() {
        let outcome = run(
            ProductSnapshot::new("1").with_analysis_tags(&["en:non-vegan"]),
            UserDietaryProfile::new().with_lifestyle(LifestyleTag::Vegan).strict(),
        );
        let f = &outcome.findings[0];
        assert_eq!(f.kind, FindingKind::Violation);
        assert_eq!(f.severity, Severity::High);
        assert_eq!(f.id, "lifestyle:vegan");
    }

    #[test]
    fn test_unknown_organic_is_low_warning() {
        let outcome = run(
            ProductSnapshot::new("1"),
            UserDietaryProfile::new().with_lifestyle(LifestyleTag::Organic),
        );
        assert_eq!(outcome.findings[0].severity, Severity::Low);
        assert_eq!(outcome.findings[0].kind, FindingKind::Warning);
    }

    #[test]
    fn test_assumed_gluten_free_passes() {
        let outcome = run(
            ProductSnapshot::new("1").with_ingredients_text("rice flour, sugar"),
            UserDietaryProfile::new().with_lifestyle(LifestyleTag::GlutenFree),
        );
        assert!(outcome.findings.is_empty());
    }
}
