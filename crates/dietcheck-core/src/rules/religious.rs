//! Religious check
//!
//! **Question**: Is the product certified for the user's religious
//! requirements?
//!
//! Halal and kosher are never assumed, so an unknown flag is treated like a
//! failed requirement unless the user tolerates uncertified products.

use std::collections::BTreeSet;

use crate::evidence::Evidence;
use crate::types::{Finding, RestrictionCategory, Severity, TriState};

use super::{CheckOutcome, RestrictionCheck, RuleContext};

pub struct ReligiousCheck;

impl ReligiousCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReligiousCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl RestrictionCheck for ReligiousCheck {
    fn category(&self) -> RestrictionCategory {
        RestrictionCategory::Religious
    }

    fn question(&self) -> &'static str {
        "Is the product certified for the user's religious requirements?"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let required: BTreeSet<_> = ctx.profile.religious.iter().map(|t| t.flag()).collect();

        for flag in required {
            let mut evidence = ctx.flags.evidence(flag).to_vec();
            evidence.push(Evidence::from_flag(
                format!("{} is {}", flag, ctx.flags.value(flag)),
                flag.as_str(),
            ));

            let finding = match ctx.flags.value(flag) {
                TriState::Yes => continue,
                TriState::No => Finding::violation(
                    RestrictionCategory::Religious,
                    flag.as_str(),
                    Severity::Medium,
                    ctx.flags.confidence(flag),
                    format!("Product is not {}", flag),
                ),
                TriState::Unknown if ctx.profile.tolerate_uncertified => Finding::warning(
                    RestrictionCategory::Religious,
                    flag.as_str(),
                    Severity::Low,
                    1.0,
                    format!("No {} certification found", flag),
                ),
                TriState::Unknown => Finding::violation(
                    RestrictionCategory::Religious,
                    flag.as_str(),
                    Severity::Medium,
                    1.0,
                    format!("{} status cannot be verified: no certification found", flag),
                ),
            };

            outcome.findings.push(finding.with_evidence(evidence));
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductSnapshot;
    use crate::profile::{ReligiousTag, UserDietaryProfile};
    use crate::rules::test_support::Fixture;
    use crate::types::FindingKind;

    fn run(product: ProductSnapshot, profile: UserDietaryProfile) -> CheckOutcome {
        let fixture = Fixture::new(product, profile);
        ReligiousCheck::new().evaluate(&fixture.context())
    }

    #[test]
    fn test_certified_passes() {
        let outcome = run(
            ProductSnapshot::new("1").with_label_tags(&["en:halal"]),
            UserDietaryProfile::new().with_religious(ReligiousTag::Halal),
        );
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_uncertified_is_violation() {
        let outcome = run(
            ProductSnapshot::new("1").with_ingredients_text("rice"),
            UserDietaryProfile::new().with_religious(ReligiousTag::Kosher),
        );
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].kind, FindingKind::Violation);
        assert_eq!(outcome.findings[0].severity, Severity::Medium);
        assert_eq!(outcome.findings[0].id, "religious:kosher");
    }

    #[test]
    fn test_tolerated_uncertified_is_low_warning() {
        let mut profile = UserDietaryProfile::new().with_religious(ReligiousTag::Halal);
        profile.tolerate_uncertified = true;
        let outcome = run(ProductSnapshot::new("1"), profile);
        assert_eq!(outcome.findings[0].kind, FindingKind::Warning);
        assert_eq!(outcome.findings[0].severity, Severity::Low);
    }

    #[test]
    fn test_pork_keyword_is_violation_even_when_tolerant() {
        let mut profile = UserDietaryProfile::new().with_religious(ReligiousTag::Halal);
        profile.tolerate_uncertified = true;
        let outcome = run(ProductSnapshot::new("1").with_ingredients_text("pork, salt"), profile);
        assert_eq!(outcome.findings[0].kind, FindingKind::Violation);
        assert_eq!(outcome.findings[0].confidence, 0.8);
    }
}
