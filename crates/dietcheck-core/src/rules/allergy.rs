//! Allergy check
//!
//! **Question**: Does the product contain, or risk containing, an allergen
//! the user declared?
//!
//! Declared allergen tags and ingredient keyword matches for the same
//! allergen merge into one violation. "May contain" traces are a warning,
//! or a violation when the allergy is severe.

use std::collections::BTreeMap;

use crate::evidence::Evidence;
use crate::types::{DerivationNote, Finding, NoteStage, RestrictionCategory, Severity};

use super::{CheckOutcome, RestrictionCheck, RuleContext};

pub struct AllergyCheck;

impl AllergyCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AllergyCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// Profile entries collapsed by canonical allergen.
struct Declared {
    severity: Severity,
    profile_index: usize,
}

impl RestrictionCheck for AllergyCheck {
    fn category(&self) -> RestrictionCategory {
        RestrictionCategory::Allergy
    }

    fn question(&self) -> &'static str {
        "Does the product contain or risk containing a declared allergen?"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let policy = &ctx.config.confidence;

        let mut declared: BTreeMap<String, Declared> = BTreeMap::new();
        for (i, entry) in ctx.profile.allergies.iter().enumerate() {
            let canonical = ctx.normalizer.canonical_token(&entry.allergen);
            let slot = declared.entry(canonical).or_insert(Declared {
                severity: entry.severity,
                profile_index: i,
            });
            slot.severity = slot.severity.max(entry.severity);
        }

        for (allergen, decl) in &declared {
            let profile_evidence = Evidence::from_profile(
                format!("{} allergy ({})", allergen, decl.severity.clinical_term()),
                format!("profile.allergies[{}]", decl.profile_index),
            );

            let mut evidence = Vec::new();
            let mut confidence: f64 = 0.0;
            let mut sources = Vec::new();

            if let Some(refs) = ctx.tags.allergens.get(allergen) {
                for tag in refs {
                    evidence.push(tag.evidence(format!("Declared allergen '{}'", tag.raw)));
                }
                confidence = confidence.max(policy.allergen_tag);
                sources.push("declared on label".to_string());
            }

            let hits = match ctx.keywords.allergen(allergen) {
                Some(matcher) => matcher.scan(ctx.ingredients),
                None => match ctx.keywords.fallback_allergen(allergen) {
                    Ok(matcher) => matcher.scan(ctx.ingredients),
                    Err(e) => {
                        tracing::warn!(allergen = %allergen, error = %e, "Could not build allergen matcher");
                        outcome.notes.push(DerivationNote::new(
                            NoteStage::Rules,
                            format!("allergy: no keyword matcher for '{}': {}", allergen, e),
                        ));
                        Vec::new()
                    }
                },
            };
            if !hits.is_empty() {
                let mut keywords: Vec<&str> = Vec::new();
                for hit in &hits {
                    evidence.push(hit.evidence(format!("Ingredient '{}' contains {}", hit.keyword, allergen)));
                    if !keywords.contains(&hit.keyword.as_str()) {
                        keywords.push(&hit.keyword);
                    }
                }
                confidence = confidence.max(policy.allergen_keyword);
                sources.push(format!("ingredient {}", keywords.join(", ")));
            }

            if !evidence.is_empty() {
                evidence.push(profile_evidence);
                outcome.findings.push(
                    Finding::violation(
                        RestrictionCategory::Allergy,
                        allergen.clone(),
                        decl.severity,
                        confidence,
                        format!(
                            "Contains {} ({}); {} allergy",
                            allergen,
                            sources.join("; "),
                            decl.severity.clinical_term()
                        ),
                    )
                    .with_evidence(evidence),
                );
                continue;
            }

            if let Some(refs) = ctx.tags.traces.get(allergen) {
                let mut evidence: Vec<Evidence> = refs
                    .iter()
                    .map(|tag| tag.evidence(format!("May contain '{}'", tag.raw)))
                    .collect();
                evidence.push(profile_evidence);

                let message = format!(
                    "May contain traces of {}; {} allergy",
                    allergen,
                    decl.severity.clinical_term()
                );
                let finding = if decl.severity.is_severe() {
                    Finding::violation(
                        RestrictionCategory::Allergy,
                        allergen.clone(),
                        decl.severity,
                        policy.trace_tag,
                        message,
                    )
                } else {
                    Finding::warning(
                        RestrictionCategory::Allergy,
                        allergen.clone(),
                        decl.severity,
                        policy.trace_tag,
                        message,
                    )
                };
                outcome.findings.push(finding.with_evidence(evidence));
            }
        }

        tracing::debug!(
            declared = declared.len(),
            findings = outcome.findings.len(),
            "Allergy check complete"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductSnapshot;
    use crate::profile::UserDietaryProfile;
    use crate::rules::test_support::Fixture;
    use crate::types::FindingKind;

    fn run(product: ProductSnapshot, profile: UserDietaryProfile) -> CheckOutcome {
        let fixture = Fixture::new(product, profile);
        AllergyCheck::new().evaluate(&fixture.context())
    }

    #[test]
    fn test_declared_allergen_is_violation() {
        let outcome = run(
            ProductSnapshot::new("1").with_allergen_tags(&["en:milk"]),
            UserDietaryProfile::new().with_allergy("milk", Severity::High),
        );

        assert_eq!(outcome.findings.len(), 1);
        let f = &outcome.findings[0];
        assert_eq!(f.id, "allergy:milk");
        assert_eq!(f.kind, FindingKind::Violation);
        assert_eq!(f.severity, Severity::High);
        assert_eq!(f.confidence, 0.95);
        assert_eq!(f.message, "Contains milk (declared on label); severe allergy");
    }

    #[test]
    fn test_tag_and_keyword_merge_and_synonyms() {
        let outcome = run(
            ProductSnapshot::new("1")
                .with_allergen_tags(&["fr:lait"])
                .with_ingredients_text("sugar, whey, skimmed milk powder"),
            UserDietaryProfile::new()
                .with_allergy("dairy", Severity::Medium)
                .with_allergy("en:milk", Severity::Critical),
        );

        assert_eq!(outcome.findings.len(), 1);
        let f = &outcome.findings[0];
        assert_eq!(f.subject, "milk");
        assert_eq!(f.severity, Severity::Critical);
        // 1 tag + 2 keywords + profile
        assert_eq!(f.evidence.len(), 4);
    }

    #[test]
    fn test_keyword_only_match() {
        let outcome = run(
            ProductSnapshot::new("1").with_ingredients_text("roasted peanuts, salt"),
            UserDietaryProfile::new().with_allergy("peanut", Severity::Low),
        );
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].confidence, 0.75);
        assert_eq!(outcome.findings[0].severity, Severity::Low);
    }

    #[test]
    fn test_traces_depend_on_severity() {
        let product = ProductSnapshot::new("1").with_trace_tags(&["en:nuts"]);

        let mild = run(product.clone(), UserDietaryProfile::new().with_allergy("nuts", Severity::Medium));
        assert_eq!(mild.findings[0].kind, FindingKind::Warning);

        let severe = run(product, UserDietaryProfile::new().with_allergy("tree-nuts", Severity::High));
        assert_eq!(severe.findings[0].kind, FindingKind::Violation);
        assert_eq!(severe.findings[0].id, "allergy:nuts");
    }

    #[test]
    fn test_unknown_allergen_uses_its_name() {
        let outcome = run(
            ProductSnapshot::new("1").with_ingredients_text("water, kiwi pulp"),
            UserDietaryProfile::new().with_allergy("kiwi", Severity::High),
        );
        assert_eq!(outcome.findings.len(), 1);
    }

    #[test]
    fn test_cocoa_butter_is_not_milk() {
        let outcome = run(
            ProductSnapshot::new("1").with_ingredients_text("cocoa butter, sugar"),
            UserDietaryProfile::new().with_allergy("milk", Severity::High),
        );
        assert!(outcome.findings.is_empty());
    }
}
