//! Medical check
//!
//! **Question**: Does the product stay within the user's nutrient limits?
//!
//! Each condition's thresholds are upper limits per 100g. A condition without
//! thresholds uses the configured preset of the same name; explicit
//! thresholds override preset keys.

use std::collections::BTreeMap;

use crate::evidence::Evidence;
use crate::types::{DerivationNote, Finding, NoteStage, RestrictionCategory, Severity};

use super::{CheckOutcome, RestrictionCheck, RuleContext};

pub struct MedicalCheck;

impl MedicalCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MedicalCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// `High Cholesterol` and `high-cholesterol` both name the
/// `high_cholesterol` preset.
fn preset_key(condition: &str) -> String {
    condition
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl RestrictionCheck for MedicalCheck {
    fn category(&self) -> RestrictionCategory {
        RestrictionCategory::Medical
    }

    fn question(&self) -> &'static str {
        "Does the product stay within the user's nutrient limits?"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();

        for (i, condition) in ctx.profile.medical.iter().enumerate() {
            let key = preset_key(&condition.condition);
            let mut thresholds: BTreeMap<String, f64> = ctx
                .config
                .medical_presets
                .get(&key)
                .cloned()
                .unwrap_or_default();
            thresholds.extend(condition.thresholds.iter().map(|(k, v)| (k.clone(), *v)));

            if thresholds.is_empty() {
                outcome.notes.push(DerivationNote::new(
                    NoteStage::Rules,
                    format!(
                        "medical: no thresholds or preset for condition '{}'",
                        condition.condition
                    ),
                ));
                continue;
            }

            for (nutrient, max) in &thresholds {
                let profile_evidence = Evidence::from_profile(
                    format!("{} limit {} for {}", nutrient, max, condition.condition),
                    format!("profile.medical[{}].thresholds.{}", i, nutrient),
                );

                let mut finding = match ctx.product.nutrient(nutrient) {
                    Some(value) if value > *max => Finding::warning(
                        RestrictionCategory::Medical,
                        nutrient.clone(),
                        Severity::Medium,
                        1.0,
                        format!(
                            "{} is {} (limit {} for {})",
                            nutrient, value, max, condition.condition
                        ),
                    )
                    .with_evidence(vec![
                        Evidence::from_nutrition(format!("{} = {}", nutrient, value), nutrient),
                        profile_evidence,
                    ]),
                    Some(_) => continue,
                    None => Finding::warning(
                        RestrictionCategory::Medical,
                        nutrient.clone(),
                        Severity::Low,
                        0.0,
                        format!(
                            "Insufficient data: {} not reported (needed for {})",
                            nutrient, condition.condition
                        ),
                    )
                    .with_evidence(vec![profile_evidence]),
                };

                // Two conditions may limit the same nutrient
                finding.id = format!("medical:{}:{}", key, nutrient);
                outcome.findings.push(finding);
            }
        }

        outcome
    }
}
