//! Alert Aggregator: reduces findings to one alert level.
//!
//! The policy is fixed:
//! 1. Any violation with severity >= high, or any allergy violation -> VIOLATION
//! 2. Else any finding, or a low-confidence flag the profile relies on -> CAUTION
//! 3. Else -> SAFE

use std::cmp::Ordering;

use crate::config::EngineConfig;
use crate::profile::UserDietaryProfile;
use crate::types::{
    AlertLevel, DerivationNote, Finding, FindingKind, FlagDerivation, NoteStage,
    RestrictionCategory, Severity,
};

/// The aggregate verdict and its ranked reasons.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub safe: bool,
    pub alert_level: AlertLevel,
    pub violations: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub explanation: Vec<String>,
    pub notes: Vec<DerivationNote>,
}

/// An explanation line candidate.
struct Reason {
    severity: Severity,
    confidence: f64,
    kind: FindingKind,
    id: String,
    text: String,
}

pub struct AlertAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> AlertAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        findings: Vec<Finding>,
        flags: &FlagDerivation,
        profile: &UserDietaryProfile,
    ) -> Verdict {
        let threshold = self.config.scoring.low_confidence_threshold;
        let mut notes = Vec::new();

        let (mut violations, mut warnings): (Vec<_>, Vec<_>) =
            findings.into_iter().partition(Finding::is_violation);
        violations.sort_by(rank);
        warnings.sort_by(rank);

        // Flags the profile depends on but the evidence barely supports
        let mut reasons: Vec<Reason> = Vec::new();
        for flag in profile.required_flags() {
            let confidence = flags.confidence(flag);
            if confidence >= threshold {
                continue;
            }
            let covered = violations
                .iter()
                .chain(warnings.iter())
                .any(|f| f.subject == flag.as_str());
            if covered {
                continue;
            }
            notes.push(DerivationNote::new(
                NoteStage::Aggregator,
                format!(
                    "{} confidence {:.2} is below {:.2}",
                    flag, confidence, threshold
                ),
            ));
            reasons.push(Reason {
                severity: Severity::Low,
                confidence,
                kind: FindingKind::Warning,
                id: format!("confidence:{}", flag),
                text: format!(
                    "notice [low] Low confidence ({:.2}) that the product is {}",
                    confidence, flag
                ),
            });
        }
        let low_confidence = !reasons.is_empty();

        let alert_level = if violations
            .iter()
            .any(|f| f.severity >= Severity::High || f.category == RestrictionCategory::Allergy)
        {
            AlertLevel::Violation
        } else if !violations.is_empty() || !warnings.is_empty() || low_confidence {
            AlertLevel::Caution
        } else {
            AlertLevel::Safe
        };

        reasons.extend(violations.iter().chain(warnings.iter()).map(|f| Reason {
            severity: f.severity,
            confidence: f.confidence,
            kind: f.kind,
            id: f.id.clone(),
            text: format!("{} [{}] {}", f.kind, f.severity, f.message),
        }));
        reasons.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.confidence.total_cmp(&b.confidence))
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = self.config.limits.explanation_limit;
        let total = reasons.len();
        let mut explanation: Vec<String> = reasons.into_iter().take(limit).map(|r| r.text).collect();
        if total > limit {
            explanation.push(format!("+{} more", total - limit));
        }

        tracing::debug!(
            alert = %alert_level,
            violations = violations.len(),
            warnings = warnings.len(),
            "Aggregated verdict"
        );

        Verdict {
            safe: violations.is_empty(),
            alert_level,
            violations,
            warnings,
            explanation,
            notes,
        }
    }
}

/// Severity desc, confidence asc, id.
fn rank(a: &Finding, b: &Finding) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.confidence.total_cmp(&b.confidence))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::profile::{LifestyleTag, UserDietaryProfile};
    use crate::types::{DietaryFlag, TriState};

    fn flags(entries: &[(DietaryFlag, TriState, f64)]) -> FlagDerivation {
        FlagDerivation {
            dietary_flags: entries.iter().map(|(f, v, _)| (*f, *v)).collect(),
            confidence_scores: entries.iter().map(|(f, _, c)| (*f, *c)).collect(),
            evidence_tiers: BTreeMap::new(),
            flag_evidence: BTreeMap::new(),
            derivation_notes: Vec::new(),
        }
    }

    fn aggregate(findings: Vec<Finding>, flags: &FlagDerivation, profile: &UserDietaryProfile) -> Verdict {
        let config = EngineConfig::default();
        AlertAggregator::new(&config).aggregate(findings, flags, profile)
    }

    #[test]
    fn test_no_findings_is_safe() {
        let verdict = aggregate(Vec::new(), &FlagDerivation::default(), &UserDietaryProfile::new());
        assert!(verdict.safe);
        assert_eq!(verdict.alert_level, AlertLevel::Safe);
        assert!(verdict.explanation.is_empty());
    }

    #[test]
    fn test_low_severity_allergy_violation_is_violation() {
        let finding = Finding::violation(RestrictionCategory::Allergy, "celery", Severity::Low, 0.75, "Contains celery");
        let verdict = aggregate(vec![finding], &FlagDerivation::default(), &UserDietaryProfile::new());
        assert!(!verdict.safe);
        assert_eq!(verdict.alert_level, AlertLevel::Violation);
    }

    #[test]
    fn test_medium_religious_violation_is_caution() {
        let finding = Finding::violation(RestrictionCategory::Religious, "halal", Severity::Medium, 1.0, "Product is not halal");
        let verdict = aggregate(vec![finding], &FlagDerivation::default(), &UserDietaryProfile::new());
        assert!(!verdict.safe);
        assert_eq!(verdict.alert_level, AlertLevel::Caution);
    }

    #[test]
    fn test_low_confidence_required_flag_is_caution() {
        let profile = UserDietaryProfile::new().with_lifestyle(LifestyleTag::GlutenFree);
        let flags = flags(&[(DietaryFlag::GlutenFree, TriState::Yes, 0.5)]);
        let verdict = aggregate(Vec::new(), &flags, &profile);

        assert!(verdict.safe);
        assert_eq!(verdict.alert_level, AlertLevel::Caution);
        assert_eq!(verdict.explanation.len(), 1);
        assert!(verdict.explanation[0].contains("gluten_free"));
    }

    #[test]
    fn test_explanation_ranking_and_truncation() {
        let findings = vec![
            Finding::warning(RestrictionCategory::Medical, "salt_100g", Severity::Medium, 1.0, "salt"),
            Finding::warning(RestrictionCategory::Medical, "fat_100g", Severity::Low, 0.0, "fat"),
            Finding::violation(RestrictionCategory::Allergy, "milk", Severity::Critical, 0.95, "milk"),
            Finding::violation(RestrictionCategory::Allergy, "eggs", Severity::Critical, 0.75, "eggs"),
            Finding::warning(RestrictionCategory::Lifestyle, "organic", Severity::Low, 1.0, "organic"),
            Finding::violation(RestrictionCategory::Religious, "kosher", Severity::Medium, 1.0, "kosher"),
            Finding::warning(RestrictionCategory::Medical, "sugars_100g", Severity::Medium, 1.0, "sugars"),
        ];
        let verdict = aggregate(findings, &FlagDerivation::default(), &UserDietaryProfile::new());

        assert_eq!(verdict.explanation.len(), 6);
        assert_eq!(verdict.explanation[0], "violation [critical] eggs");
        assert_eq!(verdict.explanation[1], "violation [critical] milk");
        assert_eq!(verdict.explanation[2], "violation [medium] kosher");
        assert_eq!(verdict.explanation[3], "warning [medium] salt");
        assert_eq!(verdict.explanation[5], "+2 more");
        assert_eq!(verdict.violations[0].subject, "eggs");
    }
}
