//! Conflict Resolver: decides which verdicts survive.
//!
//! Precedence, highest first:
//! 1. Allergy and medical findings are non-overridable
//! 2. Certification beats inference (settled by the deriver)
//! 3. Among custom rules the lower evaluation order wins a subject
//! 4. An Allow may suppress later Warn/Block rules for the same subject, but
//!    an Allow that overlaps an allergy or medical finding is denied
//!
//! Every suppression is logged, recorded and noted.

use std::collections::BTreeMap;

use crate::rules::{CustomOutcome, MatchSubject, RuleMatch, WHOLE_PRODUCT};
use crate::types::{
    DerivationNote, Finding, NoteStage, RestrictionCategory, Severity, Suppression,
};
use crate::profile::RuleAction;

/// Findings after conflict resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub findings: Vec<Finding>,
    pub suppressions: Vec<Suppression>,
    pub notes: Vec<DerivationNote>,
}

pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Combine built-in findings with the custom rule matches.
    ///
    /// Built-in findings pass through unchanged. Custom matches are
    /// resolved by their evaluation order.
    pub fn resolve(&self, builtin: Vec<Finding>, custom: &CustomOutcome) -> Resolution {
        let mut resolution = Resolution::default();

        let mut ordered: Vec<&RuleMatch> = custom.matches.iter().collect();
        ordered.sort_by_key(|m| m.order);

        // subject -> index into `ordered` of the match that claimed it
        let mut claimed: BTreeMap<&str, usize> = BTreeMap::new();
        // per match: the subjects it won
        let mut won: Vec<Vec<&MatchSubject>> = vec![Vec::new(); ordered.len()];

        for (i, m) in ordered.iter().enumerate() {
            for subject in &m.subjects {
                match claimed.get(subject.subject.as_str()) {
                    None => {
                        claimed.insert(&subject.subject, i);
                        won[i].push(subject);
                    }
                    Some(&winner) => {
                        let winner = ordered[winner];
                        let suppression = Suppression {
                            suppressed_rule_id: m.rule_id.clone(),
                            winning_rule_id: winner.rule_id.clone(),
                            subject: subject.subject.clone(),
                            reason: precedence_reason(winner, m),
                        };
                        tracing::debug!(
                            suppressed = %suppression.suppressed_rule_id,
                            winner = %suppression.winning_rule_id,
                            subject = %suppression.subject,
                            "Custom rule suppressed"
                        );
                        resolution.notes.push(DerivationNote::new(
                            NoteStage::Resolver,
                            format!(
                                "rule {} ({}) suppressed by rule {} ({}) for '{}': {}",
                                m.rule_id,
                                m.action,
                                winner.rule_id,
                                winner.action,
                                subject.subject,
                                suppression.reason
                            ),
                        ));
                        resolution.suppressions.push(suppression);
                    }
                }
            }
        }

        for (m, subjects) in ordered.iter().zip(&won) {
            if subjects.is_empty() {
                continue;
            }
            match m.action {
                RuleAction::Allow => {
                    for subject in subjects {
                        self.check_denied_allow(m, subject, &builtin, &mut resolution.notes);
                    }
                }
                RuleAction::Block | RuleAction::Warn => {
                    resolution.findings.push(custom_finding(m, subjects));
                }
            }
        }

        let mut findings = builtin;
        findings.append(&mut resolution.findings);
        resolution.findings = findings;
        resolution
    }

    fn check_denied_allow(
        &self,
        m: &RuleMatch,
        subject: &MatchSubject,
        builtin: &[Finding],
        notes: &mut Vec<DerivationNote>,
    ) {
        let protected = builtin
            .iter()
            .filter(|f| f.category.is_non_overridable())
            .filter(|f| overlaps(&subject.subject, &f.subject));

        for finding in protected {
            tracing::warn!(
                rule_id = %m.rule_id,
                finding = %finding.id,
                "Allow rule cannot suppress a {} finding",
                finding.category
            );
            notes.push(DerivationNote::new(
                NoteStage::Resolver,
                format!(
                    "denied: allow rule {} cannot suppress {} ({} findings are non-overridable)",
                    m.rule_id, finding.id, finding.category
                ),
            ));
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn precedence_reason(winner: &RuleMatch, loser: &RuleMatch) -> String {
    if winner.priority != loser.priority {
        format!("higher priority ({} > {})", winner.priority, loser.priority)
    } else {
        format!("equal priority {}, created first", winner.priority)
    }
}

/// Does a custom rule subject cover a built-in finding subject?
fn overlaps(rule_subject: &str, finding_subject: &str) -> bool {
    if rule_subject == WHOLE_PRODUCT {
        return true;
    }
    let a = rule_subject.replace(['-', '_'], " ");
    let b = finding_subject.replace(['-', '_'], " ");
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn custom_finding(m: &RuleMatch, subjects: &[&MatchSubject]) -> Finding {
    let names: Vec<&str> = subjects.iter().map(|s| s.subject.as_str()).collect();
    let joined = names.join(", ");
    let evidence = subjects.iter().flat_map(|s| s.evidence.iter().cloned()).collect();

    let finding = match m.action {
        RuleAction::Block => Finding::violation(
            RestrictionCategory::Custom,
            joined.clone(),
            m.severity.unwrap_or(Severity::High),
            1.0,
            format!("Blocked by rule {}: {}", m.rule_id, joined),
        ),
        _ => Finding::warning(
            RestrictionCategory::Custom,
            joined.clone(),
            m.severity.unwrap_or(Severity::Medium),
            1.0,
            format!("Flagged by rule {}: {}", m.rule_id, joined),
        ),
    };

    finding.with_rule(m.rule_id.clone()).with_evidence(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Evidence;
    use crate::types::FindingKind;

    fn rule_match(id: &str, order: usize, priority: i32, action: RuleAction, subjects: &[&str]) -> RuleMatch {
        RuleMatch {
            rule_id: id.to_string(),
            rule_index: order,
            order,
            priority,
            action,
            severity: None,
            subjects: subjects
                .iter()
                .map(|s| MatchSubject {
                    subject: s.to_string(),
                    evidence: vec![Evidence::from_ingredients(format!("'{}'", s), 0, s.len())],
                })
                .collect(),
        }
    }

    fn outcome(matches: Vec<RuleMatch>) -> CustomOutcome {
        CustomOutcome {
            matches,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_block_beats_lower_allow() {
        let custom = outcome(vec![
            rule_match("no-sulfites", 0, 10, RuleAction::Block, &["sulfites"]),
            rule_match("wine-ok", 1, 5, RuleAction::Allow, &["sulfites"]),
        ]);
        let resolution = ConflictResolver::new().resolve(Vec::new(), &custom);

        assert_eq!(resolution.findings.len(), 1);
        let f = &resolution.findings[0];
        assert_eq!(f.kind, FindingKind::Violation);
        assert_eq!(f.severity, Severity::High);
        assert_eq!(f.rule_id.as_deref(), Some("no-sulfites"));
        assert_eq!(f.id, "custom:no-sulfites");

        assert_eq!(resolution.suppressions.len(), 1);
        let s = &resolution.suppressions[0];
        assert_eq!(s.suppressed_rule_id, "wine-ok");
        assert_eq!(s.winning_rule_id, "no-sulfites");
        assert_eq!(s.reason, "higher priority (10 > 5)");
    }

    #[test]
    fn test_allow_suppresses_later_block() {
        let custom = outcome(vec![
            rule_match("allow-soy", 0, 20, RuleAction::Allow, &["soy lecithin"]),
            rule_match("no-lecithin", 1, 1, RuleAction::Block, &["soy lecithin", "sunflower lecithin"]),
        ]);
        let resolution = ConflictResolver::new().resolve(Vec::new(), &custom);

        // the block still applies to the subject it won
        assert_eq!(resolution.findings.len(), 1);
        assert_eq!(resolution.findings[0].subject, "sunflower lecithin");
        assert_eq!(resolution.suppressions.len(), 1);
        assert_eq!(resolution.suppressions[0].subject, "soy lecithin");
    }

    #[test]
    fn test_allow_never_removes_allergy_finding() {
        let allergy = Finding::violation(
            RestrictionCategory::Allergy,
            "milk",
            Severity::High,
            0.95,
            "Contains milk",
        );
        let custom = outcome(vec![rule_match(
            "allow-milk",
            0,
            100,
            RuleAction::Allow,
            &["skimmed milk powder"],
        )]);
        let resolution = ConflictResolver::new().resolve(vec![allergy.clone()], &custom);

        assert_eq!(resolution.findings, vec![allergy]);
        assert!(resolution.suppressions.is_empty());
        assert!(resolution.notes.iter().any(|n| n.message.starts_with("denied:")));
    }

    #[test]
    fn test_whole_product_allow_is_denied_for_medical() {
        let medical = Finding::warning(
            RestrictionCategory::Medical,
            "salt_100g",
            Severity::Medium,
            1.0,
            "salt_100g is 2",
        );
        let custom = outcome(vec![rule_match("cheat-day", 0, 1, RuleAction::Allow, &[WHOLE_PRODUCT])]);
        let resolution = ConflictResolver::new().resolve(vec![medical], &custom);
        assert_eq!(resolution.findings.len(), 1);
        assert_eq!(resolution.notes.len(), 1);
    }

    #[test]
    fn test_equal_priority_tie_break_reason() {
        let custom = outcome(vec![
            rule_match("first", 0, 3, RuleAction::Warn, &["palm oil"]),
            rule_match("second", 1, 3, RuleAction::Block, &["palm oil"]),
        ]);
        let resolution = ConflictResolver::new().resolve(Vec::new(), &custom);
        assert_eq!(resolution.findings[0].kind, FindingKind::Warning);
        assert_eq!(resolution.suppressions[0].reason, "equal priority 3, created first");
    }

    #[test]
    fn test_evaluation_order_decides_not_list_position() {
        let custom = outcome(vec![
            rule_match("late-warn", 1, 1, RuleAction::Warn, &["cane sugar"]),
            rule_match("early-allow", 0, 9, RuleAction::Allow, &["cane sugar"]),
        ]);
        let resolution = ConflictResolver::new().resolve(Vec::new(), &custom);
        assert!(resolution.findings.is_empty());
        assert_eq!(resolution.suppressions[0].winning_rule_id, "early-allow");
        assert_eq!(resolution.suppressions[0].suppressed_rule_id, "late-warn");
    }

    #[test]
    fn test_overlap() {
        assert!(overlaps("skimmed milk powder", "milk"));
        assert!(overlaps("peanut", "peanuts"));
        assert!(overlaps("*", "anything"));
        assert!(!overlaps("sugar", "milk"));
    }
}
