//! Custom rule evaluation.
//!
//! Active rules are evaluated in order (priority, creation, list position)
//! and every rule runs; nothing short-circuits. A rule that cannot be
//! evaluated is skipped with a note and never affects the others. The output is the list of
//! matches with their subjects. Deciding which match wins a subject is the
//! conflict resolver's job.

use std::collections::HashSet;

use crate::evidence::Evidence;
use crate::ingredients::IngredientList;
use crate::profile::{CustomRestrictionRule, RuleAction, RuleScope};
use crate::types::{DerivationNote, EvidenceSource, NoteStage, Severity};

use super::matcher::{GlobPattern, StepBudget};
use super::RuleContext;

/// Subject used by rules that apply to the product as a whole.
pub const WHOLE_PRODUCT: &str = "*";

/// One thing a rule matched: an ingredient token, a nutrient key or the
/// whole product.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSubject {
    pub subject: String,
    pub evidence: Vec<Evidence>,
}

/// A custom rule that matched at least one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: String,

    /// Position in the profile's rule list
    pub rule_index: usize,

    /// Position in evaluation order; lower wins
    pub order: usize,

    pub priority: i32,

    pub action: RuleAction,

    pub severity: Option<Severity>,

    pub subjects: Vec<MatchSubject>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomOutcome {
    pub matches: Vec<RuleMatch>,
    pub notes: Vec<DerivationNote>,
}

pub struct CustomRuleEvaluator;

impl CustomRuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> CustomOutcome {
        let mut outcome = CustomOutcome::default();
        let limits = &ctx.config.limits;

        let active = ctx.profile.active_rules(ctx.now);
        let inactive = ctx.profile.custom_rules.len() - active.len();
        if inactive > 0 {
            outcome.notes.push(note(format!(
                "{} custom rule(s) not active at {}",
                inactive,
                ctx.now.to_rfc3339()
            )));
        }
        if active.len() > limits.max_custom_rules {
            tracing::warn!(
                active = active.len(),
                limit = limits.max_custom_rules,
                "Too many active custom rules; extra rules skipped"
            );
            outcome.notes.push(note(format!(
                "{} active custom rules exceed the limit of {}; the lowest-ordered {} were skipped",
                active.len(),
                limits.max_custom_rules,
                active.len() - limits.max_custom_rules
            )));
        }

        if ctx.ingredients.truncated {
            outcome.notes.push(note(format!(
                "ingredient list truncated to {} tokens for pattern matching",
                limits.max_ingredient_tokens
            )));
        }

        let mut seen_ids = HashSet::new();
        for (order, (index, rule)) in active
            .into_iter()
            .take(limits.max_custom_rules)
            .enumerate()
        {
            let problem = match rule.check() {
                Err(problem) => Some(problem),
                Ok(()) if !seen_ids.insert(rule.id.as_str()) => {
                    Some("duplicate rule id".to_string())
                }
                Ok(()) => None,
            };
            if let Some(problem) = problem {
                tracing::warn!(rule_id = %rule.id, kind = rule.scope.kind(), problem = %problem, "Skipping invalid custom rule");
                outcome
                    .notes
                    .push(note(format!("rule {} skipped: {}", rule.id, problem)));
                continue;
            }

            let subjects = match self.match_rule(rule, ctx, &mut outcome.notes) {
                Some(subjects) if !subjects.is_empty() => subjects,
                _ => continue,
            };

            outcome.notes.push(note(format!(
                "rule {} ({}, priority {}) matched {}",
                rule.id,
                rule.action,
                rule.priority,
                subjects
                    .iter()
                    .map(|s| s.subject.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));

            outcome.matches.push(RuleMatch {
                rule_id: rule.id.clone(),
                rule_index: index,
                order,
                priority: rule.priority,
                action: rule.action,
                severity: rule.severity,
                subjects,
            });
        }

        outcome
    }

    /// Subjects the rule matched, or `None` when the rule could not run.
    fn match_rule(
        &self,
        rule: &CustomRestrictionRule,
        ctx: &RuleContext<'_>,
        notes: &mut Vec<DerivationNote>,
    ) -> Option<Vec<MatchSubject>> {
        match &rule.scope {
            RuleScope::IngredientPattern { pattern } => {
                self.match_pattern(rule, pattern, ctx, notes)
            }

            RuleScope::NutritionalThreshold {
                nutrient,
                comparison,
                value,
            } => match ctx.product.nutrient(nutrient) {
                Some(actual) if comparison.matches(actual, *value) => Some(vec![MatchSubject {
                    subject: nutrient.clone(),
                    evidence: vec![Evidence::from_nutrition(
                        format!("{} = {} ({:?} {})", nutrient, actual, comparison, value),
                        nutrient,
                    )],
                }]),
                Some(_) => Some(Vec::new()),
                None => {
                    notes.push(note(format!(
                        "rule {}: {} not reported, rule did not apply",
                        rule.id, nutrient
                    )));
                    None
                }
            },

            RuleScope::Temporal { window, pattern } => {
                if !window.contains(ctx.now) {
                    notes.push(note(format!(
                        "rule {}: outside its time window at {}",
                        rule.id,
                        ctx.now.to_rfc3339()
                    )));
                    return None;
                }
                match pattern {
                    Some(pattern) => self.match_pattern(rule, pattern, ctx, notes),
                    None => Some(vec![MatchSubject {
                        subject: WHOLE_PRODUCT.to_string(),
                        evidence: vec![Evidence::from_profile(
                            format!("rule {} time window is open", rule.id),
                            format!("profile.custom_rules.{}", rule.id),
                        )],
                    }]),
                }
            }
        }
    }

    fn match_pattern(
        &self,
        rule: &CustomRestrictionRule,
        pattern: &str,
        ctx: &RuleContext<'_>,
        notes: &mut Vec<DerivationNote>,
    ) -> Option<Vec<MatchSubject>> {
        let limits = &ctx.config.limits;

        let glob = match GlobPattern::compile(pattern, limits.max_pattern_len) {
            Ok(glob) => glob,
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, kind = rule.scope.kind(), pattern = %pattern, error = %e, "Skipping custom rule with malformed pattern");
                notes.push(note(format!("rule {} skipped: {}", rule.id, e)));
                return None;
            }
        };

        let mut budget = StepBudget::new(limits.matcher_step_budget);
        match glob.matching_tokens(&ctx.ingredients.tokens, &mut budget) {
            Ok(indices) => Some(
                indices
                    .into_iter()
                    .map(|i| {
                        let token = &ctx.ingredients.tokens[i];
                        MatchSubject {
                            subject: token.clone(),
                            evidence: vec![token_evidence(
                                ctx.ingredients,
                                token,
                                format!("'{}' matches pattern {}", token, glob.as_str()),
                            )],
                        }
                    })
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, pattern = %pattern, "Custom rule exceeded its matching budget");
                notes.push(note(format!(
                    "rule {} treated as non-matching: {}",
                    rule.id, e
                )));
                None
            }
        }
    }
}

impl Default for CustomRuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn note(message: String) -> DerivationNote {
    DerivationNote::new(NoteStage::Rules, message)
}

/// Point back at where a token came from: its span in the ingredient text,
/// or the ingredient tag it was read from.
fn token_evidence(ingredients: &IngredientList, token: &str, claim: String) -> Evidence {
    if let Some(start) = ingredients.text.as_deref().and_then(|t| t.find(token)) {
        return Evidence::from_ingredients(claim, start, start + token.len());
    }
    if let Some((index, _)) = ingredients.tag_tokens.iter().find(|(_, t)| t == token) {
        return Evidence::from_tag(claim, EvidenceSource::IngredientTags, *index);
    }
    Evidence {
        claim,
        source: EvidenceSource::IngredientsText,
        pointer: EvidenceSource::IngredientsText.field_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::product::ProductSnapshot;
    use crate::profile::{Comparison, RuleStatus, TimeWindow, UserDietaryProfile};
    use crate::rules::test_support::Fixture;

    fn pattern_rule(id: &str, priority: i32, pattern: &str, action: RuleAction) -> CustomRestrictionRule {
        CustomRestrictionRule::new(
            id,
            priority,
            RuleScope::IngredientPattern {
                pattern: pattern.to_string(),
            },
            action,
        )
    }

    fn run(product: ProductSnapshot, profile: UserDietaryProfile) -> CustomOutcome {
        let fixture = Fixture::new(product, profile);
        CustomRuleEvaluator::new().evaluate(&fixture.context())
    }

    fn wine() -> ProductSnapshot {
        ProductSnapshot::new("1").with_ingredients_text("grapes, preservative (sulfites)")
    }

    #[test]
    fn test_every_rule_is_evaluated_in_order() {
        let outcome = run(
            wine(),
            UserDietaryProfile::new()
                .with_rule(pattern_rule("allow", 5, "sulfite*", RuleAction::Allow))
                .with_rule(pattern_rule("block", 10, "sulfite*", RuleAction::Block)),
        );

        let ids: Vec<&str> = outcome.matches.iter().map(|m| m.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["block", "allow"]);
        assert_eq!(outcome.matches[0].order, 0);
        assert_eq!(outcome.matches[0].rule_index, 1);
        assert_eq!(outcome.matches[0].subjects[0].subject, "sulfites");
        assert_eq!(
            outcome.matches[0].subjects[0].evidence[0].pointer,
            "ingredients_text[22:30]"
        );
    }

    #[test]
    fn test_malformed_pattern_skips_rule_only() {
        let outcome = run(
            wine(),
            UserDietaryProfile::new()
                .with_rule(pattern_rule("bad", 10, "(a+)+$", RuleAction::Block))
                .with_rule(pattern_rule("good", 1, "grape?", RuleAction::Warn)),
        );
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].rule_id, "good");
        assert!(outcome.notes.iter().any(|n| n.message.contains("rule bad skipped")));
    }

    #[test]
    fn test_unevaluable_rules_are_skipped_individually() {
        let empty = pattern_rule("empty", 9, "  ", RuleAction::Block);
        let nan = CustomRestrictionRule::new(
            "nan",
            8,
            RuleScope::NutritionalThreshold {
                nutrient: "sugars_100g".to_string(),
                comparison: Comparison::Above,
                value: f64::NAN,
            },
            RuleAction::Warn,
        );
        let reversed = CustomRestrictionRule::new(
            "reversed",
            7,
            RuleScope::Temporal {
                window: TimeWindow::Absolute {
                    start: Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
                },
                pattern: None,
            },
            RuleAction::Block,
        );
        let profile = UserDietaryProfile::new()
            .with_rule(empty)
            .with_rule(nan)
            .with_rule(reversed)
            .with_rule(pattern_rule("grapes", 1, "grape?", RuleAction::Warn))
            .with_rule(pattern_rule("grapes", 0, "sulfite*", RuleAction::Block));

        let outcome = run(wine(), profile);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].action, RuleAction::Warn);
        for expected in [
            "rule empty skipped: pattern is empty",
            "rule nan skipped: threshold value must be finite",
            "rule reversed skipped: window start must be before end",
            "rule grapes skipped: duplicate rule id",
        ] {
            assert!(
                outcome.notes.iter().any(|n| n.message == expected),
                "missing note: {}",
                expected
            );
        }
    }

    #[test]
    fn test_budget_overrun_is_non_matching() {
        let long = "a".repeat(400);
        let product = ProductSnapshot::new("1").with_ingredients_text(
            (0..30).map(|_| long.clone()).collect::<Vec<_>>().join(", "),
        );
        let profile = UserDietaryProfile::new().with_rule(pattern_rule(
            "slow",
            1,
            "*a*a*a*a*a*a*a*b",
            RuleAction::Block,
        ));
        let outcome = run(product, profile);
        assert!(outcome.matches.is_empty());
        assert!(outcome
            .notes
            .iter()
            .any(|n| n.message.contains("treated as non-matching")));
    }

    #[test]
    fn test_nutritional_threshold() {
        let product = ProductSnapshot::new("1").with_nutrient("sugars_100g", 22.0);
        let rule = CustomRestrictionRule::new(
            "sugar-cap",
            1,
            RuleScope::NutritionalThreshold {
                nutrient: "sugars_100g".to_string(),
                comparison: Comparison::Above,
                value: 10.0,
            },
            RuleAction::Warn,
        );
        let outcome = run(product, UserDietaryProfile::new().with_rule(rule));
        assert_eq!(outcome.matches[0].subjects[0].subject, "sugars_100g");
    }

    #[test]
    fn test_temporal_window() {
        // Fixture evaluates at 12:00 UTC
        let lunch = CustomRestrictionRule::new(
            "lunch",
            1,
            RuleScope::Temporal {
                window: TimeWindow::Daily {
                    start: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                },
                pattern: None,
            },
            RuleAction::Warn,
        );
        let night = CustomRestrictionRule::new(
            "night",
            1,
            RuleScope::Temporal {
                window: TimeWindow::Daily {
                    start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
                },
                pattern: Some("grape*".to_string()),
            },
            RuleAction::Block,
        );

        let outcome = run(wine(), UserDietaryProfile::new().with_rule(lunch).with_rule(night));
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].subjects[0].subject, WHOLE_PRODUCT);
    }

    #[test]
    fn test_inactive_and_capped_rules() {
        let mut expired = pattern_rule("expired", 99, "grape*", RuleAction::Block);
        expired.expires_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut draft = pattern_rule("draft", 99, "grape*", RuleAction::Block);
        draft.status = RuleStatus::Draft;

        let mut profile = UserDietaryProfile::new().with_rule(expired).with_rule(draft);
        for i in 0..55 {
            profile = profile.with_rule(pattern_rule(&format!("r{}", i), 0, "grape*", RuleAction::Warn));
        }

        let outcome = run(wine(), profile);
        assert_eq!(outcome.matches.len(), 50);
        assert!(outcome.matches.iter().all(|m| m.rule_id.starts_with('r')));
        assert!(outcome.notes.iter().any(|n| n.message.contains("exceed the limit")));
    }
}
