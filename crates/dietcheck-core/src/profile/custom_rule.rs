//! User-authored custom restriction rules.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Lifecycle: Draft -> Active -> Expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    #[default]
    Active,
    Expired,
}

/// What a matching rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Block,
    Warn,
    Allow,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Block => f.write_str("block"),
            RuleAction::Warn => f.write_str("warn"),
            RuleAction::Allow => f.write_str("allow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Matches when the product value is strictly greater
    #[default]
    Above,
    /// Matches when the product value is strictly smaller
    Below,
}

impl Comparison {
    pub fn matches(&self, actual: f64, limit: f64) -> bool {
        match self {
            Comparison::Above => actual > limit,
            Comparison::Below => actual < limit,
        }
    }
}

/// When a temporal rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeWindow {
    /// Half-open instant range `[start, end)`
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Time of day (UTC); `start > end` wraps past midnight
    Daily { start: NaiveTime, end: NaiveTime },
}

impl TimeWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match self {
            TimeWindow::Absolute { start, end } => *start <= now && now < *end,
            TimeWindow::Daily { start, end } => {
                let t = now.time();
                if start <= end {
                    *start <= t && t < *end
                } else {
                    t >= *start || t < *end
                }
            }
        }
    }
}

/// What a custom rule looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleScope {
    /// Glob pattern over ingredient tokens (`*`, `?`, literals)
    IngredientPattern { pattern: String },

    /// Compare one nutritional value against a limit
    NutritionalThreshold {
        nutrient: String,
        #[serde(default)]
        comparison: Comparison,
        value: f64,
    },

    /// Applies only inside the window; with a pattern, only to matching
    /// ingredients, otherwise to the whole product
    Temporal {
        window: TimeWindow,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

impl RuleScope {
    pub fn pattern(&self) -> Option<&str> {
        match self {
            RuleScope::IngredientPattern { pattern } => Some(pattern),
            RuleScope::Temporal { pattern, .. } => pattern.as_deref(),
            RuleScope::NutritionalThreshold { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RuleScope::IngredientPattern { .. } => "ingredient_pattern",
            RuleScope::NutritionalThreshold { .. } => "nutritional_threshold",
            RuleScope::Temporal { .. } => "temporal",
        }
    }
}

/// A prioritized, user-authored rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRestrictionRule {
    pub id: String,

    /// Higher is evaluated first and wins
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub status: RuleStatus,

    pub scope: RuleScope,

    pub action: RuleAction,

    /// Severity of the finding a Block/Warn produces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Creation instant; earlier wins among equal priorities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CustomRestrictionRule {
    pub fn new(id: impl Into<String>, priority: i32, scope: RuleScope, action: RuleAction) -> Self {
        Self {
            id: id.into(),
            priority,
            status: RuleStatus::Active,
            scope,
            action,
            severity: None,
            expires_at: None,
            created_at: None,
            description: None,
        }
    }

    /// Lifecycle status at `now`; an Active rule past `expires_at` is Expired.
    pub fn status_at(&self, now: DateTime<Utc>) -> RuleStatus {
        match (self.status, self.expires_at) {
            (RuleStatus::Active, Some(expires)) if now >= expires => RuleStatus::Expired,
            (status, _) => status,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == RuleStatus::Active
    }

    /// Problems that stop this rule from being evaluated.
    ///
    /// Pattern syntax is left to the matcher.
    pub fn check(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id is empty".to_string());
        }
        match &self.scope {
            RuleScope::NutritionalThreshold { nutrient, value, .. } => {
                if nutrient.trim().is_empty() {
                    return Err("nutrient is empty".to_string());
                }
                if !value.is_finite() {
                    return Err("threshold value must be finite".to_string());
                }
            }
            RuleScope::Temporal {
                window: TimeWindow::Absolute { start, end },
                ..
            } if start >= end => {
                return Err("window start must be before end".to_string());
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_window_wraps_midnight() {
        let window = TimeWindow::Daily {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        assert!(window.contains(at(23, 30)));
        assert!(window.contains(at(2, 0)));
        assert!(!window.contains(at(6, 0)));
        assert!(!window.contains(at(12, 0)));
    }

    #[test]
    fn test_absolute_window_is_half_open() {
        let window = TimeWindow::Absolute {
            start: at(8, 0),
            end: at(9, 0),
        };
        assert!(window.contains(at(8, 0)));
        assert!(!window.contains(at(9, 0)));
    }

    #[test]
    fn test_expiry() {
        let mut rule = CustomRestrictionRule::new(
            "r1",
            1,
            RuleScope::IngredientPattern {
                pattern: "x".to_string(),
            },
            RuleAction::Warn,
        );
        rule.expires_at = Some(at(12, 0));

        assert!(rule.is_active_at(at(11, 59)));
        assert_eq!(rule.status_at(at(12, 0)), RuleStatus::Expired);

        rule.status = RuleStatus::Draft;
        assert!(!rule.is_active_at(at(0, 0)));
    }

    #[test]
    fn test_scope_deserializes_tagged() {
        let scope: RuleScope = serde_yaml::from_str(
            "type: nutritional_threshold\nnutrient: sugars_100g\nvalue: 5\n",
        )
        .unwrap();
        assert_eq!(
            scope,
            RuleScope::NutritionalThreshold {
                nutrient: "sugars_100g".to_string(),
                comparison: Comparison::Above,
                value: 5.0,
            }
        );

        let scope: RuleScope = serde_yaml::from_str(
            "type: temporal\nwindow:\n  kind: daily\n  start: \"20:00:00\"\n  end: \"06:00:00\"\npattern: \"caffeine*\"\n",
        )
        .unwrap();
        assert_eq!(scope.pattern(), Some("caffeine*"));
    }
}
