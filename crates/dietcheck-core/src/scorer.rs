//! Quality/Completeness Scorer

use crate::config::ScoringPolicy;
use crate::product::{ProductSnapshot, DEFAULT_QUALITY_SCORE};
use crate::types::{DerivationNote, FlagDerivation, NoteStage};

/// Fields that make up the completeness score.
pub const EXPECTED_FIELDS: [&str; 5] = [
    "ingredients_text",
    "allergen_tags",
    "label_tags",
    "category_tags",
    "ingredient_tags",
];

/// Scores produced for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub quality_score: f64,
    pub completeness_score: f64,
    pub notes: Vec<DerivationNote>,
}

pub struct QualityScorer<'a> {
    policy: &'a ScoringPolicy,
}

impl<'a> QualityScorer<'a> {
    pub fn new(policy: &'a ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn score(&self, product: &ProductSnapshot, flags: &FlagDerivation) -> QualityReport {
        let mut notes = Vec::new();

        let mut populated = 0usize;
        for field in EXPECTED_FIELDS {
            if is_populated(product, field) {
                populated += 1;
            } else {
                notes.push(DerivationNote::new(
                    NoteStage::Scorer,
                    format!("Data quality: {} is missing or empty", field),
                ));
            }
        }
        let completeness_score = populated as f64 / EXPECTED_FIELDS.len() as f64;

        if let Some(values) = &product.nutritional_values {
            for (key, value) in values.iter().filter(|(_, v)| !v.is_finite()) {
                notes.push(DerivationNote::new(
                    NoteStage::Scorer,
                    format!("Data quality: nutrient {} is not a finite number ({})", key, value),
                ));
            }
        }

        let baseline = if product.quality_score.is_finite() {
            product.quality_score
        } else {
            notes.push(DerivationNote::new(
                NoteStage::Scorer,
                format!(
                    "Data quality: baseline quality score is not finite, using {}",
                    DEFAULT_QUALITY_SCORE
                ),
            ));
            DEFAULT_QUALITY_SCORE
        };

        let confident = flags
            .dietary_flags
            .iter()
            .filter(|(flag, value)| {
                !value.is_unknown() && flags.confidence(**flag) >= self.policy.high_confidence_threshold
            })
            .count();
        let bonus = (self.policy.bonus_per_flag * confident as f64).min(self.policy.bonus_cap);
        let quality_score = (baseline + bonus).clamp(0.0, 1.0);

        tracing::debug!(
            quality_score,
            completeness_score,
            confident_flags = confident,
            "Scored product data quality"
        );

        QualityReport {
            quality_score,
            completeness_score,
            notes,
        }
    }
}

fn is_populated(product: &ProductSnapshot, field: &str) -> bool {
    let tags = match field {
        "ingredients_text" => {
            return product
                .ingredients_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
        }
        "allergen_tags" => &product.allergen_tags,
        "label_tags" => &product.label_tags,
        "category_tags" => &product.category_tags,
        "ingredient_tags" => &product.ingredient_tags,
        _ => return false,
    };

    tags.as_ref()
        .is_some_and(|t| t.iter().any(|tag| !tag.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DietaryFlag, TriState};

    fn flags(entries: &[(DietaryFlag, TriState, f64)]) -> FlagDerivation {
        let mut d = FlagDerivation::default();
        for (flag, value, confidence) in entries {
            d.dietary_flags.insert(*flag, *value);
            d.confidence_scores.insert(*flag, *confidence);
        }
        d
    }

    #[test]
    fn test_completeness_counts_populated_fields() {
        let policy = ScoringPolicy::default();
        let product = ProductSnapshot::new("1")
            .with_ingredients_text("water")
            .with_label_tags(&["en:vegan"])
            .with_category_tags(&["  "]);
        let report = QualityScorer::new(&policy).score(&product, &FlagDerivation::default());

        assert!((report.completeness_score - 0.4).abs() < 1e-9);
        assert_eq!(report.notes.len(), 3);
    }

    #[test]
    fn test_quality_bonus_is_capped() {
        let policy = ScoringPolicy::default();
        let d = flags(&[
            (DietaryFlag::Vegan, TriState::Yes, 0.9),
            (DietaryFlag::Vegetarian, TriState::Yes, 0.9),
            (DietaryFlag::GlutenFree, TriState::No, 0.8),
            (DietaryFlag::Kosher, TriState::Yes, 0.9),
            (DietaryFlag::Halal, TriState::Yes, 0.9),
            (DietaryFlag::Organic, TriState::Unknown, 0.9),
        ]);
        let report = QualityScorer::new(&policy).score(&ProductSnapshot::new("1"), &d);
        assert!((report.quality_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_quality_is_clamped() {
        let policy = ScoringPolicy::default();
        let d = flags(&[(DietaryFlag::Vegan, TriState::Yes, 0.95)]);
        let product = ProductSnapshot::new("1").with_quality_score(0.99);
        let report = QualityScorer::new(&policy).score(&product, &d);
        assert_eq!(report.quality_score, 1.0);
    }

    #[test]
    fn test_low_confidence_flags_earn_nothing() {
        let policy = ScoringPolicy::default();
        let d = flags(&[(DietaryFlag::Vegan, TriState::Yes, 0.3)]);
        let report = QualityScorer::new(&policy).score(&ProductSnapshot::new("1"), &d);
        assert_eq!(report.quality_score, DEFAULT_QUALITY_SCORE);
    }
}
