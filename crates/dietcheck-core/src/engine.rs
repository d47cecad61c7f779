//! The compliance pipeline.
//!
//! Normalizer -> Deriver -> Rule Engine -> Conflict Resolver -> Alert
//! Aggregator, with the scorer reading the deriver's output on the side.
//! Every stage appends to the same audit trail in that order.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::aggregator::AlertAggregator;
use crate::config::{ConfigError, EngineConfig};
use crate::deriver::FlagDeriver;
use crate::ingredients::IngredientList;
use crate::keywords::KeywordTables;
use crate::normalizer::{NormalizedTags, TagNormalizer};
use crate::product::ProductSnapshot;
use crate::profile::UserDietaryProfile;
use crate::resolver::ConflictResolver;
use crate::rules::{builtin_checks, CustomRuleEvaluator, RestrictionCheck, RuleContext};
use crate::scorer::QualityScorer;
use crate::types::{ComplianceResult, FlagDerivation};
use crate::EvaluationError;

/// A compliance engine bound to one immutable configuration.
///
/// Construction compiles the keyword tables; evaluation is then a pure
/// function of its inputs and the evaluation instant. The engine is
/// `Send + Sync` and can be shared across threads behind an `Arc`.
pub struct ComplianceEngine {
    config: Arc<EngineConfig>,
    normalizer: TagNormalizer,
    keywords: KeywordTables,
    checks: Vec<Box<dyn RestrictionCheck>>,
}

impl ComplianceEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let keywords = KeywordTables::from_config(&config)?;
        let config = Arc::new(config);

        Ok(Self {
            normalizer: TagNormalizer::new(config.clone()),
            keywords,
            checks: builtin_checks(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Derive dietary flags without a profile.
    pub fn derive_flags(&self, product: &ProductSnapshot) -> FlagDerivation {
        let (tags, _, mut flags) = self.derive(product);
        let mut notes = tags.notes();
        notes.append(&mut flags.derivation_notes);
        flags.derivation_notes = notes;
        flags
    }

    /// A copy of `product` with the output fields populated.
    pub fn enrich(&self, product: &ProductSnapshot) -> ProductSnapshot {
        let (_, _, flags) = self.derive(product);
        let report = QualityScorer::new(&self.config.scoring).score(product, &flags);

        let mut enriched = product.clone();
        enriched.dietary_flags = Some(flags.dietary_flags);
        enriched.confidence_scores = Some(flags.confidence_scores);
        enriched.quality_score = report.quality_score;
        enriched.completeness_score = Some(report.completeness_score);
        enriched
    }

    /// Evaluate at the current instant.
    pub fn evaluate(
        &self,
        product: &ProductSnapshot,
        profile: &UserDietaryProfile,
    ) -> Result<ComplianceResult, EvaluationError> {
        self.evaluate_at(product, profile, Utc::now())
    }

    /// Evaluate at a fixed instant. Identical inputs always produce an
    /// identical result.
    pub fn evaluate_at(
        &self,
        product: &ProductSnapshot,
        profile: &UserDietaryProfile,
        now: DateTime<Utc>,
    ) -> Result<ComplianceResult, EvaluationError> {
        product.validate()?;
        profile.validate_conditions()?;

        tracing::debug!(code = %product.code, "Evaluating product");

        let (tags, ingredients, flags) = self.derive(product);
        let mut notes = tags.notes();
        notes.extend(flags.derivation_notes.iter().cloned());

        let report = QualityScorer::new(&self.config.scoring).score(product, &flags);
        notes.extend(report.notes);

        let ctx = RuleContext {
            product,
            profile,
            tags: &tags,
            ingredients: &ingredients,
            flags: &flags,
            config: &self.config,
            keywords: &self.keywords,
            normalizer: &self.normalizer,
            now,
        };

        let mut findings = Vec::new();
        for check in &self.checks {
            let outcome = check.evaluate(&ctx);
            tracing::debug!(
                category = %check.category(),
                question = check.question(),
                findings = outcome.findings.len(),
                "Check complete"
            );
            findings.extend(outcome.findings);
            notes.extend(outcome.notes);
        }

        let custom = CustomRuleEvaluator::new().evaluate(&ctx);
        notes.extend(custom.notes.iter().cloned());

        let resolution = ConflictResolver::new().resolve(findings, &custom);
        notes.extend(resolution.notes);

        let verdict =
            AlertAggregator::new(&self.config).aggregate(resolution.findings, &flags, profile);
        notes.extend(verdict.notes);

        Ok(ComplianceResult {
            product_code: product.code.clone(),
            safe: verdict.safe,
            alert_level: verdict.alert_level,
            violations: verdict.violations,
            warnings: verdict.warnings,
            dietary_flags: flags.dietary_flags,
            confidence_scores: flags.confidence_scores,
            quality_score: report.quality_score,
            completeness_score: report.completeness_score,
            explanation: verdict.explanation,
            derivation_notes: notes,
            suppressions: resolution.suppressions,
        })
    }

    fn derive(&self, product: &ProductSnapshot) -> (NormalizedTags, IngredientList, FlagDerivation) {
        let tags = self.normalizer.normalize(product);
        let ingredients = IngredientList::parse(
            product.ingredients_text.as_deref(),
            &tags.ingredients,
            self.config.limits.max_ingredient_tokens,
        );
        let flags = FlagDeriver::new(&self.config, &self.keywords).derive(&tags, &ingredients);
        (tags, ingredients, flags)
    }
}
