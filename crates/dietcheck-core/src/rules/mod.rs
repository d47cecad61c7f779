//! Restriction Rule Engine
//!
//! Each restriction category is checked by its own [`RestrictionCheck`]:
//!
//! | Check | Question |
//! |-------|----------|
//! | Allergy | Does the product contain or risk containing a declared allergen? |
//! | Religious | Is the product certified for the user's religious requirements? |
//! | Medical | Does the product stay within the user's nutrient limits? |
//! | Lifestyle | Does the product match the user's chosen diet? |
//!
//! Custom rules are evaluated separately by [`CustomRuleEvaluator`] because
//! their verdicts still have to pass through conflict resolution.

mod allergy;
mod custom;
mod lifestyle;
pub mod matcher;
mod medical;
mod religious;

pub use allergy::AllergyCheck;
pub use custom::{CustomOutcome, CustomRuleEvaluator, RuleMatch, MatchSubject, WHOLE_PRODUCT};
pub use lifestyle::LifestyleCheck;
pub use matcher::{BudgetExceeded, GlobPattern, PatternError, StepBudget};
pub use medical::MedicalCheck;
pub use religious::ReligiousCheck;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::ingredients::IngredientList;
use crate::keywords::KeywordTables;
use crate::normalizer::{NormalizedTags, TagNormalizer};
use crate::product::ProductSnapshot;
use crate::profile::UserDietaryProfile;
use crate::types::{DerivationNote, Finding, FlagDerivation, RestrictionCategory};

/// Everything a check may look at for one evaluation.
pub struct RuleContext<'a> {
    pub product: &'a ProductSnapshot,
    pub profile: &'a UserDietaryProfile,
    pub tags: &'a NormalizedTags,
    pub ingredients: &'a IngredientList,
    pub flags: &'a FlagDerivation,
    pub config: &'a EngineConfig,
    pub keywords: &'a KeywordTables,
    pub normalizer: &'a TagNormalizer,
    pub now: DateTime<Utc>,
}

/// Findings and audit notes from one check.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub findings: Vec<Finding>,
    pub notes: Vec<DerivationNote>,
}

/// One restriction category.
pub trait RestrictionCheck: Send + Sync {
    fn category(&self) -> RestrictionCategory;

    fn question(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> CheckOutcome;
}

/// The four built-in checks in evaluation order.
pub fn builtin_checks() -> Vec<Box<dyn RestrictionCheck>> {
    vec![
        Box::new(AllergyCheck::new()),
        Box::new(ReligiousCheck::new()),
        Box::new(MedicalCheck::new()),
        Box::new(LifestyleCheck::new()),
    ]
}
