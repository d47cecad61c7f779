//! Core types shared by every stage of the compliance pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;

/// A named dietary property derived from product evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryFlag {
    Vegan,
    Vegetarian,
    GlutenFree,
    Kosher,
    Halal,
    Organic,
}

impl DietaryFlag {
    pub const ALL: [DietaryFlag; 6] = [
        DietaryFlag::Vegan,
        DietaryFlag::Vegetarian,
        DietaryFlag::GlutenFree,
        DietaryFlag::Kosher,
        DietaryFlag::Halal,
        DietaryFlag::Organic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DietaryFlag::Vegan => "vegan",
            DietaryFlag::Vegetarian => "vegetarian",
            DietaryFlag::GlutenFree => "gluten_free",
            DietaryFlag::Kosher => "kosher",
            DietaryFlag::Halal => "halal",
            DietaryFlag::Organic => "organic",
        }
    }

    /// Flags that may be weakly assumed from the absence of negative evidence
    /// and that accept explicit analysis tags. Kosher, halal and organic are
    /// certification-only.
    pub fn allows_inference(&self) -> bool {
        matches!(
            self,
            DietaryFlag::Vegan | DietaryFlag::Vegetarian | DietaryFlag::GlutenFree
        )
    }
}

impl fmt::Display for DietaryFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-valued flag outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    Unknown,
}

impl TriState {
    pub fn is_unknown(&self) -> bool {
        matches!(self, TriState::Unknown)
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriState::Yes => f.write_str("yes"),
            TriState::No => f.write_str("no"),
            TriState::Unknown => f.write_str("unknown"),
        }
    }
}

/// Restriction importance, ordered `critical > high > medium > low`.
///
/// Profiles may use the clinical vocabulary (`mild`, `moderate`, `severe`,
/// `anaphylactic`) which maps onto the same four levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "mild")]
    Low,
    #[serde(alias = "moderate")]
    Medium,
    #[serde(alias = "severe")]
    High,
    #[serde(alias = "anaphylactic", alias = "life_threatening")]
    Critical,
}

impl Severity {
    /// `severe` in profile terms: high or critical.
    pub fn is_severe(&self) -> bool {
        *self >= Severity::High
    }

    /// The clinical word for this level, as allergy profiles usually write it.
    pub fn clinical_term(&self) -> &'static str {
        match self {
            Severity::Low => "mild",
            Severity::Medium => "moderate",
            Severity::High => "severe",
            Severity::Critical => "anaphylactic",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => f.write_str("low"),
            Severity::Medium => f.write_str("medium"),
            Severity::High => f.write_str("high"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// The single aggregate verdict shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Safe,
    Caution,
    Violation,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Safe => f.write_str("SAFE"),
            AlertLevel::Caution => f.write_str("CAUTION"),
            AlertLevel::Violation => f.write_str("VIOLATION"),
        }
    }
}

/// Which restriction source produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionCategory {
    Allergy,
    Religious,
    Medical,
    Lifestyle,
    Custom,
}

impl RestrictionCategory {
    /// Allergy and medical findings can never be downgraded or suppressed.
    pub fn is_non_overridable(&self) -> bool {
        matches!(self, RestrictionCategory::Allergy | RestrictionCategory::Medical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionCategory::Allergy => "allergy",
            RestrictionCategory::Religious => "religious",
            RestrictionCategory::Medical => "medical",
            RestrictionCategory::Lifestyle => "lifestyle",
            RestrictionCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for RestrictionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a finding is a hard violation or an advisory warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Violation,
    Warning,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::Violation => f.write_str("violation"),
            FindingKind::Warning => f.write_str("warning"),
        }
    }
}

/// A single violation or warning raised against a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    /// Stable identifier, e.g. `allergy:milk` or `custom:no-sulfites`
    pub id: String,

    pub kind: FindingKind,

    pub category: RestrictionCategory,

    /// Normalized level. A profile's `severe` serializes as `high`; allergy
    /// messages repeat the clinical term.
    pub severity: Severity,

    /// Certainty of the evidence behind this finding (0.0 - 1.0)
    pub confidence: f64,

    /// What the finding is about (allergen, flag, nutrient, ingredient)
    pub subject: String,

    /// Custom rule that produced the finding, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Human-readable reason
    pub message: String,

    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        category: RestrictionCategory,
        subject: impl Into<String>,
        severity: Severity,
        confidence: f64,
        message: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        Self {
            id: format!("{}:{}", category, subject),
            kind,
            category,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            subject,
            rule_id: None,
            message: message.into(),
            evidence: Vec::new(),
        }
    }

    pub fn violation(
        category: RestrictionCategory,
        subject: impl Into<String>,
        severity: Severity,
        confidence: f64,
        message: impl Into<String>,
    ) -> Self {
        Self::new(FindingKind::Violation, category, subject, severity, confidence, message)
    }

    pub fn warning(
        category: RestrictionCategory,
        subject: impl Into<String>,
        severity: Severity,
        confidence: f64,
        message: impl Into<String>,
    ) -> Self {
        Self::new(FindingKind::Warning, category, subject, severity, confidence, message)
    }

    /// Attach the custom rule that produced this finding. The id becomes
    /// `custom:<rule_id>`.
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        let rule_id = rule_id.into();
        self.id = format!("{}:{}", self.category, rule_id);
        self.rule_id = Some(rule_id);
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn is_violation(&self) -> bool {
        matches!(self.kind, FindingKind::Violation)
    }
}

/// Evidence tiers for flag derivation, weakest first so that `max()` picks
/// the winning tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTier {
    Absence,
    Keyword,
    Analysis,
    Certification,
}

impl EvidenceTier {
    /// Tier number as documented (1 = certification, 4 = absence).
    pub fn number(&self) -> u8 {
        match self {
            EvidenceTier::Certification => 1,
            EvidenceTier::Analysis => 2,
            EvidenceTier::Keyword => 3,
            EvidenceTier::Absence => 4,
        }
    }
}

impl fmt::Display for EvidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvidenceTier::Certification => "certification",
            EvidenceTier::Analysis => "analysis tag",
            EvidenceTier::Keyword => "ingredient keyword",
            EvidenceTier::Absence => "absence assumption",
        };
        write!(f, "tier {} {}", self.number(), name)
    }
}

/// Polarity of a dietary indicator in the polarity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

/// Where evidence was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    LabelTags,
    AnalysisTags,
    CategoryTags,
    AllergenTags,
    TraceTags,
    IngredientTags,
    IngredientsText,
    Nutrition,
    Profile,
    DerivedFlags,
}

impl EvidenceSource {
    /// Field name on the product snapshot (or result) the source refers to.
    pub fn field_name(&self) -> &'static str {
        match self {
            EvidenceSource::LabelTags => "label_tags",
            EvidenceSource::AnalysisTags => "ingredients_analysis_tags",
            EvidenceSource::CategoryTags => "category_tags",
            EvidenceSource::AllergenTags => "allergen_tags",
            EvidenceSource::TraceTags => "trace_tags",
            EvidenceSource::IngredientTags => "ingredient_tags",
            EvidenceSource::IngredientsText => "ingredients_text",
            EvidenceSource::Nutrition => "nutritional_values",
            EvidenceSource::Profile => "profile",
            EvidenceSource::DerivedFlags => "dietary_flags",
        }
    }
}

/// Pipeline stage that wrote a derivation note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStage {
    Normalizer,
    Deriver,
    Scorer,
    Rules,
    Resolver,
    Aggregator,
}

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivationNote {
    pub stage: NoteStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<DietaryFlag>,

    pub message: String,
}

impl DerivationNote {
    pub fn new(stage: NoteStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            flag: None,
            message: message.into(),
        }
    }

    pub fn for_flag(flag: DietaryFlag, message: impl Into<String>) -> Self {
        Self {
            stage: NoteStage::Deriver,
            flag: Some(flag),
            message: message.into(),
        }
    }
}

/// A custom-rule verdict suppressed by the conflict resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suppression {
    /// The rule whose verdict was dropped
    pub suppressed_rule_id: String,

    /// The rule that won for the same subject
    pub winning_rule_id: String,

    /// Ingredient token, nutrient key, or `*` for the whole product
    pub subject: String,

    pub reason: String,
}

/// Output of flag derivation, usable without a user profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlagDerivation {
    pub dietary_flags: BTreeMap<DietaryFlag, TriState>,

    pub confidence_scores: BTreeMap<DietaryFlag, f64>,

    /// Winning evidence tier per flag; absent when the flag is unknown
    #[serde(default)]
    pub evidence_tiers: BTreeMap<DietaryFlag, EvidenceTier>,

    /// Evidence behind each flag's winning tier
    #[serde(default)]
    pub flag_evidence: BTreeMap<DietaryFlag, Vec<Evidence>>,

    pub derivation_notes: Vec<DerivationNote>,
}

impl FlagDerivation {
    pub fn value(&self, flag: DietaryFlag) -> TriState {
        self.dietary_flags
            .get(&flag)
            .copied()
            .unwrap_or(TriState::Unknown)
    }

    pub fn confidence(&self, flag: DietaryFlag) -> f64 {
        self.confidence_scores.get(&flag).copied().unwrap_or(0.0)
    }

    pub fn tier(&self, flag: DietaryFlag) -> Option<EvidenceTier> {
        self.evidence_tiers.get(&flag).copied()
    }

    pub fn evidence(&self, flag: DietaryFlag) -> &[Evidence] {
        self.flag_evidence
            .get(&flag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The verdict returned to the caller for one product and one profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceResult {
    pub product_code: String,

    /// True when no violations were raised
    pub safe: bool,

    pub alert_level: AlertLevel,

    pub violations: Vec<Finding>,

    pub warnings: Vec<Finding>,

    pub dietary_flags: BTreeMap<DietaryFlag, TriState>,

    pub confidence_scores: BTreeMap<DietaryFlag, f64>,

    pub quality_score: f64,

    pub completeness_score: f64,

    /// Ranked, truncated reasons for the verdict
    pub explanation: Vec<String>,

    pub derivation_notes: Vec<DerivationNote>,

    #[serde(default)]
    pub suppressions: Vec<Suppression>,
}

impl ComplianceResult {
    /// All findings, violations first.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.violations.iter().chain(self.warnings.iter())
    }

    pub fn has_category(&self, category: RestrictionCategory) -> bool {
        self.findings().any(|f| f.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_accepts_clinical_vocabulary() {
        let s: Severity = serde_json::from_str("\"severe\"").unwrap();
        assert_eq!(s, Severity::High);
        assert!(s.is_severe());

        let s: Severity = serde_json::from_str("\"mild\"").unwrap();
        assert_eq!(s, Severity::Low);
        assert!(!s.is_severe());
    }

    #[test]
    fn test_tier_ordering_picks_strongest() {
        let tiers = [EvidenceTier::Keyword, EvidenceTier::Certification, EvidenceTier::Absence];
        assert_eq!(tiers.iter().max(), Some(&EvidenceTier::Certification));
        assert_eq!(EvidenceTier::Certification.number(), 1);
        assert_eq!(EvidenceTier::Absence.number(), 4);
    }

    #[test]
    fn test_finding_ids() {
        let f = Finding::violation(
            RestrictionCategory::Allergy,
            "milk",
            Severity::High,
            1.4,
            "Contains milk",
        );
        assert_eq!(f.id, "allergy:milk");
        assert_eq!(f.confidence, 1.0);

        let f = Finding::warning(
            RestrictionCategory::Custom,
            "sulfites",
            Severity::Medium,
            1.0,
            "Matched",
        )
        .with_rule("no-sulfites");
        assert_eq!(f.id, "custom:no-sulfites");
        assert_eq!(f.rule_id.as_deref(), Some("no-sulfites"));
    }

    #[test]
    fn test_flag_map_serializes_with_string_keys() {
        let mut flags = BTreeMap::new();
        flags.insert(DietaryFlag::GlutenFree, TriState::Yes);
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"{"gluten_free":"yes"}"#);
    }

    #[test]
    fn test_only_vegan_vegetarian_gluten_allow_inference() {
        assert!(DietaryFlag::Vegan.allows_inference());
        assert!(DietaryFlag::GlutenFree.allows_inference());
        assert!(!DietaryFlag::Kosher.allows_inference());
        assert!(!DietaryFlag::Halal.allows_inference());
        assert!(!DietaryFlag::Organic.allows_inference());
    }
}
