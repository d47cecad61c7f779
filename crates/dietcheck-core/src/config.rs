//! Engine configuration: lookup tables, confidence policy and limits.
//!
//! Every table the normalizer, deriver and restriction checks consult lives
//! here and is handed to [`ComplianceEngine`](crate::ComplianceEngine) at
//! construction. Localizing the engine means supplying a different
//! `EngineConfig`, typically from YAML:
//!
//! ```yaml
//! synonyms:
//!   glutenvrij: gluten-free
//! confidence:
//!   assume_gluten_free_on_absence: false
//! limits:
//!   max_custom_rules: 20
//! ```
//!
//! Sections left out of the file keep their defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DietaryFlag, Polarity};

/// Errors from loading or validating an engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

lazy_static! {
    // Multi-language spellings mapped onto the canonical vocabulary. Keys are
    // already prefix-stripped, lowercased and hyphenated.
    static ref DEFAULT_SYNONYMS: Vec<(&'static str, &'static str)> = vec![
        // vegan
        ("végétalien", "vegan"), ("vegetalien", "vegan"), ("vegano", "vegan"),
        ("vegana", "vegan"), ("vegane", "vegan"), ("certified-vegan", "vegan"),
        ("vegan-society", "vegan"),
        ("non-végétalien", "non-vegan"), ("not-vegan", "non-vegan"),
        ("no-vegano", "non-vegan"),
        // vegetarian
        ("végétarien", "vegetarian"), ("vegetarien", "vegetarian"),
        ("végétarienne", "vegetarian"), ("vegetariano", "vegetarian"),
        ("vegetariana", "vegetarian"), ("vegetarisch", "vegetarian"),
        ("non-végétarien", "non-vegetarian"), ("not-vegetarian", "non-vegetarian"),
        // gluten
        ("sans-gluten", "gluten-free"), ("sin-gluten", "gluten-free"),
        ("senza-glutine", "gluten-free"), ("glutenfrei", "gluten-free"),
        ("no-gluten", "gluten-free"), ("without-gluten", "gluten-free"),
        ("crossed-grain-symbol", "gluten-free"),
        ("avec-gluten", "contains-gluten"), ("con-gluten", "contains-gluten"),
        // organic
        ("bio", "organic"), ("biologique", "organic"), ("biologico", "organic"),
        ("organico", "organic"), ("öko", "organic"), ("eu-organic", "organic"),
        ("usda-organic", "organic"), ("ab-agriculture-biologique", "organic"),
        // kosher / halal
        ("casher", "kosher"), ("kasher", "kosher"), ("koscher", "kosher"),
        ("certified-kosher", "kosher"), ("ou-kosher", "kosher"),
        ("hallal", "halal"), ("certified-halal", "halal"),
        // allergens
        ("lait", "milk"), ("leche", "milk"), ("milch", "milk"), ("latte", "milk"),
        ("dairy", "milk"), ("lactose", "milk"),
        ("oeufs", "eggs"), ("œufs", "eggs"), ("huevos", "eggs"), ("eier", "eggs"),
        ("uova", "eggs"), ("egg", "eggs"),
        ("arachides", "peanuts"), ("cacahuetes", "peanuts"), ("erdnüsse", "peanuts"),
        ("peanut", "peanuts"), ("groundnuts", "peanuts"),
        ("fruits-à-coque", "nuts"), ("fruits-a-coque", "nuts"), ("tree-nuts", "nuts"),
        ("frutos-de-cáscara", "nuts"),
        ("soja", "soybeans"), ("soy", "soybeans"), ("soya", "soybeans"),
        ("soybean", "soybeans"),
        ("poisson", "fish"), ("pescado", "fish"), ("fisch", "fish"),
        ("crustacés", "crustaceans"), ("crustaces", "crustaceans"),
        ("shellfish", "crustaceans"),
        ("mollusques", "molluscs"), ("mollusks", "molluscs"),
        ("sesame", "sesame-seeds"), ("sésame", "sesame-seeds"),
        ("graines-de-sésame", "sesame-seeds"),
        ("moutarde", "mustard"), ("mostaza", "mustard"),
        ("céleri", "celery"), ("celeri", "celery"),
        ("sulfites", "sulphur-dioxide-and-sulphites"),
        ("sulphites", "sulphur-dioxide-and-sulphites"),
        ("anhydride-sulfureux-et-sulfites", "sulphur-dioxide-and-sulphites"),
        ("wheat", "gluten"), ("blé", "gluten"), ("ble", "gluten"),
    ];

    static ref DEFAULT_POLARITY: Vec<(&'static str, DietaryFlag, Polarity)> = vec![
        ("vegan", DietaryFlag::Vegan, Polarity::Positive),
        ("non-vegan", DietaryFlag::Vegan, Polarity::Negative),
        ("vegetarian", DietaryFlag::Vegetarian, Polarity::Positive),
        ("non-vegetarian", DietaryFlag::Vegetarian, Polarity::Negative),
        ("gluten-free", DietaryFlag::GlutenFree, Polarity::Positive),
        ("contains-gluten", DietaryFlag::GlutenFree, Polarity::Negative),
        ("kosher", DietaryFlag::Kosher, Polarity::Positive),
        ("halal", DietaryFlag::Halal, Polarity::Positive),
        ("organic", DietaryFlag::Organic, Polarity::Positive),
    ];

    static ref DEFAULT_ALLERGEN_KEYWORDS: Vec<(&'static str, Vec<&'static str>)> = vec![
        ("milk", vec!["milk", "cream", "butter", "cheese", "whey", "casein", "caseinate",
                      "lactose", "yogurt", "yoghurt", "ghee", "buttermilk", "curd", "lait",
                      "beurre", "fromage"]),
        ("eggs", vec!["egg", "albumin", "albumen", "lysozyme", "mayonnaise", "meringue",
                      "oeuf"]),
        ("peanuts", vec!["peanut", "groundnut", "arachide"]),
        ("nuts", vec!["almond", "hazelnut", "walnut", "cashew", "pecan", "pistachio",
                      "macadamia", "brazil nut"]),
        ("gluten", vec!["wheat", "barley", "rye", "spelt", "malt", "semolina", "durum",
                        "couscous", "bulgur", "farro", "kamut", "triticale", "seitan",
                        "gluten"]),
        ("soybeans", vec!["soy", "soya", "soybean", "tofu", "edamame", "miso", "tempeh"]),
        ("fish", vec!["fish", "anchovy", "anchovies", "tuna", "salmon", "cod", "sardine",
                      "mackerel", "trout", "haddock", "pollock"]),
        ("crustaceans", vec!["shrimp", "prawn", "crab", "lobster", "crayfish", "krill"]),
        ("molluscs", vec!["mussel", "oyster", "clam", "scallop", "squid", "octopus",
                          "snail"]),
        ("sesame-seeds", vec!["sesame", "tahini"]),
        ("mustard", vec!["mustard"]),
        ("celery", vec!["celery", "celeriac"]),
        ("lupin", vec!["lupin", "lupine"]),
        ("sulphur-dioxide-and-sulphites", vec!["sulfite", "sulphite", "sulfur dioxide",
                                               "sulphur dioxide", "metabisulfite", "e220",
                                               "e221", "e222", "e223", "e224", "e226",
                                               "e227", "e228"]),
    ];

    static ref DEFAULT_NEGATIVE_KEYWORDS: Vec<(DietaryFlag, Vec<&'static str>)> = vec![
        (DietaryFlag::Vegetarian, vec![
            "meat", "beef", "pork", "chicken", "turkey", "lamb", "mutton", "veal", "bacon",
            "ham", "gelatin", "gelatine", "lard", "tallow", "suet", "anchovy", "anchovies",
            "fish", "tuna", "salmon", "cod", "sardine", "shrimp", "prawn", "crab", "lobster",
            "rennet", "carmine", "cochineal", "e120", "duck", "venison", "chorizo", "salami",
            "pepperoni", "collagen", "isinglass",
        ]),
        // Vegetarian negatives also count against vegan; only the extra animal
        // products are listed here.
        (DietaryFlag::Vegan, vec![
            "milk", "cream", "butter", "cheese", "whey", "casein", "caseinate", "lactose",
            "yogurt", "yoghurt", "ghee", "egg", "albumin", "honey", "beeswax", "shellac",
            "lanolin", "e901", "e904",
        ]),
        (DietaryFlag::GlutenFree, vec![
            "wheat", "barley", "rye", "spelt", "malt", "semolina", "durum", "couscous",
            "bulgur", "farro", "kamut", "triticale", "seitan", "gluten",
        ]),
        (DietaryFlag::Halal, vec![
            "pork", "bacon", "ham", "lard", "pancetta", "prosciutto", "alcohol", "wine",
            "beer", "rum", "brandy", "ethanol", "liqueur", "whisky",
        ]),
        (DietaryFlag::Kosher, vec![
            "pork", "bacon", "ham", "lard", "pancetta", "prosciutto", "shrimp", "prawn",
            "crab", "lobster", "shellfish", "clam", "oyster", "mussel", "scallop", "squid",
            "octopus",
        ]),
    ];

    static ref DEFAULT_POSITIVE_KEYWORDS: Vec<(DietaryFlag, Vec<&'static str>)> = vec![
        (DietaryFlag::Vegan, vec!["suitable for vegans", "plant-based", "plant based"]),
        (DietaryFlag::Vegetarian, vec!["suitable for vegetarians"]),
        (DietaryFlag::GlutenFree, vec!["gluten-free", "gluten free", "sans gluten"]),
    ];

    // Phrases that neutralize a keyword inside them ("cocoa butter" is not dairy).
    static ref DEFAULT_KEYWORD_EXCLUSIONS: Vec<(&'static str, Vec<&'static str>)> = vec![
        ("butter", vec!["peanut butter", "cocoa butter", "shea butter", "nut butter",
                        "almond butter", "apple butter"]),
        ("milk", vec!["coconut milk", "almond milk", "oat milk", "soy milk", "soya milk",
                      "rice milk", "cashew milk", "milk-free"]),
        ("cream", vec!["coconut cream", "cream of tartar"]),
        ("gluten", vec!["gluten-free", "gluten free", "sans gluten"]),
        ("egg", vec!["egg-free", "eggplant"]),
        ("fish", vec!["fish-free"]),
    ];

    static ref DEFAULT_MEDICAL_PRESETS: Vec<(&'static str, Vec<(&'static str, f64)>)> = vec![
        ("diabetes", vec![("sugars_100g", 5.0), ("carbohydrates_100g", 30.0)]),
        ("hypertension", vec![("salt_100g", 1.5), ("sodium_100g", 0.6)]),
        ("high_cholesterol", vec![("saturated-fat_100g", 5.0), ("cholesterol_100g", 0.1)]),
        ("kidney_disease", vec![("sodium_100g", 0.6), ("proteins_100g", 20.0)]),
    ];
}

/// One row of the polarity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolarityEntry {
    pub flag: DietaryFlag,
    pub polarity: Polarity,
}

/// Confidence assigned at each evidence tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidencePolicy {
    /// Tier 1: explicit certification tag
    pub certification: f64,

    /// Tier 2: explicit positive analysis tag
    pub analysis_positive: f64,

    /// Tier 2: explicit negative analysis tag (must be >= positive)
    pub analysis_negative: f64,

    /// Tier 3: positive ingredient keyword ("gluten-free")
    pub keyword_positive: f64,

    /// Tier 3: negative ingredient keyword ("whey", "wheat")
    pub keyword_negative: f64,

    /// Tier 4: per-flag absence assumption; only vegan, vegetarian and
    /// gluten_free are honored
    pub absence: BTreeMap<DietaryFlag, f64>,

    /// When false, no gluten evidence yields `unknown` instead of a weak yes
    pub assume_gluten_free_on_absence: bool,

    /// Allergen present in the product's allergen tags
    pub allergen_tag: f64,

    /// Allergen inferred from an ingredient keyword
    pub allergen_keyword: f64,

    /// Allergen listed in "may contain" trace tags
    pub trace_tag: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        let mut absence = BTreeMap::new();
        absence.insert(DietaryFlag::Vegan, 0.30);
        absence.insert(DietaryFlag::Vegetarian, 0.40);
        absence.insert(DietaryFlag::GlutenFree, 0.50);

        Self {
            certification: 0.90,
            analysis_positive: 0.80,
            analysis_negative: 0.80,
            keyword_positive: 0.70,
            keyword_negative: 0.80,
            absence,
            assume_gluten_free_on_absence: true,
            allergen_tag: 0.95,
            allergen_keyword: 0.75,
            trace_tag: 0.90,
        }
    }
}

impl ConfidencePolicy {
    /// Confidence of an absence-based assumption, or `None` when the flag may
    /// not be assumed.
    pub fn absence_confidence(&self, flag: DietaryFlag) -> Option<f64> {
        if !flag.allows_inference() {
            return None;
        }
        if flag == DietaryFlag::GlutenFree && !self.assume_gluten_free_on_absence {
            return None;
        }
        self.absence.get(&flag).copied()
    }
}

/// Quality bonus and alerting thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringPolicy {
    /// A derived flag at or above this confidence counts as high-confidence
    pub high_confidence_threshold: f64,

    pub bonus_per_flag: f64,

    pub bonus_cap: f64,

    /// Flags relevant to a restriction below this confidence force Caution
    pub low_confidence_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.80,
            bonus_per_flag: 0.05,
            bonus_cap: 0.20,
            low_confidence_threshold: 0.60,
        }
    }
}

/// Bounds that keep a single evaluation short.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineLimits {
    /// Active custom rules evaluated per product; the rest are skipped
    pub max_custom_rules: usize,

    /// Matcher steps each custom rule may spend across all ingredient tokens
    pub matcher_step_budget: u64,

    pub max_pattern_len: usize,

    pub max_ingredient_tokens: usize,

    /// Explanation lines before the "+N more" marker
    pub explanation_limit: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_custom_rules: 50,
            matcher_step_budget: 10_000,
            max_pattern_len: 128,
            max_ingredient_tokens: 500,
            explanation_limit: 5,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Raw token -> canonical token
    pub synonyms: BTreeMap<String, String>,

    /// Canonical token -> (flag, polarity)
    pub polarity: BTreeMap<String, PolarityEntry>,

    /// Canonical allergen -> ingredient keywords
    pub allergen_keywords: BTreeMap<String, Vec<String>>,

    /// Keywords whose presence is negative evidence for a flag
    pub negative_keywords: BTreeMap<DietaryFlag, Vec<String>>,

    /// Keywords whose presence is positive evidence for a flag
    pub positive_keywords: BTreeMap<DietaryFlag, Vec<String>>,

    /// Keyword -> phrases in which a match of that keyword is ignored
    pub keyword_exclusions: BTreeMap<String, Vec<String>>,

    /// Medical condition -> default nutrient thresholds (per 100g)
    pub medical_presets: BTreeMap<String, BTreeMap<String, f64>>,

    pub confidence: ConfidencePolicy,

    pub scoring: ScoringPolicy,

    pub limits: EngineLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| w.to_string()).collect()
        }

        Self {
            synonyms: DEFAULT_SYNONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            polarity: DEFAULT_POLARITY
                .iter()
                .map(|(token, flag, polarity)| {
                    (
                        token.to_string(),
                        PolarityEntry {
                            flag: *flag,
                            polarity: *polarity,
                        },
                    )
                })
                .collect(),
            allergen_keywords: DEFAULT_ALLERGEN_KEYWORDS
                .iter()
                .map(|(allergen, words)| (allergen.to_string(), owned(words)))
                .collect(),
            negative_keywords: DEFAULT_NEGATIVE_KEYWORDS
                .iter()
                .map(|(flag, words)| (*flag, owned(words)))
                .collect(),
            positive_keywords: DEFAULT_POSITIVE_KEYWORDS
                .iter()
                .map(|(flag, words)| (*flag, owned(words)))
                .collect(),
            keyword_exclusions: DEFAULT_KEYWORD_EXCLUSIONS
                .iter()
                .map(|(keyword, phrases)| (keyword.to_string(), owned(phrases)))
                .collect(),
            medical_presets: DEFAULT_MEDICAL_PRESETS
                .iter()
                .map(|(condition, thresholds)| {
                    (
                        condition.to_string(),
                        thresholds
                            .iter()
                            .map(|(nutrient, max)| (nutrient.to_string(), *max))
                            .collect(),
                    )
                })
                .collect(),
            confidence: ConfidencePolicy::default(),
            scoring: ScoringPolicy::default(),
            limits: EngineLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from YAML. Missing sections keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Check confidences and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.confidence;
        let named = [
            ("certification", c.certification),
            ("analysis_positive", c.analysis_positive),
            ("analysis_negative", c.analysis_negative),
            ("keyword_positive", c.keyword_positive),
            ("keyword_negative", c.keyword_negative),
            ("allergen_tag", c.allergen_tag),
            ("allergen_keyword", c.allergen_keyword),
            ("trace_tag", c.trace_tag),
        ];
        for (name, value) in named {
            check_unit(&format!("confidence.{}", name), value)?;
        }
        for (flag, value) in &c.absence {
            check_unit(&format!("confidence.absence.{}", flag), *value)?;
        }

        // Safety bias: negative evidence never counts for less than positive
        // evidence of the same tier.
        if c.analysis_negative < c.analysis_positive {
            return Err(ConfigError::Invalid(
                "confidence.analysis_negative must be >= analysis_positive".to_string(),
            ));
        }
        if c.keyword_negative < c.keyword_positive {
            return Err(ConfigError::Invalid(
                "confidence.keyword_negative must be >= keyword_positive".to_string(),
            ));
        }

        let s = &self.scoring;
        check_unit("scoring.high_confidence_threshold", s.high_confidence_threshold)?;
        check_unit("scoring.bonus_per_flag", s.bonus_per_flag)?;
        check_unit("scoring.bonus_cap", s.bonus_cap)?;
        check_unit("scoring.low_confidence_threshold", s.low_confidence_threshold)?;

        let l = &self.limits;
        if l.max_custom_rules == 0
            || l.matcher_step_budget == 0
            || l.max_pattern_len == 0
            || l.max_ingredient_tokens == 0
            || l.explanation_limit == 0
        {
            return Err(ConfigError::Invalid(
                "all limits must be greater than zero".to_string(),
            ));
        }

        for (condition, thresholds) in &self.medical_presets {
            for (nutrient, max) in thresholds {
                if !max.is_finite() || *max < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "medical_presets.{}.{} must be a finite non-negative number",
                        condition, nutrient
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}
