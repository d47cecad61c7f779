//! Keyword detection over ingredient text and ingredient tags.
//!
//! Keywords are compiled once per engine into word-boundary regexes that also
//! accept simple plurals (`egg` matches `eggs`). Each keyword may carry a set
//! of exclusion phrases: a hit that falls inside an exclusion span is dropped,
//! so `cocoa butter` never counts as dairy.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::{ConfigError, EngineConfig};
use crate::evidence::Evidence;
use crate::ingredients::IngredientList;
use crate::types::{DietaryFlag, EvidenceSource};

/// Where a keyword was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitLocation {
    /// Byte span in the lowercased ingredient text
    Text { start: usize, end: usize },
    /// Index into the product's ingredient tags
    Tag { index: usize },
}

/// A single keyword occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub keyword: String,
    pub location: HitLocation,
}

impl KeywordHit {
    pub fn evidence(&self, claim: impl Into<String>) -> Evidence {
        match self.location {
            HitLocation::Text { start, end } => Evidence::from_ingredients(claim, start, end),
            HitLocation::Tag { index } => {
                Evidence::from_tag(claim, EvidenceSource::IngredientTags, index)
            }
        }
    }
}

struct CompiledKeyword {
    keyword: String,
    pattern: Regex,
    exclusions: Vec<Regex>,
}

/// A compiled keyword list.
pub struct KeywordMatcher {
    entries: Vec<CompiledKeyword>,
}

impl KeywordMatcher {
    pub fn new<I, S>(
        keywords: I,
        exclusions: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<CompiledKeyword> = Vec::new();

        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if keyword.is_empty() || entries.iter().any(|e| e.keyword == keyword) {
                continue;
            }

            let pattern = Regex::new(&format!(r"(?i)\b{}(?:e?s)?\b", regex::escape(&keyword)))?;
            let exclusions = exclusions
                .get(&keyword)
                .map(|phrases| {
                    phrases
                        .iter()
                        .map(|p| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(p.trim()))))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?
                .unwrap_or_default();

            entries.push(CompiledKeyword {
                keyword,
                pattern,
                exclusions,
            });
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find keyword hits in a piece of text, ordered by position.
    pub fn find(&self, text: &str) -> Vec<(String, usize, usize)> {
        let mut hits = Vec::new();

        for entry in &self.entries {
            let excluded: Vec<(usize, usize)> = entry
                .exclusions
                .iter()
                .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
                .collect();

            for m in entry.pattern.find_iter(text) {
                let inside_exclusion = excluded
                    .iter()
                    .any(|(start, end)| m.start() >= *start && m.end() <= *end);
                if !inside_exclusion {
                    hits.push((entry.keyword.clone(), m.start(), m.end()));
                }
            }
        }

        hits.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        hits
    }

    /// Scan the ingredient text and every ingredient tag.
    pub fn scan(&self, ingredients: &IngredientList) -> Vec<KeywordHit> {
        let mut hits: Vec<KeywordHit> = ingredients
            .text
            .as_deref()
            .map(|text| {
                self.find(text)
                    .into_iter()
                    .map(|(keyword, start, end)| KeywordHit {
                        keyword,
                        location: HitLocation::Text { start, end },
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (index, token) in &ingredients.tag_tokens {
            for (keyword, _, _) in self.find(token) {
                hits.push(KeywordHit {
                    keyword,
                    location: HitLocation::Tag { index: *index },
                });
            }
        }

        hits
    }
}

/// Every keyword list in the configuration, compiled.
pub struct KeywordTables {
    negative: BTreeMap<DietaryFlag, KeywordMatcher>,
    positive: BTreeMap<DietaryFlag, KeywordMatcher>,
    allergens: BTreeMap<String, KeywordMatcher>,
    exclusions: BTreeMap<String, Vec<String>>,
}

impl KeywordTables {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let exclusions = &config.keyword_exclusions;
        let compile = |words: &[String]| -> Result<KeywordMatcher, ConfigError> {
            KeywordMatcher::new(words, exclusions)
                .map_err(|e| ConfigError::Invalid(format!("bad keyword: {}", e)))
        };

        let mut negative = BTreeMap::new();
        for flag in DietaryFlag::ALL {
            let mut words: Vec<String> =
                config.negative_keywords.get(&flag).cloned().unwrap_or_default();
            // Anything that rules out vegetarian rules out vegan too
            if flag == DietaryFlag::Vegan {
                if let Some(extra) = config.negative_keywords.get(&DietaryFlag::Vegetarian) {
                    words.extend(extra.iter().cloned());
                }
            }
            negative.insert(flag, compile(words.as_slice())?);
        }

        let mut positive = BTreeMap::new();
        for flag in DietaryFlag::ALL.into_iter().filter(|f| f.allows_inference()) {
            let words = config.positive_keywords.get(&flag).cloned().unwrap_or_default();
            positive.insert(flag, compile(words.as_slice())?);
        }

        let mut allergens = BTreeMap::new();
        for (allergen, words) in &config.allergen_keywords {
            allergens.insert(allergen.clone(), compile(words.as_slice())?);
        }

        Ok(Self {
            negative,
            positive,
            allergens,
            exclusions: exclusions.clone(),
        })
    }

    pub fn negative(&self, flag: DietaryFlag) -> Option<&KeywordMatcher> {
        self.negative.get(&flag)
    }

    /// Positive keywords; only vegan, vegetarian and gluten_free have any.
    pub fn positive(&self, flag: DietaryFlag) -> Option<&KeywordMatcher> {
        self.positive.get(&flag)
    }

    pub fn allergen(&self, allergen: &str) -> Option<&KeywordMatcher> {
        self.allergens.get(allergen)
    }

    /// Matcher for an allergen missing from the keyword table: the allergen
    /// name itself, with hyphens read as spaces.
    pub fn fallback_allergen(&self, allergen: &str) -> Result<KeywordMatcher, regex::Error> {
        KeywordMatcher::new([allergen.replace('-', " ")], &self.exclusions)
    }
}
