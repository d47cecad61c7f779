//! Tag Normalizer
//!
//! Turns raw, locale-namespaced tag strings (`"en:vegan"`, `"fr:végétarien"`)
//! into canonical tokens and classifies them through the polarity table.
//! Tags that map to nothing are kept in `unmapped` for audit.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::evidence::Evidence;
use crate::product::ProductSnapshot;
use crate::types::{DerivationNote, DietaryFlag, EvidenceSource, NoteStage, Polarity};

/// A classified dietary indicator. Only the normalizer produces these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    /// Positive token on the product label
    Certification(DietaryFlag),
    /// Positive analysis or category evidence
    Positive(DietaryFlag),
    /// Negative evidence from any tag source
    Negative(DietaryFlag),
}

impl Indicator {
    pub fn flag(&self) -> DietaryFlag {
        match self {
            Indicator::Certification(f) | Indicator::Positive(f) | Indicator::Negative(f) => *f,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Indicator::Negative(_))
    }
}

/// An indicator together with the tag it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorHit {
    pub indicator: Indicator,

    /// Canonical token after synonym mapping
    pub token: String,

    /// Tag exactly as supplied
    pub raw: String,

    pub source: EvidenceSource,

    pub index: usize,
}

impl IndicatorHit {
    pub fn evidence(&self, claim: impl Into<String>) -> Evidence {
        Evidence::from_tag(claim, self.source, self.index)
    }
}

/// Reference back to one entry of a product tag array.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRef {
    pub raw: String,
    pub source: EvidenceSource,
    pub index: usize,
}

impl TagRef {
    pub fn evidence(&self, claim: impl Into<String>) -> Evidence {
        Evidence::from_tag(claim, self.source, self.index)
    }
}

/// Normalized view of a product's tags.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTags {
    pub indicators: Vec<IndicatorHit>,

    /// Canonical allergen -> tags declaring it
    pub allergens: BTreeMap<String, Vec<TagRef>>,

    /// Canonical allergen -> "may contain" tags
    pub traces: BTreeMap<String, Vec<TagRef>>,

    /// (tag index, ingredient token) for every ingredient tag
    pub ingredients: Vec<(usize, String)>,

    pub unmapped: Vec<String>,
}

impl NormalizedTags {
    pub fn certification(&self, flag: DietaryFlag) -> impl Iterator<Item = &IndicatorHit> {
        self.with_indicator(Indicator::Certification(flag))
    }

    pub fn positive(&self, flag: DietaryFlag) -> impl Iterator<Item = &IndicatorHit> {
        self.with_indicator(Indicator::Positive(flag))
    }

    pub fn negative(&self, flag: DietaryFlag) -> impl Iterator<Item = &IndicatorHit> {
        self.with_indicator(Indicator::Negative(flag))
    }

    fn with_indicator(&self, indicator: Indicator) -> impl Iterator<Item = &IndicatorHit> {
        self.indicators
            .iter()
            .filter(move |hit| hit.indicator == indicator)
    }

    /// One audit note summarizing unmapped tags.
    pub fn notes(&self) -> Vec<DerivationNote> {
        if self.unmapped.is_empty() {
            return Vec::new();
        }
        vec![DerivationNote::new(
            NoteStage::Normalizer,
            format!(
                "{} tag(s) had no dietary mapping: {}",
                self.unmapped.len(),
                self.unmapped.join(", ")
            ),
        )]
    }
}

/// Canonicalizes tags using the engine's synonym and polarity tables.
#[derive(Debug, Clone)]
pub struct TagNormalizer {
    config: Arc<EngineConfig>,
}

impl TagNormalizer {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Canonical token for a raw tag or profile term: locale prefix stripped,
    /// lowercased, separators folded to `-`, synonyms applied.
    pub fn canonical_token(&self, raw: &str) -> String {
        let folded = fold(strip_locale(raw.trim()), '-');
        match self.config.synonyms.get(&folded) {
            Some(canonical) => canonical.clone(),
            None => folded,
        }
    }

    /// Ingredient token for an ingredient tag (`en:wheat-flour` -> `wheat flour`).
    pub fn ingredient_token(&self, raw: &str) -> String {
        fold(strip_locale(raw.trim()), ' ')
    }

    pub fn normalize(&self, product: &ProductSnapshot) -> NormalizedTags {
        let mut tags = NormalizedTags::default();

        self.classify(&mut tags, product.label_tags.as_deref(), EvidenceSource::LabelTags);
        self.classify(
            &mut tags,
            product.ingredients_analysis_tags.as_deref(),
            EvidenceSource::AnalysisTags,
        );
        self.classify(&mut tags, product.category_tags.as_deref(), EvidenceSource::CategoryTags);

        for (index, raw) in non_blank(product.allergen_tags.as_deref()) {
            tags.allergens
                .entry(self.canonical_token(raw))
                .or_default()
                .push(TagRef {
                    raw: raw.to_string(),
                    source: EvidenceSource::AllergenTags,
                    index,
                });
        }

        for (index, raw) in non_blank(product.trace_tags.as_deref()) {
            tags.traces
                .entry(self.canonical_token(raw))
                .or_default()
                .push(TagRef {
                    raw: raw.to_string(),
                    source: EvidenceSource::TraceTags,
                    index,
                });
        }

        for (index, raw) in non_blank(product.ingredient_tags.as_deref()) {
            let token = self.ingredient_token(raw);
            if !token.is_empty() {
                tags.ingredients.push((index, token));
            }
        }

        tracing::debug!(
            indicators = tags.indicators.len(),
            allergens = tags.allergens.len(),
            unmapped = tags.unmapped.len(),
            "Normalized product tags"
        );

        tags
    }

    fn classify(&self, tags: &mut NormalizedTags, raw_tags: Option<&[String]>, source: EvidenceSource) {
        for (index, raw) in non_blank(raw_tags) {
            let token = self.canonical_token(raw);
            let Some(entry) = self.config.polarity.get(&token) else {
                tags.unmapped.push(raw.to_string());
                continue;
            };

            let indicator = match (entry.polarity, source) {
                (Polarity::Positive, EvidenceSource::LabelTags) => {
                    Indicator::Certification(entry.flag)
                }
                (Polarity::Positive, _) => Indicator::Positive(entry.flag),
                (Polarity::Negative, _) => Indicator::Negative(entry.flag),
            };

            tags.indicators.push(IndicatorHit {
                indicator,
                token,
                raw: raw.to_string(),
                source,
                index,
            });
        }
    }
}

fn non_blank(tags: Option<&[String]>) -> impl Iterator<Item = (usize, &str)> {
    tags.unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, t)| (i, t.as_str()))
        .filter(|(_, t)| !t.trim().is_empty())
}

/// Strip a two or three letter locale namespace (`en:`, `fr:`, `nl:`).
fn strip_locale(tag: &str) -> &str {
    match tag.split_once(':') {
        Some((prefix, rest))
            if (2..=3).contains(&prefix.len())
                && prefix.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            rest.trim()
        }
        _ => tag,
    }
}

fn fold(token: &str, separator: char) -> String {
    let lowered = token.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending = false;

    for c in lowered.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending = !out.is_empty();
        } else {
            if pending {
                out.push(separator);
                pending = false;
            }
            out.push(c);
        }
    }

    out
}
