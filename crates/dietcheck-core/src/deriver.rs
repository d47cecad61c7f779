//! Compliance Flag Deriver
//!
//! Derives a yes/no/unknown value and a confidence for every dietary flag
//! from four evidence tiers:
//!
//! | Tier | Evidence | Flags |
//! |------|----------|-------|
//! | 1 | certification tag on the label | all |
//! | 2 | analysis tag (positive or negative) | vegan, vegetarian, gluten_free |
//! | 3 | ingredient keyword | negative: all with a keyword list; positive: vegan, vegetarian, gluten_free |
//! | 4 | absence of any evidence | vegan, vegetarian, gluten_free |
//!
//! A certification decides the value outright. Otherwise any negative
//! indicator (analysis tag or ingredient keyword) beats every positive one,
//! whatever its tier; with no negatives the highest positive tier wins.
//! Evidence that disagrees with the outcome is recorded as an overridden
//! conflict in the derivation notes.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::evidence::Evidence;
use crate::ingredients::IngredientList;
use crate::keywords::KeywordTables;
use crate::normalizer::{IndicatorHit, NormalizedTags};
use crate::types::{DerivationNote, DietaryFlag, EvidenceTier, FlagDerivation, Polarity, TriState};

/// One piece of evidence for a flag before tier resolution.
#[derive(Debug, Clone)]
struct Candidate {
    tier: EvidenceTier,
    polarity: Polarity,
    confidence: f64,
    token: String,
    evidence: Evidence,
}

/// Derives dietary flags from normalized tags and ingredient data.
pub struct FlagDeriver<'a> {
    config: &'a EngineConfig,
    keywords: &'a KeywordTables,
}

impl<'a> FlagDeriver<'a> {
    pub fn new(config: &'a EngineConfig, keywords: &'a KeywordTables) -> Self {
        Self { config, keywords }
    }

    pub fn derive(&self, tags: &NormalizedTags, ingredients: &IngredientList) -> FlagDerivation {
        let mut derivation = FlagDerivation::default();

        for flag in DietaryFlag::ALL {
            let candidates = self.collect(flag, tags, ingredients);
            self.resolve(flag, candidates, &mut derivation);
        }

        tracing::debug!(
            known = derivation
                .dietary_flags
                .values()
                .filter(|v| !v.is_unknown())
                .count(),
            "Derived dietary flags"
        );

        derivation
    }

    fn collect(
        &self,
        flag: DietaryFlag,
        tags: &NormalizedTags,
        ingredients: &IngredientList,
    ) -> Vec<Candidate> {
        let policy = &self.config.confidence;
        let mut candidates = Vec::new();

        // Tier 1
        let mut certified: Vec<&IndicatorHit> = tags.certification(flag).collect();
        if flag == DietaryFlag::Vegetarian {
            certified.extend(tags.certification(DietaryFlag::Vegan));
        }
        for hit in certified {
            candidates.push(Candidate {
                tier: EvidenceTier::Certification,
                polarity: Polarity::Positive,
                confidence: policy.certification,
                token: hit.token.clone(),
                evidence: hit.evidence(format!("Certified {} ({})", flag, hit.raw)),
            });
        }

        // Tier 2
        if flag.allows_inference() {
            let mut positive: Vec<&IndicatorHit> = tags.positive(flag).collect();
            let mut negative: Vec<&IndicatorHit> = tags.negative(flag).collect();
            match flag {
                DietaryFlag::Vegetarian => positive.extend(tags.positive(DietaryFlag::Vegan)),
                DietaryFlag::Vegan => negative.extend(tags.negative(DietaryFlag::Vegetarian)),
                _ => {}
            }

            for hit in positive {
                candidates.push(Candidate {
                    tier: EvidenceTier::Analysis,
                    polarity: Polarity::Positive,
                    confidence: policy.analysis_positive,
                    token: hit.token.clone(),
                    evidence: hit.evidence(format!("Analysis tag '{}' supports {}", hit.raw, flag)),
                });
            }
            for hit in negative {
                candidates.push(Candidate {
                    tier: EvidenceTier::Analysis,
                    polarity: Polarity::Negative,
                    confidence: policy.analysis_negative,
                    token: hit.token.clone(),
                    evidence: hit.evidence(format!("Analysis tag '{}' rules out {}", hit.raw, flag)),
                });
            }
        }

        // Tier 3
        if let Some(matcher) = self.keywords.negative(flag) {
            for hit in matcher.scan(ingredients) {
                candidates.push(Candidate {
                    tier: EvidenceTier::Keyword,
                    polarity: Polarity::Negative,
                    confidence: policy.keyword_negative,
                    evidence: hit.evidence(format!("Ingredient '{}' rules out {}", hit.keyword, flag)),
                    token: hit.keyword,
                });
            }
        }
        if let Some(matcher) = self.keywords.positive(flag) {
            for hit in matcher.scan(ingredients) {
                candidates.push(Candidate {
                    tier: EvidenceTier::Keyword,
                    polarity: Polarity::Positive,
                    confidence: policy.keyword_positive,
                    evidence: hit.evidence(format!("Ingredient text '{}' supports {}", hit.keyword, flag)),
                    token: hit.keyword,
                });
            }
        }

        candidates
    }

    fn resolve(&self, flag: DietaryFlag, candidates: Vec<Candidate>, out: &mut FlagDerivation) {
        let Some(top_tier) = candidates.iter().map(|c| c.tier).max() else {
            self.resolve_absence(flag, out);
            return;
        };

        // Certification only ever carries positive evidence and is final.
        // Below it, any negative indicator decides the flag.
        let polarity = if top_tier != EvidenceTier::Certification
            && candidates.iter().any(|c| c.polarity == Polarity::Negative)
        {
            Polarity::Negative
        } else {
            Polarity::Positive
        };

        let (winners, rest): (Vec<Candidate>, Vec<Candidate>) = match polarity {
            Polarity::Negative => candidates
                .into_iter()
                .partition(|c| c.polarity == Polarity::Negative),
            Polarity::Positive => candidates.into_iter().partition(|c| c.tier == top_tier),
        };
        let tier = winners.iter().map(|c| c.tier).max().unwrap_or(top_tier);

        let confidence = winners
            .iter()
            .map(|c| c.confidence)
            .fold(0.0_f64, f64::max)
            .clamp(0.0, 1.0);
        let value = match polarity {
            Polarity::Positive => TriState::Yes,
            Polarity::Negative => TriState::No,
        };

        out.derivation_notes.push(DerivationNote::for_flag(
            flag,
            format!("{}: {} via {} ({})", flag, value, tier, tokens(&winners)),
        ));

        let mut overridden: BTreeMap<EvidenceTier, Vec<Candidate>> = BTreeMap::new();
        for candidate in rest.into_iter().filter(|c| c.polarity != polarity) {
            overridden.entry(candidate.tier).or_default().push(candidate);
        }
        for (conflict_tier, conflicting) in overridden.iter().rev() {
            let message = match polarity {
                Polarity::Negative => format!(
                    "{}: negative evidence outranks positive {} ({} ignored)",
                    flag,
                    conflict_tier,
                    tokens(conflicting)
                ),
                Polarity::Positive => format!(
                    "{}: {} overrides conflicting {} ({})",
                    flag,
                    tier,
                    conflict_tier,
                    tokens(conflicting)
                ),
            };
            out.derivation_notes.push(DerivationNote::for_flag(flag, message));
        }

        out.dietary_flags.insert(flag, value);
        out.confidence_scores.insert(flag, confidence);
        out.evidence_tiers.insert(flag, tier);
        out.flag_evidence
            .insert(flag, winners.into_iter().map(|c| c.evidence).collect());
    }

    fn resolve_absence(&self, flag: DietaryFlag, out: &mut FlagDerivation) {
        match self.config.confidence.absence_confidence(flag) {
            Some(confidence) => {
                out.dietary_flags.insert(flag, TriState::Yes);
                out.confidence_scores.insert(flag, confidence.clamp(0.0, 1.0));
                out.evidence_tiers.insert(flag, EvidenceTier::Absence);
                out.derivation_notes.push(DerivationNote::for_flag(
                    flag,
                    format!(
                        "{}: yes via {} (no contrary evidence found)",
                        flag,
                        EvidenceTier::Absence
                    ),
                ));
            }
            None => {
                out.dietary_flags.insert(flag, TriState::Unknown);
                out.confidence_scores.insert(flag, 0.0);
                let reason = if flag.allows_inference() {
                    "absence assumption disabled"
                } else {
                    "requires explicit certification"
                };
                out.derivation_notes.push(DerivationNote::for_flag(
                    flag,
                    format!("{}: unknown, no evidence ({})", flag, reason),
                ));
            }
        }
    }
}

fn tokens(candidates: &[Candidate]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for c in candidates {
        if !seen.contains(&c.token.as_str()) {
            seen.push(&c.token);
        }
    }
    seen.join(", ")
}
