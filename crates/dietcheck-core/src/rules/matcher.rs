//! Bounded glob matcher for custom ingredient patterns.
//!
//! Patterns are a closed language: `*` matches any run of characters, `?`
//! matches exactly one, everything else is a literal. Regex syntax is rejected
//! at compile time. Matching is whole-token and case-insensitive, and every
//! comparison is charged to a [`StepBudget`], so a hostile pattern can cost at
//! most the budget.

use thiserror::Error;

/// Characters with regex meaning that a glob pattern may not contain.
const REJECTED: [char; 12] = ['\\', '.', '+', '(', ')', '[', ']', '{', '}', '^', '$', '|'];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("unsupported character '{0}' in pattern (only '*', '?' and literals are allowed)")]
    Unsupported(char),
}

/// The rule ran out of matching steps.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("pattern step budget of {limit} exhausted")]
pub struct BudgetExceeded {
    pub limit: u64,
}

/// Step allowance shared by every match a single rule performs.
#[derive(Debug, Clone)]
pub struct StepBudget {
    limit: u64,
    used: u64,
}

impl StepBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Charge one step.
    pub fn charge(&mut self) -> Result<(), BudgetExceeded> {
        if self.used >= self.limit {
            return Err(BudgetExceeded { limit: self.limit });
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Literal(char),
    AnyOne,
    AnyRun,
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    elements: Vec<Element>,
}

impl GlobPattern {
    pub fn compile(pattern: &str, max_len: usize) -> Result<Self, PatternError> {
        let source = pattern.trim().to_lowercase();
        if source.is_empty() {
            return Err(PatternError::Empty);
        }

        let len = source.chars().count();
        if len > max_len {
            return Err(PatternError::TooLong { len, max: max_len });
        }

        let mut elements = Vec::with_capacity(len);
        for c in source.chars() {
            if REJECTED.contains(&c) {
                return Err(PatternError::Unsupported(c));
            }
            let element = match c {
                '*' => Element::AnyRun,
                '?' => Element::AnyOne,
                c => Element::Literal(c),
            };
            // `**` is the same as `*`
            if element == Element::AnyRun && elements.last() == Some(&Element::AnyRun) {
                continue;
            }
            elements.push(element);
        }

        Ok(Self { source, elements })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whole-token match.
    pub fn is_match(&self, token: &str, budget: &mut StepBudget) -> Result<bool, BudgetExceeded> {
        let text: Vec<char> = token.to_lowercase().chars().collect();
        let pattern = &self.elements;

        let (mut p, mut t) = (0usize, 0usize);
        // Last `*` seen and the text position it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            budget.charge()?;

            match pattern.get(p) {
                Some(Element::AnyOne) => {
                    p += 1;
                    t += 1;
                }
                Some(Element::Literal(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                }
                Some(Element::AnyRun) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                _ => match backtrack {
                    Some((star, absorbed)) => {
                        p = star + 1;
                        t = absorbed + 1;
                        backtrack = Some((star, absorbed + 1));
                    }
                    None => return Ok(false),
                },
            }
        }

        while pattern.get(p) == Some(&Element::AnyRun) {
            p += 1;
        }
        Ok(p == pattern.len())
    }

    /// Indices of all matching tokens. Stops at the first budget overrun.
    pub fn matching_tokens(
        &self,
        tokens: &[String],
        budget: &mut StepBudget,
    ) -> Result<Vec<usize>, BudgetExceeded> {
        let mut matched = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if self.is_match(token, budget)? {
                matched.push(i);
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matches(pattern: &str, token: &str) -> bool {
        let glob = GlobPattern::compile(pattern, 128).unwrap();
        glob.is_match(token, &mut StepBudget::new(10_000)).unwrap()
    }

    #[test]
    fn test_star_and_question() {
        assert!(matches("sulfite*", "sulfites"));
        assert!(matches("sulfite*", "sulfite"));
        assert!(!matches("sulfite*", "sodium sulfite"));
        assert!(matches("*sulfite*", "sodium sulfite"));
        assert!(matches("e22?", "e220"));
        assert!(!matches("e22?", "e22"));
        assert!(matches("*", ""));
        assert!(matches("SOY*", "soy lecithin"));
    }

    #[test]
    fn test_backtracking_across_multiple_stars() {
        assert!(matches("*a*b*c", "xxaxxbxxc"));
        assert!(!matches("*a*b*c", "xxaxxcxxb"));
        assert!(matches("a*a*a", "aaaaa"));
    }

    #[test]
    fn test_rejects_regex_syntax() {
        assert_eq!(
            GlobPattern::compile("(a+)+$", 128),
            Err(PatternError::Unsupported('('))
        );
        assert_eq!(GlobPattern::compile("milk.*", 128), Err(PatternError::Unsupported('.')));
        assert_eq!(GlobPattern::compile("  ", 128), Err(PatternError::Empty));
        assert_eq!(
            GlobPattern::compile("abcdef", 5),
            Err(PatternError::TooLong { len: 6, max: 5 })
        );
    }

    #[test]
    fn test_budget_is_enforced() {
        let glob = GlobPattern::compile("*a*a*a*a*a*a*b", 128).unwrap();
        let token = "a".repeat(200);
        let mut budget = StepBudget::new(100);
        assert_eq!(
            glob.is_match(&token, &mut budget),
            Err(BudgetExceeded { limit: 100 })
        );
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_budget_shared_across_tokens() {
        let glob = GlobPattern::compile("x*", 128).unwrap();
        let tokens: Vec<String> = (0..10).map(|_| "xyz".to_string()).collect();
        let mut budget = StepBudget::new(25);
        assert!(glob.matching_tokens(&tokens, &mut budget).is_err());

        let mut budget = StepBudget::new(40);
        assert_eq!(glob.matching_tokens(&tokens, &mut budget).unwrap().len(), 10);
    }

    proptest! {
        #[test]
        fn literal_pattern_matches_only_itself(token in "[a-z ]{1,20}", other in "[a-z ]{1,20}") {
            let glob = GlobPattern::compile(&token, 128);
            prop_assume!(glob.is_ok());
            let glob = glob.unwrap();
            let mut budget = StepBudget::new(10_000);
            prop_assert!(glob.is_match(token.trim(), &mut budget).unwrap());
            let mut budget = StepBudget::new(10_000);
            prop_assert_eq!(glob.is_match(&other, &mut budget).unwrap(), other == token.trim());
        }

        #[test]
        fn steps_never_exceed_budget(token in "[ab]{0,64}", limit in 1u64..500) {
            let glob = GlobPattern::compile("*a*b*a*b*", 128).unwrap();
            let mut budget = StepBudget::new(limit);
            let _ = glob.is_match(&token, &mut budget);
            prop_assert!(budget.used() <= limit);
        }
    }
}
