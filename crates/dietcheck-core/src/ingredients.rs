//! Ingredient text preprocessing.
//!
//! Produces the lowercased ingredient text used for keyword spans and the
//! flat token list custom patterns are matched against.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LEADING_LABEL: Regex = Regex::new(
        r"^\s*(?:ingredients?|ingrédients?|ingredientes|zutaten|contains)\s*:\s*"
    ).unwrap();

    static ref PERCENTAGE: Regex = Regex::new(r"\d+(?:[.,]\d+)?\s*%").unwrap();

    static ref SEPARATOR: Regex = Regex::new(r"[,;:()\[\]{}]|\.(?:\s|$)").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

const LABEL_WORDS: [&str; 4] = ["ingredients", "ingredient", "contains", "may contain"];

/// Preprocessed ingredient data for one product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngredientList {
    /// Lowercased ingredient text; byte offsets line up with the original
    /// for ASCII input
    pub text: Option<String>,

    /// (tag index, token) for each ingredient tag
    pub tag_tokens: Vec<(usize, String)>,

    /// Deduplicated tokens from the text followed by tag tokens
    pub tokens: Vec<String>,

    /// True when the token list hit the configured cap
    pub truncated: bool,
}

impl IngredientList {
    pub fn parse(text: Option<&str>, tag_tokens: &[(usize, String)], max_tokens: usize) -> Self {
        let text = text
            .map(str::to_lowercase)
            .filter(|t| !t.trim().is_empty());

        let mut tokens: Vec<String> = Vec::new();
        let mut truncated = false;

        let from_text = text.as_deref().map(tokenize).unwrap_or_default();
        let from_tags = tag_tokens.iter().map(|(_, t)| t.clone());

        for token in from_text.into_iter().chain(from_tags) {
            if tokens.contains(&token) {
                continue;
            }
            if tokens.len() >= max_tokens {
                truncated = true;
                break;
            }
            tokens.push(token);
        }

        Self {
            text,
            tag_tokens: tag_tokens.to_vec(),
            tokens,
            truncated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.tag_tokens.is_empty()
    }
}

/// Split lowercased ingredient text into clean tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let body = LEADING_LABEL.replace(text, "");
    let body = PERCENTAGE.replace_all(&body, " ");

    SEPARATOR
        .split(&body)
        .map(|part| {
            let cleaned: String = part.chars().filter(|c| *c != '_' && *c != '*').collect();
            WHITESPACE.replace_all(cleaned.trim(), " ").into_owned()
        })
        .filter(|token| !token.is_empty() && !LABEL_WORDS.contains(&token.as_str()))
        .collect()
}
