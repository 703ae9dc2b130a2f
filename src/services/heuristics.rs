//! Local fallbacks used when a capability provider is absent or fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::pipeline::{Classification, TextInsights, DEFAULT_CLASSIFICATION, DEFAULT_SENTIMENT};

/// Text substituted for OCR output when no OCR provider is configured.
pub const PLACEHOLDER_OCR_TEXT: &str = "Texto de ejemplo extraído de la imagen.";

/// Categories offered to the classification provider, in rule order.
pub const CATEGORIES: &[&str] = &["Finance", "Legal", "Events", DEFAULT_CLASSIFICATION];

const MIN_KEY_PHRASE_CHARS: usize = 5;
const MAX_KEY_PHRASES: usize = 5;

static SPANISH_STOPWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(el|la|de|que|y)\b").expect("valid regex"));

static ENGLISH_STOPWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(the|and|of|is)\b").expect("valid regex"));

// ── Category rules, tried in order ────────────────────────────────────────

static CATEGORY_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"factura|importe|total|cantidad", "Finance"),
        (r"contrato|acuerdo|vencimiento", "Legal"),
        (r"evento|fecha|lugar", "Events"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid regex"), label))
    .collect()
});

/// Guess the dominant language from common stopwords: "es", "en" or "unknown".
pub fn detect_language(text: &str) -> &'static str {
    if SPANISH_STOPWORDS.is_match(text) {
        "es"
    } else if ENGLISH_STOPWORDS.is_match(text) {
        "en"
    } else {
        "unknown"
    }
}

/// First five whitespace tokens longer than four characters, neutral sentiment.
pub fn analyze_text(text: &str) -> TextInsights {
    let key_phrases = text
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_KEY_PHRASE_CHARS)
        .take(MAX_KEY_PHRASES)
        .map(str::to_string)
        .collect();

    TextInsights {
        sentiment: DEFAULT_SENTIMENT.to_string(),
        key_phrases,
    }
}

/// Rule-based classification over key phrases. Always yields a label.
pub fn classify_by_keywords(key_phrases: &[String]) -> Classification {
    let haystack = key_phrases.join(" ").to_lowercase();
    let label = CATEGORY_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(&haystack))
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_CLASSIFICATION);

    Classification {
        label: label.to_string(),
        confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_placeholder_is_spanish() {
        assert_eq!(detect_language(PLACEHOLDER_OCR_TEXT), "es");
    }

    #[test]
    fn test_english_detected() {
        assert_eq!(detect_language("The invoice is attached"), "en");
    }

    #[test]
    fn test_stopwords_need_word_boundaries() {
        // "Yes" contains "y" and "de" appears inside "index", neither is a word.
        assert_eq!(detect_language("Yes index"), "unknown");
    }

    #[test]
    fn test_key_phrases_filtered_and_capped() {
        let insights = analyze_text("a total factura de importe cantidad fecha lugar evento");
        assert_eq!(
            insights.key_phrases,
            phrases(&["total", "factura", "importe", "cantidad", "fecha"])
        );
        assert_eq!(insights.sentiment, "neutral");
    }

    #[test]
    fn test_key_phrases_count_characters_not_bytes() {
        // "añoś" is 4 characters but more than 4 bytes.
        let insights = analyze_text("añoś extraído");
        assert_eq!(insights.key_phrases, phrases(&["extraído"]));
    }

    #[test]
    fn test_classify_finance() {
        assert_eq!(classify_by_keywords(&phrases(&["factura", "total"])).label, "Finance");
    }

    #[test]
    fn test_classify_legal() {
        assert_eq!(classify_by_keywords(&phrases(&["contrato"])).label, "Legal");
    }

    #[test]
    fn test_classify_events() {
        assert_eq!(classify_by_keywords(&phrases(&["evento", "lugar"])).label, "Events");
    }

    #[test]
    fn test_classify_general() {
        assert_eq!(classify_by_keywords(&phrases(&["random", "words"])).label, "General");
        assert_eq!(classify_by_keywords(&[]).label, "General");
    }

    #[test]
    fn test_rule_order_wins() {
        assert_eq!(
            classify_by_keywords(&phrases(&["evento", "contrato", "total"])).label,
            "Finance"
        );
    }

    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(classify_by_keywords(&phrases(&["FACTURA"])).label, "Finance");
    }
}
