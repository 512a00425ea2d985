//! Keyword-anchored numeric extraction from measurement file text
//!
//! The keyword is split into word tokens which must appear in order,
//! separated by any run of non-word characters and bounded by word
//! boundaries, case-insensitively. The last occurrence wins. The first
//! decimal literal in the three lines starting at the end of that occurrence
//! is the value.

use crate::error::CoreError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Lines searched for a number, counting the remainder of the keyword line
pub const VALUE_WINDOW_LINES: usize = 3;

/// Decimal literal with `.` or `,` separator, optional sign, optional spaces
/// around the separator. Bare integers are not values.
static DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[+-]?[ \t]*(?:\d+[ \t]*[.,][ \t]*\d+|[.,][ \t]*\d+)").expect("valid decimal regex")
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// `\r\n`, `\n` or a bare `\r` (older controllers)
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n|\n|\r").expect("valid line break regex"));

/// Word tokens of a keyword, in order
pub fn tokenize_keyword(keyword: &str) -> Vec<&str> {
    WORD.find_iter(keyword).map(|m| m.as_str()).collect()
}

/// Compiled keyword pattern, reusable across every file of a batch
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pattern: Regex,
}

impl KeywordMatcher {
    /// Fails with [`CoreError::EmptyKeyword`] when the keyword has no word tokens
    pub fn new(keyword: &str) -> Result<Self, CoreError> {
        let tokens = tokenize_keyword(keyword);
        if tokens.is_empty() {
            return Err(CoreError::EmptyKeyword {
                keyword: keyword.to_string(),
            });
        }

        let body = tokens
            .iter()
            .map(|token| regex::escape(token))
            .collect::<Vec<_>>()
            .join(r"[^\w]+");

        let pattern = RegexBuilder::new(&format!(r"\b{}\b", body))
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::InvalidConfig {
                message: format!("keyword pattern for {:?}: {}", keyword, e),
            })?;

        Ok(Self { pattern })
    }

    /// Value following the last keyword occurrence, if any
    pub fn extract(&self, text: &str) -> Option<f64> {
        let anchor = self.pattern.find_iter(text).last()?;
        let window = LINE_BREAK
            .split(&text[anchor.end()..])
            .take(VALUE_WINDOW_LINES)
            .collect::<Vec<_>>()
            .join("\n");

        let literal = DECIMAL.find(&window)?;
        let normalized: String = literal
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == ',' { '.' } else { c })
            .collect();

        normalized.parse::<f64>().ok()
    }
}

/// One-shot extraction; compile a [`KeywordMatcher`] when scanning many files
pub fn extract_value(text: &str, keyword: &str) -> Result<Option<f64>, CoreError> {
    Ok(KeywordMatcher::new(keyword)?.extract(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str, keyword: &str) -> Option<f64> {
        extract_value(text, keyword).unwrap()
    }

    #[test]
    fn test_comma_decimal_separator() {
        assert_eq!(value("Keyword: 2,345 mm", "Keyword"), Some(2.345));
    }

    #[test]
    fn test_missing_keyword_is_none() {
        assert_eq!(value("Durchmesser 2: 1.5 mm", "Tiefe"), None);
        assert_eq!(value("", "Tiefe"), None);
    }

    #[test]
    fn test_last_occurrence_wins() {
        let text = "Durchmesser 1: 10.5 mm\nTiefe: 3.0\nDurchmesser 1: 11.25 mm\n";
        assert_eq!(value(text, "Durchmesser 1"), Some(11.25));
    }

    #[test]
    fn test_tokens_tolerate_punctuation_and_case() {
        let text = "DURCHMESSER_1 ignored\ndurchmesser - 1 = -0,75";
        assert_eq!(value(text, "Durchmesser 1"), Some(-0.75));
    }

    #[test]
    fn test_word_boundaries_respected() {
        // "Durchmesser 10" must not match keyword "Durchmesser 1"
        assert_eq!(value("Durchmesser 10: 4.5", "Durchmesser 1"), None);
    }

    #[test]
    fn test_window_counts_bare_carriage_returns() {
        assert_eq!(value("Wert\r\r1.5\r", "Wert"), Some(1.5));
        assert_eq!(value("Wert\r\r\r\r1.5\r", "Wert"), None);
        assert_eq!(value("Wert\r\n\r\n\r\n\r\n1.5", "Wert"), None);
        assert_eq!(value("Wert:\r\n 2,5\r\n", "Wert"), Some(2.5));
    }

    #[test]
    fn test_window_is_three_lines() {
        let within = "Wert\n\n\n1.5";
        let beyond = "Wert\n\n\n\n1.5";
        // Remainder of the keyword line counts as the first window line
        assert_eq!(value("Wert\n\n1.5", "Wert"), Some(1.5));
        assert_eq!(value(within, "Wert"), None);
        assert_eq!(value(beyond, "Wert"), None);
        assert_eq!(value("Wert: x\ny\n2.5", "Wert"), Some(2.5));
    }

    #[test]
    fn test_spaces_around_separator_and_sign() {
        assert_eq!(value("Offset: - 1 , 5", "Offset"), Some(-1.5));
        assert_eq!(value("Offset: +.5", "Offset"), Some(0.5));
    }

    #[test]
    fn test_integer_without_separator_is_none() {
        assert_eq!(value("Stueckzahl: 42", "Stueckzahl"), None);
    }

    #[test]
    fn test_empty_keyword_is_error() {
        assert!(matches!(
            extract_value("anything", "  -- "),
            Err(CoreError::EmptyKeyword { .. })
        ));
        assert!(KeywordMatcher::new("").is_err());
    }

    #[test]
    fn test_tokenize_keyword() {
        assert_eq!(tokenize_keyword("Durchmesser 1:"), vec!["Durchmesser", "1"]);
        assert!(tokenize_keyword(" ; ").is_empty());
    }
}
