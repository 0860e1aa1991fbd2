//! Pure derivation of content statistics and feature flags.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use time::OffsetDateTime;

static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(```|^\s*(def|class|fn|function|import|from|#include|public|private)\s+\w|^\s*(let|const|var)\s+\w+\s*=|[;{]\s*$)",
    )
    .expect("code pattern compiles")
});

static TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^\s*\|.*\|\s*$|^\s*\|?\s*-{3,}\s*\||\t\S+\t|표 헤더:|^행 \d+:)")
        .expect("table pattern compiles")
});

static LIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*([-*•·▪◦‣●○■□]|\d{1,3}[.)]|[a-zA-Z가-힣][.)])\s+\S")
        .expect("list pattern compiles")
});

static FORMULA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([∑∫√≈≠≤≥±×÷∞∂]|\$[^$\n]+\$|\b\w+\s*=\s*[\w(][^=\n]*[+\-*/^][^=\n]*|\d+\s*[+\-*/^]\s*\d+\s*=)")
        .expect("formula pattern compiles")
});

/// Word/character counts and feature flags derived from chunk text.
///
/// Computed by [`ContentProfile::derive`] and stored alongside every chunk so downstream
/// filtering never has to rescan content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProfile {
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Unicode scalar count.
    pub char_count: usize,
    /// Content looks like source code.
    pub has_code: bool,
    /// Content contains a tabular layout.
    pub has_table: bool,
    /// Content contains bullet or numbered list lines.
    pub has_list: bool,
    /// Content contains a mathematical expression.
    pub has_formula: bool,
    /// `ko` when Hangul is present, otherwise `en`.
    pub language: String,
}

impl ContentProfile {
    /// Scan `content` and derive its statistics.
    pub fn derive(content: &str) -> Self {
        Self {
            word_count: word_count(content),
            char_count: char_count(content),
            has_code: CODE_PATTERN.is_match(content),
            has_table: TABLE_PATTERN.is_match(content),
            has_list: LIST_PATTERN.is_match(content),
            has_formula: FORMULA_PATTERN.is_match(content),
            language: detect_language(content).to_string(),
        }
    }
}

/// Whitespace-separated word count.
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Length in Unicode scalar values.
pub fn char_count(content: &str) -> usize {
    content.chars().count()
}

fn detect_language(content: &str) -> &'static str {
    if content.chars().any(is_hangul) {
        "ko"
    } else {
        "en"
    }
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

/// Current timestamp formatted as RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_unicode_chars() {
        let profile = ContentProfile::derive("매출 보고서 2024");
        assert_eq!(profile.word_count, 3);
        assert_eq!(profile.char_count, 11);
        assert_eq!(profile.language, "ko");
    }

    #[test]
    fn detects_tables_lists_and_code() {
        let table = ContentProfile::derive("| a | b |\n| --- | --- |\n| 1 | 2 |");
        assert!(table.has_table);

        let list = ContentProfile::derive("Agenda\n- first item\n- second item");
        assert!(list.has_list);
        assert!(!list.has_table);

        let code = ContentProfile::derive("fn main() {\n    println!(\"hi\");\n}");
        assert!(code.has_code);
        assert_eq!(code.language, "en");
    }

    #[test]
    fn detects_formulas() {
        assert!(ContentProfile::derive("The area is A = pi * r^2 for a circle").has_formula);
        assert!(ContentProfile::derive("합계 ∑ x").has_formula);
        assert!(!ContentProfile::derive("Plain prose without math").has_formula);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
