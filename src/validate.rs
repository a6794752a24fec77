use std::sync::LazyLock;

use regex::Regex;

/// Shape signatures that code in any mainstream language family tends to
/// carry. One hit is enough; the alphabetic-ratio check below rejects
/// binary garbage and ASCII art that happens to contain punctuation.
const CODE_SHAPE_PATTERNS: &[&str] = &[
    r"\{[^{}]*\S[^{}]*\}",                                       // braces with content
    r"\[[^\[\]]*\]",                                             // index / collection brackets
    r"\b(if|else|for|while|switch|match|return)\b",              // control flow
    r"\b(function|def|class|struct|fn|var|let|const|public|private)\b", // declarations
    r"=>|->",                                                    // arrow markers
    r"#include\b|\bimport\b|\busing\b|\brequire\b|\bfrom\b",     // import / include
];

static CODE_SHAPE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CODE_SHAPE_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

const MIN_CODE_LEN: usize = 10;
const MIN_CODE_ALPHA_RATIO: f64 = 0.2;
const MAX_LABEL_LEN: usize = 30;
const MIN_LABEL_ALPHA_RATIO: f64 = 0.5;

/// Does this text plausibly hold source code? Requires at least one shape
/// signature AND an alphabetic ratio >= 0.2 over the trimmed text.
pub fn is_plausible_code(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_CODE_LEN {
        return false;
    }
    let shaped = CODE_SHAPE_RES.iter().any(|re| re.is_match(trimmed));
    shaped && alpha_ratio(trimmed) >= MIN_CODE_ALPHA_RATIO
}

/// Does this text plausibly hold a language label? Labels are short words,
/// not sentences: single line, <= 30 chars, mostly alphabetic.
pub fn is_plausible_language_label(text: &str) -> bool {
    if text.is_empty() || text.chars().count() > MAX_LABEL_LEN {
        return false;
    }
    if text.contains(['\n', '\r', '\t']) {
        return false;
    }
    alpha_ratio(text) > MIN_LABEL_ALPHA_RATIO
}

fn alpha_ratio(s: &str) -> f64 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alpha = s.chars().filter(|c| c.is_alphabetic()).count();
    alpha as f64 / total as f64
}
