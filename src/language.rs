use std::sync::LazyLock;

use regex::Regex;

/// Submission API language slugs mapped to display names.
const LANGUAGE_LABELS: &[(&str, &str)] = &[
    ("cpp", "C++"),
    ("java", "Java"),
    ("python", "Python"),
    ("python3", "Python3"),
    ("c", "C"),
    ("csharp", "C#"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("php", "PHP"),
    ("swift", "Swift"),
    ("kotlin", "Kotlin"),
    ("dart", "Dart"),
    ("golang", "Go"),
    ("ruby", "Ruby"),
    ("scala", "Scala"),
    ("rust", "Rust"),
    ("racket", "Racket"),
    ("erlang", "Erlang"),
    ("elixir", "Elixir"),
    ("mysql", "MySQL"),
];

pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Map an API language slug to its display name. Unknown slugs pass
/// through unchanged.
pub fn normalize_language_code(code: &str) -> String {
    LANGUAGE_LABELS
        .iter()
        .find(|(slug, _)| *slug == code)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Ordered language signatures, first match wins. The include-directive
/// check sits first: C-family source often also matches the looser
/// signatures further down.
static SHAPE_SIGNATURES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"#include\s*[<\x22]", "C++"),
        (r"\bpublic\s+(?:static\s+)?class\b|\bSystem\.out\b", "Java"),
        (r"\busing\s+System\b|\bnamespace\s+\w+\s*\{", "C#"),
        (r"<\?php", "PHP"),
        (r"\bfn\s+\w+\s*\(|\blet\s+mut\b", "Rust"),
        (r"\bfunc\s+\w+\s*\(|\bpackage\s+main\b", "Go"),
        (r"(?m)\bdef\s+\w+\s*\(|^\s*class\s+\w+.*:\s*$", "Python"),
        (r"\bfunction\s+\w+\s*\(|\bconsole\.log\b|=>", "JavaScript"),
        (r"(?is)\bselect\b.+\bfrom\b", "MySQL"),
    ]
    .into_iter()
    .map(|(p, label)| (Regex::new(p).unwrap(), label))
    .collect()
});

/// Guess a display language from the shape of the code. Used only when no
/// label was discoverable by other means.
pub fn detect_language_from_shape(code: &str) -> &'static str {
    SHAPE_SIGNATURES
        .iter()
        .find(|(re, _)| re.is_match(code))
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN_LANGUAGE)
}
