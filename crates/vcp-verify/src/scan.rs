//! Injection scan over constitution content
//!
//! Lexical screening against a fixed pattern set and a fixed
//! forbidden-character set. Findings never block verification on their
//! own; the orchestrator decides based on its strictness configuration.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed injection pattern set, compiled case-insensitive + multiline.
static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"ignore\s+(all\s+)?(previous|above|prior)\s+instructions",
        r"you\s+are\s+now\s+",
        r"disregard\s+(the\s+)?(above|previous)",
        r"your\s+new\s+(instructions|role|purpose)",
        r"^(user|assistant|system|human|ai):\s*",
        r"<\|?(system|user|assistant)\|?>",
        r"```system",
    ]
    .iter()
    .filter_map(|p| Regex::new(&format!("(?im){p}")).ok())
    .collect()
});

/// Forbidden characters: the canonicalizer's set plus NUL.
const FORBIDDEN_CHARS: [char; 14] = [
    '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}', '\u{202E}',
    '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}',
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{0000}',
];

/// Scan content for injection patterns and forbidden characters.
///
/// Returns one finding description per matched pattern or character.
pub fn scan_for_injection(content: &str) -> Vec<String> {
    let mut findings = Vec::new();

    for pattern in INJECTION_PATTERNS.iter() {
        if pattern.is_match(content) {
            findings.push(format!("injection pattern: {}", pattern.as_str()));
        }
    }

    for ch in FORBIDDEN_CHARS {
        if content.contains(ch) {
            findings.push(format!("forbidden character: U+{:04X}", ch as u32));
        }
    }

    findings
}
