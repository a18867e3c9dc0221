use regex::Regex;
use std::sync::OnceLock;

fn isbn_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").unwrap())
}

fn leading_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d{4})(?:$|[-/T\s])").unwrap())
}

/// Canonical form of an ISBN: separators stripped, check character upper-cased.
///
/// Returns `None` when the remaining characters are neither an ISBN-10 nor an
/// ISBN-13 shape. Checksums are not verified.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if isbn_shape().is_match(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

/// Year part of a catalog date such as `2004`, `2004-10` or `2004-10-12`.
pub fn published_year(date: &str) -> Option<i32> {
    leading_year()
        .captures(date)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}
