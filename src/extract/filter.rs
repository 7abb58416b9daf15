//! Formatting/schema noise filter.
//!
//! Candidate strings containing any of these keywords (case-insensitive) are
//! presumed to be style or schema data rather than cell content.  Real cell
//! text that happens to contain one of them is dropped too; that is accepted.

pub const SYSTEM_KEYWORDS: [&str; 13] = [
    "calibri", "arial", "times", "font",
    "000000", "ffffff", "color",
    "style", "format", "sheet",
    "xmlns", "http", "version",
];

pub fn is_system_string(s: &str) -> bool {
    let lower = s.to_lowercase();
    SYSTEM_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_case_insensitively() {
        assert!(is_system_string("Calibri"));
        assert!(is_system_string("xmlns:x14ac"));
        assert!(is_system_string("FFFFFF"));
        assert!(is_system_string("https://example.com"));
        assert!(is_system_string("DataSheet1"));
    }

    #[test]
    fn plain_content_passes() {
        assert!(!is_system_string("HELLO WORLD"));
        assert!(!is_system_string("项目负责人"));
        assert!(!is_system_string("2025-08-27"));
    }
}
