//! Positional section scan.
//!
//! A container interleaves bare tag lines (`head`, `json`, `text`) with
//! `<decimal length>` / `<data>` line pairs.  The tag most recently seen
//! gives the kind of every pair that follows it.  The declared length is
//! advisory; it is recorded, never used to bound a read.
//!
//! Percent-encoded data (`%7B…`) outside a `json` section is reported as
//! [`SectionKind::Unknown`]: the envelope line rides under whatever tag
//! happened to precede it.

use super::envelope::ENVELOPE_PREFIX;
use super::RawContainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Head,
    Json,
    Text,
    Unknown,
}

impl SectionKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "head" => Some(SectionKind::Head),
            "json" => Some(SectionKind::Json),
            "text" => Some(SectionKind::Text),
            _      => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Head    => "head",
            SectionKind::Json    => "json",
            SectionKind::Text    => "text",
            SectionKind::Unknown => "unknown",
        }
    }
}

/// One length line plus the data line that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind:         SectionKind,
    pub declared_len: Option<usize>,
    /// Index of the length line.
    pub line_index:   usize,
    pub payload:      String,
}

impl Section {
    /// Data line is percent-encoded JSON (`%7B…`).
    pub fn is_percent_encoded(&self) -> bool {
        self.payload.trim_start().starts_with("%7B")
    }

    /// Data line is a percent-encoded workbook envelope.
    pub fn is_envelope(&self) -> bool {
        self.payload.trim_start().starts_with(ENVELOPE_PREFIX)
    }

    /// Payload length in UTF-16 code units, the unit the declared length counts.
    pub fn actual_len(&self) -> usize {
        self.payload.encode_utf16().count()
    }
}

fn is_length_line(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Scan every length/data pair in `container`, in line order.
pub fn scan_sections(container: &RawContainer) -> Vec<Section> {
    let lines = container.lines();
    let mut sections = Vec::new();
    let mut current  = SectionKind::Unknown;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        if let Some(kind) = SectionKind::from_tag(line) {
            current = kind;
        } else if is_length_line(line) && i + 1 < lines.len() {
            let payload = lines[i + 1].trim_end_matches('\r').to_owned();
            let kind = if current != SectionKind::Json && payload.trim_start().starts_with("%7B") {
                SectionKind::Unknown
            } else {
                current
            };
            sections.push(Section {
                kind,
                declared_len: line.parse().ok(),
                line_index: i,
                payload,
            });
            i += 2;
            continue;
        }
        i += 1;
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_take_the_kind_of_the_preceding_tag() {
        let c = RawContainer::new("head\n3\nabc\njson\n2\n{}\ntext\n5\nhello\n");
        let s = scan_sections(&c);
        assert_eq!(s.len(), 3);
        assert_eq!(
            (s[0].kind, s[0].declared_len, s[0].payload.as_str()),
            (SectionKind::Head, Some(3), "abc"),
        );
        assert_eq!((s[1].kind, s[1].line_index), (SectionKind::Json, 4));
        assert_eq!(s[2].kind, SectionKind::Text);
        assert_eq!(s[2].actual_len(), 5);
    }

    #[test]
    fn untagged_pairs_are_unknown() {
        let c = RawContainer::new("7\n%7B%22workbook%22\n");
        let s = scan_sections(&c);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].kind, SectionKind::Unknown);
        assert!(s[0].is_percent_encoded());
        assert!(s[0].is_envelope());
    }

    #[test]
    fn percent_encoded_data_outside_json_is_unknown() {
        let c = RawContainer::new("text\n20\n%7B%22workbook%22%3A%22AA%22%7D\ntext\n4\nnote\n");
        let s = scan_sections(&c);
        let kinds: Vec<_> = s.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, [SectionKind::Unknown, SectionKind::Text]);
        assert!(s[0].is_envelope());

        let c = RawContainer::new("json\n6\n%7B%7D\n");
        assert_eq!(scan_sections(&c)[0].kind, SectionKind::Json);
    }

    #[test]
    fn digit_data_line_is_not_rescanned_as_a_length() {
        let c = RawContainer::new("text\n2\n42\n");
        let s = scan_sections(&c);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].payload, "42");
    }

    #[test]
    fn trailing_length_without_data_is_ignored() {
        let c = RawContainer::new("json\n10");
        assert!(scan_sections(&c).is_empty());
    }
}
