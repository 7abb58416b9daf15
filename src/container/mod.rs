//! Container framing.
//!
//! A container is plain text, `\n`-separated.  Two independent scans run over
//! the same line list in one pass:
//!
//! - **metadata**: a line equal to `json` is followed by an advisory length
//!   line and a JSON document.  The first document that parses is kept; a
//!   document that fails to parse is logged and dropped.
//! - **envelope**: the first line starting with `%7B%22workbook%22` or
//!   containing `workbook` is the sole envelope candidate.  It is
//!   percent-decoded and parsed once; there is no second candidate.
//!
//! Later matches of either kind are ignored.

use serde_json::Value;
use thiserror::Error;

pub mod builder;
pub mod envelope;
pub mod sections;

pub use builder::ContainerBuilder;
pub use envelope::{Envelope, EnvelopeError, ENVELOPE_PREFIX};
pub use sections::{scan_sections, Section, SectionKind};

const LOG_TARGET: &str = "ejs::frame";

// ── RawContainer ──────────────────────────────────────────────────────────────

/// Unparsed container text, split into lines once.
#[derive(Debug, Clone)]
pub struct RawContainer {
    lines: Vec<String>,
}

impl RawContainer {
    pub fn new(text: &str) -> Self {
        Self { lines: text.split('\n').map(str::to_owned).collect() }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("no line containing a workbook envelope was found")]
    NoWorkbookFound,
    #[error("envelope candidate on line {line} could not be decoded: {source}")]
    EnvelopeDecode {
        line:   usize,
        #[source]
        source: EnvelopeError,
    },
}

// ── FrameResult ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FrameResult {
    /// First `json` section document that parsed.
    pub metadata:      Option<Value>,
    /// Line index of that document.
    pub metadata_line: Option<usize>,
    pub envelope:      Envelope,
    /// Line index of the envelope candidate.
    pub envelope_line: usize,
}

impl FrameResult {
    pub fn max_row(&self) -> u64 { self.envelope.max_row }
    pub fn max_col(&self) -> u64 { self.envelope.max_col }
    pub fn end_row_index(&self) -> u64 { self.envelope.end_row_index }
    pub fn end_col_index(&self) -> u64 { self.envelope.end_col_index }

    pub fn related_sheet(&self) -> Option<&str> {
        self.envelope.related_sheet.as_deref()
    }

    /// Document title from `bodyData.initialTitle`, when the metadata has one.
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get("bodyData")?
            .get("initialTitle")?
            .as_str()
    }
}

// ── frame ─────────────────────────────────────────────────────────────────────

/// Frame raw container text.
pub fn frame(raw: &str) -> Result<FrameResult, FrameError> {
    frame_container(&RawContainer::new(raw))
}

/// Frame an already-split container.
pub fn frame_container(container: &RawContainer) -> Result<FrameResult, FrameError> {
    if container.is_empty() {
        log::warn!(target: LOG_TARGET, "container has no content");
        return Err(FrameError::NoWorkbookFound);
    }
    let lines = container.lines();
    log::debug!(target: LOG_TARGET, "framing {} lines", lines.len());

    let mut metadata: Option<(usize, Value)> = None;
    let mut candidate: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();

        if metadata.is_none() && line == "json" && i + 2 < lines.len() {
            let declared = lines[i + 1].trim();
            match serde_json::from_str::<Value>(&lines[i + 2]) {
                Ok(doc) => {
                    log::info!(
                        target: LOG_TARGET,
                        "json metadata at line {} (declared length {declared})",
                        i + 2,
                    );
                    metadata = Some((i + 2, doc));
                }
                Err(e) => {
                    log::warn!(
                        target: LOG_TARGET,
                        "json metadata at line {} did not parse: {e}",
                        i + 2,
                    );
                }
            }
        }

        if candidate.is_none() && envelope::is_candidate(line) {
            candidate = Some(i);
        }

        if metadata.is_some() && candidate.is_some() {
            break;
        }
    }

    let line_index = candidate.ok_or(FrameError::NoWorkbookFound)?;
    let envelope = Envelope::decode_line(&lines[line_index]).map_err(|source| {
        log::warn!(
            target: LOG_TARGET,
            "envelope candidate at line {line_index} rejected: {source}",
        );
        FrameError::EnvelopeDecode { line: line_index, source }
    })?;
    log::info!(
        target: LOG_TARGET,
        "envelope at line {line_index}: {} x {}, workbook {} chars, related_sheet {}",
        envelope.max_row,
        envelope.max_col,
        envelope.workbook.len(),
        envelope.related_sheet.as_ref().map_or(0, String::len),
    );

    let (metadata_line, metadata) = match metadata {
        Some((l, v)) => (Some(l), Some(v)),
        None         => (None, None),
    };

    Ok(FrameResult { metadata, metadata_line, envelope, envelope_line: line_index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ENVELOPE: &str = "%7B%22workbook%22%3A%22AAEC%22%2C%22max_row%22%3A3%2C%22max_col%22%3A4%7D";

    #[test]
    fn recovers_json_metadata_structurally() {
        let doc = json!({"bodyData": {"initialTitle": "年项目计划"}, "n": [1, 2, {"k": null}]});
        let text = format!("head\n1\nx\njson\n99\n{doc}\n{ENVELOPE}\n");
        let f = frame(&text).unwrap();
        assert_eq!(f.metadata, Some(doc));
        assert_eq!(f.metadata_line, Some(5));
        assert_eq!(f.title(), Some("年项目计划"));
    }

    #[test]
    fn envelope_workbook_is_returned_verbatim() {
        let f = frame(&format!("json\n2\n{{}}\n{ENVELOPE}")).unwrap();
        assert_eq!(f.envelope.workbook, "AAEC");
        assert_eq!((f.max_row(), f.max_col()), (3, 4));
        assert_eq!(f.envelope_line, 3);
        assert_eq!(f.related_sheet(), None);
    }

    #[test]
    fn bad_metadata_is_not_fatal() {
        let f = frame(&format!("json\n5\n{{oops\n{ENVELOPE}\r\n")).unwrap();
        assert!(f.metadata.is_none());
        assert_eq!(f.envelope.workbook, "AAEC");
    }

    #[test]
    fn first_metadata_wins() {
        let f = frame(&format!("json\n2\n{{\"a\":1}}\njson\n2\n{{\"a\":2}}\n{ENVELOPE}")).unwrap();
        assert_eq!(f.metadata, Some(json!({"a": 1})));
    }

    #[test]
    fn first_envelope_candidate_wins() {
        let second = ENVELOPE.replace("AAEC", "BBBB");
        let f = frame(&format!("{ENVELOPE}\n{second}")).unwrap();
        assert_eq!(f.envelope.workbook, "AAEC");
    }

    #[test]
    fn no_workbook_line() {
        assert!(matches!(frame("head\njson\n2\n{}\n"), Err(FrameError::NoWorkbookFound)));
        assert!(matches!(frame(""), Err(FrameError::NoWorkbookFound)));
        assert!(matches!(frame(" \n\r\n\t"), Err(FrameError::NoWorkbookFound)));
        assert!(RawContainer::new("\n \n").is_empty());
        assert!(!RawContainer::new("head").is_empty());
    }

    #[test]
    fn single_shot_candidate() {
        // The first candidate is not JSON; the valid one after it is never tried.
        let text = format!("the workbook follows\n{ENVELOPE}");
        match frame(&text) {
            Err(FrameError::EnvelopeDecode { line: 0, source: EnvelopeError::Json(_) }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
