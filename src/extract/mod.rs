//! Heuristic cell recovery from a decompressed workbook buffer.
//!
//! The workbook layout is undocumented, so cells are recovered as text
//! fragments, not addressed cells.  Three passes run in a fixed order and
//! their results are concatenated without deduplication:
//!
//! | Pass | Kind | What it keeps |
//! |------|------|---------------|
//! | printable runs | `Text` | maximal runs of bytes `0x20..=0x7E`, with byte offset |
//! | UTF-8 split | `Utf8` | lossy UTF-8 text split on `\n`/`\r`/NUL, trimmed, 2–999 chars |
//! | multi-encoding | per encoding | `[A-Za-z0-9_一-鿿]+` runs longer than one char |
//!
//! Every pass drops strings matched by [`filter::is_system_string`].
//!
//! The multi-encoding pass decodes with UTF-8, UTF-16LE and GBK in that
//! order.  GBK is skipped unless [`ExtractOptions::enable_gbk`] is set.

use std::sync::OnceLock;
use std::time::Duration;

use encoding_rs::{Encoding, GBK, UTF_16LE, UTF_8};
use regex::Regex;
use serde::Serialize;

use crate::budget::Deadline;

pub mod filter;
pub mod protobuf;

pub use filter::is_system_string;

const LOG_TARGET: &str = "ejs::extract";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Which pass produced a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Text,
    Utf8,
    Utf16Le,
    Gbk,
}

impl CellKind {
    pub fn name(self) -> &'static str {
        match self {
            CellKind::Text    => "text",
            CellKind::Utf8    => "utf8",
            CellKind::Utf16Le => "utf16le",
            CellKind::Gbk     => "gbk",
        }
    }
}

/// A recovered text fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub content:  String,
    /// Byte offset of the run; only the printable-run pass records one.
    pub position: Option<usize>,
    pub kind:     CellKind,
}

impl Cell {
    pub fn new(content: impl Into<String>, kind: CellKind) -> Self {
        Self { content: content.into(), position: None, kind }
    }
}

/// Candidate encodings for the multi-encoding pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Gbk,
}

/// Fixed decode order of the multi-encoding pass.
pub const CANDIDATE_ENCODINGS: [TextEncoding; 3] =
    [TextEncoding::Utf8, TextEncoding::Utf16Le, TextEncoding::Gbk];

impl TextEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8    => UTF_8,
            TextEncoding::Utf16Le => UTF_16LE,
            TextEncoding::Gbk     => GBK,
        }
    }

    fn cell_kind(self) -> CellKind {
        match self {
            TextEncoding::Utf8    => CellKind::Utf8,
            TextEncoding::Utf16Le => CellKind::Utf16Le,
            TextEncoding::Gbk     => CellKind::Gbk,
        }
    }
}

// ── ExtractOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Decode GBK in the multi-encoding pass instead of skipping it.
    pub enable_gbk:   bool,
    /// Wall-clock budget for all passes over one buffer; checked between passes.
    pub time_budget:  Option<Duration>,
    /// Shortest UTF-8 split piece kept, in chars.
    pub min_line_len: usize,
    /// Longest UTF-8 split piece kept, in chars.
    pub max_line_len: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            enable_gbk:   false,
            time_budget:  None,
            min_line_len: 2,
            max_line_len: 999,
        }
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────────

fn word_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_\x{4e00}-\x{9fff}]+").expect("valid regex"))
}

fn line_break_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\n\r\x00]+").expect("valid regex"))
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Run every pass over `buf` and concatenate their cells.
    pub fn extract(&self, buf: &[u8]) -> Vec<Cell> {
        let deadline = Deadline::after(self.options.time_budget);
        let mut cells = self.printable_runs(buf);

        if !self.within_budget(&deadline, "utf8 split") {
            return cells;
        }
        cells.extend(self.utf8_lines(buf));

        for encoding in CANDIDATE_ENCODINGS {
            if !self.within_budget(&deadline, encoding.cell_kind().name()) {
                break;
            }
            match self.encoded_words(buf, encoding) {
                Some(found) => cells.extend(found),
                None => log::debug!(target: LOG_TARGET, "{} skipped", encoding.cell_kind().name()),
            }
        }

        log::info!(target: LOG_TARGET, "{} bytes -> {} candidate cells", buf.len(), cells.len());
        cells
    }

    fn within_budget(&self, deadline: &Deadline, next: &str) -> bool {
        if deadline.expired() {
            log::warn!(
                target: LOG_TARGET,
                "time budget exhausted; skipping {next} and later passes",
            );
            return false;
        }
        true
    }

    /// Maximal printable-ASCII runs with their start offset.  A run is
    /// flushed on any other byte and at end of buffer.
    pub fn printable_runs(&self, buf: &[u8]) -> Vec<Cell> {
        let mut cells = Vec::new();
        let mut start: Option<usize> = None;

        let flush = |from: usize, to: usize, cells: &mut Vec<Cell>| {
            // Every byte in the run is ASCII, so this never fails.
            if let Ok(s) = std::str::from_utf8(&buf[from..to]) {
                if !is_system_string(s) {
                    cells.push(Cell {
                        content:  s.to_owned(),
                        position: Some(from),
                        kind:     CellKind::Text,
                    });
                }
            }
        };

        for (i, &b) in buf.iter().enumerate() {
            if (0x20..=0x7e).contains(&b) {
                start.get_or_insert(i);
            } else if let Some(s) = start.take() {
                flush(s, i, &mut cells);
            }
        }
        if let Some(s) = start {
            flush(s, buf.len(), &mut cells);
        }
        cells
    }

    /// Lossy UTF-8 decode split on line breaks and NUL runs.
    pub fn utf8_lines(&self, buf: &[u8]) -> Vec<Cell> {
        let text = String::from_utf8_lossy(buf);
        line_break_run()
            .split(&text)
            .map(str::trim)
            .filter(|piece| {
                let n = piece.chars().count();
                n >= self.options.min_line_len && n <= self.options.max_line_len
            })
            .filter(|piece| !is_system_string(piece))
            .map(|piece| Cell::new(piece, CellKind::Utf8))
            .collect()
    }

    /// Word/CJK runs of `buf` decoded as `encoding`.  `None` when the
    /// encoding is disabled.
    pub fn encoded_words(&self, buf: &[u8], encoding: TextEncoding) -> Option<Vec<Cell>> {
        if encoding == TextEncoding::Gbk && !self.options.enable_gbk {
            return None;
        }
        let (text, had_errors) = encoding.encoding().decode_without_bom_handling(buf);
        if had_errors {
            log::trace!(
                target: LOG_TARGET,
                "{} decode replaced malformed sequences",
                encoding.cell_kind().name(),
            );
        }
        let kind = encoding.cell_kind();
        Some(
            word_run()
                .find_iter(&text)
                .map(|m| m.as_str())
                .filter(|w| w.chars().count() > 1 && !is_system_string(w))
                .map(|w| Cell::new(w, kind))
                .collect(),
        )
    }
}

/// Extract with default options.
pub fn extract(buf: &[u8]) -> Vec<Cell> {
    Extractor::default().extract(buf)
}
