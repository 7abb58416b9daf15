//! High-level decoding API.
//!
//! ```no_run
//! use ejs_decoder::pipeline::{decode_batch, DecodeOptions};
//!
//! let summary = decode_batch(&["export_CSV.csv", "export_Excel.xlsx"], &DecodeOptions::default());
//! for r in summary.succeeded() {
//!     println!("{} -> {}", r.path.display(), r.report().unwrap().csv_path.display());
//! }
//! std::process::exit(if summary.any_succeeded() { 0 } else { 1 });
//! ```
//!
//! [`decode_text`] is the pure in-memory pipeline; [`decode_container`] adds
//! file I/O and never returns an error past its boundary.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::codec::{CodecError, CodecId, CodecOptions, DecodedPayload, Decompressor};
use crate::container::{frame, FrameError, FrameResult};
use crate::extract::{Cell, ExtractOptions, Extractor};
use crate::table::{output_path_for, ExportError, TableResult, DEFAULT_ROW_WIDTH};

const LOG_TARGET: &str = "ejs::pipeline";

// ── DecodeOptions ─────────────────────────────────────────────────────────────

/// Configuration for one decoding run.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub row_width:       usize,
    /// Where CSV files go; `None` writes beside each input.
    pub output_dir:      Option<PathBuf>,
    /// Decode and append the `related_sheet` payload when present.
    pub include_related: bool,
    pub extract:         ExtractOptions,
    pub codec:           CodecOptions,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            row_width:       DEFAULT_ROW_WIDTH,
            output_dir:      None,
            include_related: true,
            extract:         ExtractOptions::default(),
            codec:           CodecOptions::default(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("workbook payload: {0}")]
    Payload(#[from] CodecError),
    #[error("CSV export: {0}")]
    Export(#[from] ExportError),
}

// ── Decoded ───────────────────────────────────────────────────────────────────

/// Every stage's output for one container.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub frame:   FrameResult,
    pub primary: DecodedPayload,
    pub related: Option<DecodedPayload>,
    /// Primary cells first, then related-sheet cells.
    pub cells:   Vec<Cell>,
    pub table:   TableResult,
}

/// Run framing, decompression, extraction and table assembly in memory.
pub fn decode_text(raw: &str, opts: &DecodeOptions) -> Result<Decoded, DecodeError> {
    let framed       = frame(raw)?;
    let decompressor = Decompressor::new(opts.codec.clone());
    let extractor    = Extractor::new(opts.extract.clone());

    let primary = decompressor.decompress(&framed.envelope.workbook)?;
    let mut cells = extractor.extract(&primary.bytes);

    let related = match framed.related_sheet() {
        Some(b64) if opts.include_related => match decompressor.decompress(b64) {
            Ok(payload) => {
                let extra = extractor.extract(&payload.bytes);
                log::info!(target: LOG_TARGET, "related_sheet added {} cells", extra.len());
                cells.extend(extra);
                Some(payload)
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "related_sheet skipped: {e}");
                None
            }
        },
        _ => None,
    };

    let table = TableResult::from_cells(&cells, opts.row_width);
    Ok(Decoded { frame: framed, primary, related, cells, table })
}

// ── DecodeReport / ContainerResult ────────────────────────────────────────────

/// Summary of one successfully decoded container.
#[derive(Debug, Clone)]
pub struct DecodeReport {
    pub csv_path:   PathBuf,
    pub title:      Option<String>,
    pub max_row:    u64,
    pub max_col:    u64,
    pub cell_count: usize,
    pub row_count:  usize,
    /// Codec that inflated the primary payload; `None` on pass-through.
    pub codec:      Option<CodecId>,
}

#[derive(Debug)]
pub struct ContainerResult {
    pub path:    PathBuf,
    pub outcome: Result<DecodeReport, DecodeError>,
}

impl ContainerResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn report(&self) -> Option<&DecodeReport> {
        self.outcome.as_ref().ok()
    }

    /// Human-readable failure message.
    pub fn error_message(&self) -> Option<String> {
        self.outcome.as_ref().err().map(ToString::to_string)
    }
}

/// Read, decode and export one container file.
pub fn decode_container<P: AsRef<Path>>(path: P, opts: &DecodeOptions) -> ContainerResult {
    let path = path.as_ref().to_owned();
    log::info!(target: LOG_TARGET, "decoding {}", path.display());
    let outcome = decode_file(&path, opts);
    if let Err(e) = &outcome {
        log::error!(target: LOG_TARGET, "{}: {e}", path.display());
    }
    ContainerResult { path, outcome }
}

fn decode_file(path: &Path, opts: &DecodeOptions) -> Result<DecodeReport, DecodeError> {
    let bytes = std::fs::read(path)
        .map_err(|source| DecodeError::Read { path: path.to_owned(), source })?;
    let text  = String::from_utf8_lossy(&bytes);
    log::debug!(target: LOG_TARGET, "{} bytes read", bytes.len());

    let decoded  = decode_text(&text, opts)?;
    let target   = output_path_for(path, opts.output_dir.as_deref(), Utc::now());
    let csv_path = decoded.table.write_csv(&target)?;

    Ok(DecodeReport {
        csv_path,
        title:      decoded.frame.title().map(str::to_owned),
        max_row:    decoded.frame.max_row(),
        max_col:    decoded.frame.max_col(),
        cell_count: decoded.cells.len(),
        row_count:  decoded.table.row_count(),
        codec:      decoded.primary.codec,
    })
}

// ── Batch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BatchSummary {
    /// One result per input, in input order.
    pub results: Vec<ContainerResult>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &ContainerResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ContainerResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(ContainerResult::is_success)
    }
}

/// Decode every container independently.  One failure never stops the batch.
///
/// With the `parallel` feature, containers are decoded concurrently; each
/// container's own pipeline stays sequential.
pub fn decode_batch<P: AsRef<Path> + Sync>(paths: &[P], opts: &DecodeOptions) -> BatchSummary {
    #[cfg(feature = "parallel")]
    let results = {
        use rayon::prelude::*;
        paths.par_iter().map(|p| decode_container(p, opts)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results = paths.iter().map(|p| decode_container(p, opts)).collect();

    let summary = BatchSummary { results };
    log::info!(
        target: LOG_TARGET,
        "batch done: {} succeeded, {} failed",
        summary.success_count(), summary.failure_count(),
    );
    summary
}
