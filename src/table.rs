//! Table assembly and CSV export.
//!
//! Rows are formed by chunking the flat cell sequence into groups of
//! [`DEFAULT_ROW_WIDTH`].  The container's real row/column layout is not
//! recovered; the grid is an approximation for export only.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::extract::Cell;

pub const DEFAULT_ROW_WIDTH: usize = 20;

/// Numbered siblings tried before giving up on a free output name.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

const LOG_TARGET: &str = "ejs::table";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no cell data to export")]
    NoData,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── TableResult ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableResult {
    pub rows: Vec<Vec<String>>,
}

/// Chunk `cells` into rows of [`DEFAULT_ROW_WIDTH`].
pub fn to_table(cells: &[Cell]) -> TableResult {
    TableResult::from_cells(cells, DEFAULT_ROW_WIDTH)
}

impl TableResult {
    /// Chunk `cells` into rows of `width` (a width of 0 is treated as 1).
    /// The last row may be shorter.
    pub fn from_cells(cells: &[Cell], width: usize) -> Self {
        let rows = cells
            .chunks(width.max(1))
            .map(|chunk| chunk.iter().map(|c| c.content.clone()).collect())
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Write every field quoted, quotes doubled, `\n` row terminators.
    pub fn write_csv_to<W: Write>(&self, out: W) -> Result<(), ExportError> {
        if self.is_empty() {
            return Err(ExportError::NoData);
        }
        let mut w = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(out);
        for row in &self.rows {
            w.write_record(row)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, ExportError> {
        let mut buf = Vec::new();
        self.write_csv_to(&mut buf)?;
        // Every field came from a `String`, so the output is valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the table as UTF-8 CSV without a byte-order mark and return the
    /// path actually written.
    ///
    /// An existing file is never overwritten: when `path` is taken the first
    /// free `<stem>-N.<ext>` sibling is used.  A failed write removes the
    /// partial file.  An empty table writes nothing and returns
    /// [`ExportError::NoData`].
    pub fn write_csv(&self, path: &Path) -> Result<PathBuf, ExportError> {
        if self.is_empty() {
            log::warn!(target: LOG_TARGET, "no cells; not writing {}", path.display());
            return Err(ExportError::NoData);
        }
        let mut body = Vec::new();
        self.write_csv_to(&mut body)?;

        let written = persist(path, |file| file.write_all(&body))?;
        log::info!(
            target: LOG_TARGET,
            "wrote {} ({} rows, {} cells)",
            written.display(), self.row_count(), self.cell_count(),
        );
        Ok(written)
    }
}

/// Create a fresh file at `path` (or a numbered sibling) and fill it with
/// `write`.  On a write error the file is removed again.
fn persist<F>(path: &Path, write: F) -> io::Result<PathBuf>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let (mut file, target) = create_unique(path)?;
    let result = write(&mut file).and_then(|()| file.sync_all());
    drop(file);

    if let Err(e) = result {
        if let Err(rm) = std::fs::remove_file(&target) {
            log::warn!(target: LOG_TARGET, "could not remove partial {}: {rm}", target.display());
        }
        return Err(e);
    }
    Ok(target)
}

fn create_unique(path: &Path) -> io::Result<(File, PathBuf)> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = if n == 0 { path.to_owned() } else { numbered_path(path, n) };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => {
                if n > 0 {
                    log::info!(
                        target: LOG_TARGET,
                        "{} exists; using {}",
                        path.display(), candidate.display(),
                    );
                }
                return Ok((file, candidate));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free output name next to {}", path.display()),
    ))
}

/// `dir/name.csv` -> `dir/name-N.csv`.
pub fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None      => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}

// ── Output naming ─────────────────────────────────────────────────────────────

/// ISO-8601 UTC timestamp with `:` and `.` replaced by `-`,
/// e.g. `2025-08-27T23-17-18-123Z`.
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// `<dir>/<stem>_decoded_<timestamp>.csv`, where `dir` is `output_dir` or
/// the input's own directory.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>, at: DateTime<Utc>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_owned());
    let name = format!("{stem}_decoded_{}.csv", file_timestamp(at));
    match output_dir {
        Some(dir) => dir.join(name),
        None      => input.with_file_name(name),
    }
}
