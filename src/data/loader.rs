use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder};
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Batch sources
// ---------------------------------------------------------------------------

/// One input extract.
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// A CSV file on disk. Absent files are skipped, not fatal.
    File(PathBuf),
    /// CSV text already in memory.
    Inline { label: String, contents: String },
}

impl BatchSource {
    pub fn inline(label: impl Into<String>, contents: impl Into<String>) -> Self {
        BatchSource::Inline {
            label: label.into(),
            contents: contents.into(),
        }
    }

    /// Short name used in reports and log lines.
    pub fn label(&self) -> String {
        match self {
            BatchSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            BatchSource::Inline { label, .. } => label.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse results
// ---------------------------------------------------------------------------

/// Which parsing pass produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// Fixed row width, strict UTF-8, doubled or backslash-escaped quotes.
    Strict,
    /// Ragged rows, lossy UTF-8, doubled quotes only. A line whose quote
    /// never closes is re-read without quoting.
    Lenient,
}

/// One data row and its record index in the source, counting skipped rows.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub record: usize,
    pub cells: BTreeMap<String, String>,
}

/// A parsed batch: header plus rows of non-empty cells.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
    pub strategy: ParseStrategy,
    /// Rows the lenient pass still could not place under the header.
    pub skipped_rows: usize,
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(RawBatch),
    Missing,
    Failed { reason: String },
}

#[derive(Debug, Error)]
enum ParseError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("no header row")]
    NoHeader,
    #[error("a quoted field is never closed")]
    UnterminatedQuote,
    #[error("row {row} has {found} fields, header has {expected}")]
    Width {
        row: usize,
        found: usize,
        expected: usize,
    },
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Read and parse one batch, falling back to the lenient strategy when the
/// strict pass rejects any row.
pub fn load_batch(source: &BatchSource) -> LoadOutcome {
    let label = source.label();
    let bytes = match source {
        BatchSource::File(path) => match read_source(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("batch {label}: not found at {}", path.display());
                return LoadOutcome::Missing;
            }
            Err(e) => {
                warn!("batch {label}: {e}");
                return LoadOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        },
        BatchSource::Inline { contents, .. } => contents.as_bytes().to_vec(),
    };

    match parse_strict(&bytes) {
        Ok(batch) => {
            info!("batch {label}: {} rows loaded", batch.rows.len());
            return LoadOutcome::Loaded(batch);
        }
        Err(e) => warn!("batch {label}: strict parse failed ({e}), trying lenient parse"),
    }

    match parse_lenient(&bytes) {
        Ok(batch) => {
            info!(
                "batch {label}: {} rows loaded (lenient, {} skipped)",
                batch.rows.len(),
                batch.skipped_rows
            );
            LoadOutcome::Loaded(batch)
        }
        Err(e) => {
            warn!("batch {label}: failed to parse: {e}");
            LoadOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn read_source(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn parse_strict(bytes: &[u8]) -> Result<RawBatch, ParseError> {
    // Backslash escapes only apply to inputs that use them; elsewhere a
    // backslash is literal text.
    let escaped = bytes.windows(2).any(|w| w == b"\\\"");
    // The csv reader ends an open quote at EOF without complaint.
    if open_quote_at_eof(bytes, escaped) {
        return Err(ParseError::UnterminatedQuote);
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .double_quote(true)
        .escape(escaped.then_some(b'\\'))
        .from_reader(bytes);
    let headers = normalize_headers(reader.headers()?.iter().map(str::to_string))?;

    let mut rows = Vec::new();
    for (record, result) in reader.records().enumerate() {
        let fields = result?;
        rows.push(SourceRow {
            record,
            cells: row_cells(&headers, fields.iter()),
        });
    }

    Ok(RawBatch {
        headers,
        rows,
        strategy: ParseStrategy::Strict,
        skipped_rows: 0,
    })
}

fn parse_lenient(bytes: &[u8]) -> Result<RawBatch, ParseError> {
    let mut records = logical_records(bytes)?.into_iter();
    let header = records.next().ok_or(ParseError::NoHeader)?;
    let headers = normalize_headers(header.into_iter())?;

    let mut rows = Vec::new();
    let mut skipped_rows = 0;
    for (record, fields) in records.enumerate() {
        if fields.len() > headers.len() {
            let err = ParseError::Width {
                row: record,
                found: fields.len(),
                expected: headers.len(),
            };
            warn!("skipping unparsable {err}");
            skipped_rows += 1;
            continue;
        }
        rows.push(SourceRow {
            record,
            cells: row_cells(&headers, fields.iter().map(String::as_str)),
        });
    }

    Ok(RawBatch {
        headers,
        rows,
        strategy: ParseStrategy::Lenient,
        skipped_rows,
    })
}

/// Split input into records without letting one bad quote swallow the rest
/// of the file.
///
/// Physical lines are joined while their quote count is odd, so quoted
/// fields may still span lines. If the input ends with the quote still
/// open, only the opening line is taken, read with quoting off, and reading
/// resumes on the next line.
fn logical_records(bytes: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let lines: Vec<&[u8]> = bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    let mut records = Vec::new();
    let mut start = 0;
    while start < lines.len() {
        if lines[start].is_empty() {
            start += 1;
            continue;
        }
        let mut end = start;
        let mut quotes = quote_count(lines[start]);
        while quotes % 2 == 1 && end + 1 < lines.len() {
            end += 1;
            quotes += quote_count(lines[end]);
        }

        if quotes % 2 == 0 {
            records.extend(split_fields(&lines[start..=end].join(&b'\n'), true)?);
            start = end + 1;
        } else {
            warn!("line {}: unterminated quote, reading it unquoted", start + 1);
            records.extend(split_fields(lines[start], false)?);
            start += 1;
        }
    }
    Ok(records)
}

/// Quote parity over the whole input. With `escaped`, a backslash inside
/// quotes hides the byte after it.
fn open_quote_at_eof(bytes: &[u8], escaped: bool) -> bool {
    let mut open = false;
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        match b {
            b'\\' if escaped && open => {
                iter.next();
            }
            b'"' => open = !open,
            _ => {}
        }
    }
    open
}

fn quote_count(line: &[u8]) -> usize {
    line.iter().filter(|&&b| b == b'"').count()
}

fn split_fields(chunk: &[u8], quoting: bool) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(quoting)
        .double_quote(true)
        .from_reader(chunk);

    let mut out = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let fields = record
            .iter()
            .map(|f| {
                let text = String::from_utf8_lossy(f);
                if quoting {
                    text.into_owned()
                } else {
                    text.trim().trim_matches('"').to_string()
                }
            })
            .collect();
        out.push(fields);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trim names, drop a BOM, name blank columns and disambiguate repeats.
fn normalize_headers(raw: impl Iterator<Item = String>) -> Result<Vec<String>, ParseError> {
    let mut headers: Vec<String> = Vec::new();
    for (i, name) in raw.enumerate() {
        let name = name.trim_start_matches('\u{feff}').trim();
        let base = if name.is_empty() {
            format!("unnamed_{i}")
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut k = 1;
        while headers.contains(&candidate) {
            candidate = format!("{base}.{k}");
            k += 1;
        }
        headers.push(candidate);
    }
    if headers.is_empty() || (headers.len() == 1 && headers[0] == "unnamed_0") {
        return Err(ParseError::NoHeader);
    }
    Ok(headers)
}

/// Pair trimmed fields with headers, keeping only non-blank cells. Short rows
/// leave trailing columns null.
fn row_cells<'a>(
    headers: &[String],
    fields: impl Iterator<Item = &'a str>,
) -> BTreeMap<String, String> {
    headers
        .iter()
        .zip(fields.map(str::trim))
        .filter(|(_, value)| !value.is_empty())
        .map(|(h, value)| (h.clone(), value.to_string()))
        .collect()
}
