//! Source file reading with encoding and delimiter auto-detection.
//!
//! Turns a CSV/XLS/XLSX file into a [`ParsedTable`]: ordered headers plus
//! rows of `column -> String`. All cell values are text; the empty string
//! is the only null.
//!
//! Delimited files go through an ordered search over encodings and
//! delimiters; the first combination that yields more than one column and
//! at least one data row wins. The snippet read and the full read are
//! independent passes - the full read re-runs the search instead of
//! trusting the snippet's parameters.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader as _};

use crate::error::{ParseError, ParseResult};

/// Delimiters tried, in order.
const DELIMITERS: &[u8] = &[b',', b';', b'\t'];

/// Encodings tried after the chardet guess, in order.
const ENCODINGS: &[&str] = &["utf-8", "iso-8859-1", "windows-1252"];

/// Rows sampled by [`read_snippet`] by default.
pub const SNIPPET_ROWS: usize = 10;

// =============================================================================
// File kind
// =============================================================================

/// Supported tabular source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xls,
    Xlsx,
}

impl FileKind {
    /// Resolve from a declared file extension.
    pub fn from_extension(ext: &str) -> ParseResult<Self> {
        match ext.trim().to_lowercase().as_str() {
            "csv" => Ok(FileKind::Csv),
            "xls" => Ok(FileKind::Xls),
            "xlsx" => Ok(FileKind::Xlsx),
            other => Err(ParseError::UnsupportedExtension(other.to_string())),
        }
    }

    /// Resolve from a file path's extension.
    pub fn from_path(path: &Path) -> ParseResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext)
    }
}

// =============================================================================
// Parsed table
// =============================================================================

/// A parsed source table with detection metadata.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// Column headers, in file order.
    pub headers: Vec<String>,
    /// Data rows as `column -> value`.
    pub rows: Vec<HashMap<String, String>>,
    /// Encoding the file was decoded with (`utf-8` for spreadsheets).
    pub encoding: String,
    /// Delimiter used, for delimited sources.
    pub delimiter: Option<char>,
}

impl ParsedTable {
    /// Cell value at `(row, column)`, empty when absent.
    pub fn value(&self, row: usize, column: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Render the table as delimited text (used to build the AI prompt).
    pub fn to_delimited_text(&self, delimiter: char) -> String {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter as u8)
            .from_writer(Vec::new());

        // Errors writing to an in-memory buffer cannot happen; rows that
        // still fail are dropped from the rendering.
        let _ = writer.write_record(&self.headers);
        for row in &self.rows {
            let record: Vec<&str> = self
                .headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
                .collect();
            let _ = writer.write_record(&record);
        }

        let bytes = writer.into_inner().unwrap_or_default();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Read a full source table.
pub fn read_table(path: &Path, kind: FileKind) -> ParseResult<ParsedTable> {
    read_with_limit(path, kind, None)
}

/// Read only the first `max_rows` data rows, for the AI mapping prompt.
pub fn read_snippet(path: &Path, kind: FileKind, max_rows: usize) -> ParseResult<ParsedTable> {
    read_with_limit(path, kind, Some(max_rows))
}

fn read_with_limit(path: &Path, kind: FileKind, max_rows: Option<usize>) -> ParseResult<ParsedTable> {
    match kind {
        FileKind::Csv => {
            let bytes = std::fs::read(path)?;
            read_delimited(&bytes, path, max_rows)
        }
        FileKind::Xls | FileKind::Xlsx => read_spreadsheet(path, max_rows),
    }
}

// =============================================================================
// Delimited text
// =============================================================================

/// Detect the encoding of raw bytes using chardet, normalized to the
/// candidates this module knows how to decode.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _, _) = chardet::detect(bytes);
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the named encoding. Returns `None` when the bytes are
/// not valid for a strict encoding (only utf-8 can reject input; the
/// single-byte encodings accept everything).
fn decode_bytes(bytes: &[u8], encoding: &str) -> Option<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => std::str::from_utf8(bytes).ok().map(str::to_string),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Some(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Some(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => Some(String::from_utf8_lossy(bytes).to_string()),
    }
}

/// Encoding candidates for a byte buffer: the chardet guess first, then the
/// fixed fallback order, without duplicates.
fn candidate_encodings(bytes: &[u8]) -> Vec<String> {
    let mut candidates = vec![detect_encoding(bytes)];
    for enc in ENCODINGS {
        if !candidates.iter().any(|c| c == enc) {
            candidates.push(enc.to_string());
        }
    }
    candidates
}

/// Search encodings and delimiters for the first combination producing a
/// usable table.
fn read_delimited(bytes: &[u8], path: &Path, max_rows: Option<usize>) -> ParseResult<ParsedTable> {
    for encoding in candidate_encodings(bytes) {
        let Some(content) = decode_bytes(bytes, &encoding) else {
            continue;
        };

        for &delimiter in DELIMITERS {
            if let Some((headers, rows)) = try_parse(&content, delimiter, max_rows) {
                return Ok(ParsedTable {
                    headers,
                    rows,
                    encoding,
                    delimiter: Some(delimiter as char),
                });
            }
        }
    }

    Err(ParseError::UnparsableFile {
        path: path.display().to_string(),
    })
}

/// Parse with one delimiter; `None` unless the result has more than one
/// column and at least one data row. Malformed rows are skipped, not fatal.
fn try_parse(
    content: &str,
    delimiter: u8,
    max_rows: Option<usize>,
) -> Option<(Vec<String>, Vec<HashMap<String, String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .ok()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.len() < 2 {
        return None;
    }

    let mut rows = Vec::new();
    for record in reader.records().filter_map(Result::ok) {
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let mut row = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            let value = record.get(i).map(str::trim).unwrap_or("");
            row.insert(header.clone(), value.to_string());
        }
        rows.push(row);
        if let Some(limit) = max_rows {
            if rows.len() >= limit {
                break;
            }
        }
    }

    if rows.is_empty() {
        return None;
    }

    Some((headers, rows))
}

// =============================================================================
// Spreadsheets
// =============================================================================

/// Read the first worksheet of an xls/xlsx workbook as text cells.
fn read_spreadsheet(path: &Path, max_rows: Option<usize>) -> ParseResult<ParsedTable> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ParseError::Spreadsheet("workbook has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter.next().ok_or(ParseError::EmptyFile)?;

    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeaders);
    }

    let mut rows = Vec::new();
    for row in rows_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        let mut map = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            map.insert(header.clone(), values.get(i).cloned().unwrap_or_default());
        }
        rows.push(map);
        if let Some(limit) = max_rows {
            if rows.len() >= limit {
                break;
            }
        }
    }

    Ok(ParsedTable {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
        encoding: "utf-8".to_string(),
        delimiter: None,
    })
}

/// Stringify a cell; empty cells become the empty string, never a typed null.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        _ => cell.to_string().trim().to_string(),
    }
}
