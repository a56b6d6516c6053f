//! # Flat-File Ingestion
//!
//! Reads delimited text into [`RawTable`]s. Two read modes exist:
//!
//! - **headered**: the first non-blank line names the columns;
//! - **headerless**: every line is a data row and the columns get synthetic
//!   names (`column_1`, `column_2`, ...). This is the input shape the
//!   header-skip heuristic in [`super::header`] works on.
//!
//! Blank lines are skipped. Rows shorter than the widest line are padded with
//! `null`; empty cells are `null` as well.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::header::{promote_row_to_header, remove_header};
use crate::errors::{CollarError, ItemFailure, Result};
use crate::tables::RawTable;

/// Prefix of the synthetic column names given to headerless reads.
pub const SYNTHETIC_COLUMN_PREFIX: &str = "column_";

/// Column name used by [`add_identifier`].
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "identifier";

const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b'\t', b';'];
const SNIFF_LINES: usize = 50;
const SNIFF_TAIL_LINES: usize = 10;

/// How to read and tag a batch of files.
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Field delimiter; sniffed per file when `None`.
    pub delimiter: Option<u8>,
    /// When set, the first row containing this value becomes the header and
    /// everything above it is discarded as preamble.
    pub header_column: Option<String>,
}

/// One file to ingest, optionally tagged with an identifier value.
#[derive(Debug, Clone)]
pub struct CsvFile {
    pub path: PathBuf,
    /// Constant value for the identifier column, e.g. an animal label.
    pub identifier: Option<String>,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Outcome of loading several files.
#[derive(Debug, Default)]
pub struct CsvBatch {
    /// One table per readable file, in input order.
    pub tables: Vec<RawTable>,
    /// Files that could not be read or parsed.
    pub failed: Vec<ItemFailure>,
}

/// Picks the candidate delimiter whose per-line count is most consistent over
/// the tail of the sample, preferring the higher count on a tie. The tail
/// skips most of a metadata preamble, whose prose tends to hold stray commas.
/// Falls back to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let sample = sniff_sample(text);
    let tail = &sample[sample.len().saturating_sub(SNIFF_TAIL_LINES)..];

    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, consistency(tail, d)))
        .filter(|&(_, (lines, _))| lines > 0)
        .max_by_key(|&(_, score)| score)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Like [`sniff_delimiter`], but first looks for a candidate that splits some
/// line into a cell equal to `known_column`. That line is the header the
/// preamble heuristic will look for, so its delimiter is the file's.
pub fn sniff_delimiter_for(text: &str, known_column: &str) -> u8 {
    let sample = sniff_sample(text);
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .find(|&d| {
            sample
                .iter()
                .any(|line| line.split(d as char).any(|cell| cell.trim() == known_column))
        })
        .unwrap_or_else(|| sniff_delimiter(text))
}

fn sniff_sample(text: &str) -> Vec<&str> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect()
}

/// `(lines, count)`: how many lines share the most common non-zero count of
/// `delimiter`, and that count.
fn consistency(lines: &[&str], delimiter: u8) -> (usize, usize) {
    let mut frequency: HashMap<usize, usize> = HashMap::new();
    for line in lines {
        let count = line.bytes().filter(|&b| b == delimiter).count();
        if count > 0 {
            *frequency.entry(count).or_default() += 1;
        }
    }
    frequency
        .into_iter()
        .map(|(count, lines)| (lines, count))
        .max()
        .unwrap_or((0, 0))
}

/// Reads every line as a data row under synthetic column names.
pub fn read_headerless_str(text: &str, delimiter: Option<u8>, origin: &str) -> Result<RawTable> {
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(text));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut lines: Vec<Vec<Value>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CollarError::parse(origin, e))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        lines.push(record.iter().map(to_cell).collect());
    }

    let width = lines.iter().map(Vec::len).max().unwrap_or(0);
    for line in &mut lines {
        line.resize(width, Value::Null);
    }

    let columns = (1..=width)
        .map(|i| format!("{}{}", SYNTHETIC_COLUMN_PREFIX, i))
        .collect();
    Ok(RawTable::new(columns, lines)?.with_source(origin))
}

/// Reads delimited text whose first non-blank line is the header.
pub fn read_table_str(text: &str, delimiter: Option<u8>, origin: &str) -> Result<RawTable> {
    let raw = read_headerless_str(text, delimiter, origin)?;
    if raw.is_empty() {
        return Ok(RawTable::empty(Vec::new()).with_source(origin));
    }
    promote_row_to_header(&raw, 0)
}

/// [`read_headerless_str`] on a file.
pub fn read_headerless(path: &Path, delimiter: Option<u8>) -> Result<RawTable> {
    let origin = path.display().to_string();
    let text = read_text(path)?;
    read_headerless_str(&text, delimiter, &origin)
}

/// [`read_table_str`] on a file.
pub fn read_table(path: &Path, delimiter: Option<u8>) -> Result<RawTable> {
    let origin = path.display().to_string();
    let text = read_text(path)?;
    read_table_str(&text, delimiter, &origin)
}

/// Reads one file, stripping a metadata preamble when `header_column` is set.
pub fn load_file(path: &Path, options: &CsvOptions) -> Result<RawTable> {
    match &options.header_column {
        Some(column) => {
            let origin = path.display().to_string();
            let text = read_text(path)?;
            let delimiter = options
                .delimiter
                .unwrap_or_else(|| sniff_delimiter_for(&text, column));
            let raw = read_headerless_str(&text, Some(delimiter), &origin)?;
            remove_header(&raw, column, true)
        }
        None => read_table(path, options.delimiter),
    }
}

/// Loads several files into tables that share one column set.
///
/// Unreadable or unparseable files are reported in [`CsvBatch::failed`].
///
/// # Errors
/// [`CollarError::SchemaMismatch`] when the readable files disagree on their
/// column sets; no partial result is returned in that case.
pub fn load<P: AsRef<Path>>(paths: &[P], options: &CsvOptions) -> Result<CsvBatch> {
    let files: Vec<CsvFile> = paths.iter().map(|p| CsvFile::new(p.as_ref())).collect();
    load_files(&files, options, DEFAULT_IDENTIFIER_COLUMN)
}

/// [`load`] with per-file identifiers written to `identifier_column`.
pub fn load_files(files: &[CsvFile], options: &CsvOptions, identifier_column: &str) -> Result<CsvBatch> {
    let mut batch = CsvBatch::default();

    for file in files {
        let origin = file.path.display().to_string();
        let loaded = load_file(&file.path, options).and_then(|table| match &file.identifier {
            Some(id) => add_identifier_as(&table, identifier_column, id),
            None => Ok(table),
        });
        match loaded {
            Ok(table) => {
                debug!(path = %origin, rows = table.len(), columns = table.columns().len(), "Loaded CSV file");
                batch.tables.push(table);
            }
            Err(e) => {
                warn!(path = %origin, error = %e, "Failed to load CSV file");
                batch.failed.push(ItemFailure::new(origin, e));
            }
        }
    }

    check_same_columns(&batch.tables)?;
    info!(
        files = files.len(),
        loaded = batch.tables.len(),
        failed = batch.failed.len(),
        "CSV batch loaded"
    );
    Ok(batch)
}

/// Appends a constant [`DEFAULT_IDENTIFIER_COLUMN`] to every record.
pub fn add_identifier(table: &RawTable, id_value: &str) -> Result<RawTable> {
    add_identifier_as(table, DEFAULT_IDENTIFIER_COLUMN, id_value)
}

/// Appends a constant column named `column` to every record.
///
/// # Errors
/// [`CollarError::DuplicateColumn`] when the table already has that column.
pub fn add_identifier_as(table: &RawTable, column: &str, id_value: &str) -> Result<RawTable> {
    if table.column_index(column).is_some() {
        return Err(CollarError::DuplicateColumn {
            column: column.to_string(),
        });
    }
    let (source, mut columns, mut rows) = table.clone().into_parts();
    columns.push(column.to_string());
    for row in &mut rows {
        row.push(Value::String(id_value.to_string()));
    }
    let tagged = RawTable::new(columns, rows)?;
    Ok(match source {
        Some(source) => tagged.with_source(source),
        None => tagged,
    })
}

fn check_same_columns(tables: &[RawTable]) -> Result<()> {
    let shapeless = |t: &RawTable| t.columns().is_empty() && t.is_empty();
    let Some(first) = tables.iter().find(|t| !shapeless(t)) else {
        return Ok(());
    };
    let expected = first.column_set();
    for (table_index, table) in tables.iter().enumerate() {
        if !shapeless(table) && table.column_set() != expected {
            return Err(CollarError::SchemaMismatch {
                table_index,
                expected: first.columns().to_vec(),
                found: table.columns().to_vec(),
            });
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| CollarError::io(path.display(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn to_cell(field: &str) -> Value {
    if field.trim().is_empty() {
        Value::Null
    } else {
        Value::String(field.to_string())
    }
}
