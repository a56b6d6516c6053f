//! # Header-Skip Heuristic
//!
//! Legacy exports often start with a metadata preamble of unknown length
//! (collar serial, export date, free text) before the real header line. Read
//! such files headerless, then locate the header by a column name known to
//! be in it.
//!
//! This is a heuristic: the first row containing the known name wins. It does
//! not understand headers spread over several lines, and a preamble cell that
//! happens to equal the known name will be mistaken for the header.

use std::collections::HashSet;

use serde_json::Value;

use super::csv_files::SYNTHETIC_COLUMN_PREFIX;
use crate::errors::{CollarError, Result};
use crate::tables::RawTable;

/// Index of the first row holding `known_column` as a cell value.
///
/// Only rows are scanned, not the table's current column names. Cells are
/// compared after trimming whitespace.
///
/// # Errors
/// [`CollarError::HeaderNotFound`] when no row contains the name. The function
/// never guesses.
pub fn detect_header_offset(table: &RawTable, known_column: &str) -> Result<usize> {
    table
        .rows()
        .iter()
        .position(|row| row.iter().any(|cell| cell_matches(cell, known_column)))
        .ok_or_else(|| CollarError::HeaderNotFound {
            column: known_column.to_string(),
            origin: table.source().unwrap_or("table").to_string(),
        })
}

/// Drops the preamble above the detected header row.
///
/// With `keep_as_header`, the detected row becomes the column names and is
/// dropped together with everything above it, so the row count shrinks by
/// `offset + 1`. Without it, only the `offset` rows above are dropped and the
/// current column names stay as they are.
pub fn remove_header(table: &RawTable, known_column: &str, keep_as_header: bool) -> Result<RawTable> {
    let offset = detect_header_offset(table, known_column)?;
    if keep_as_header {
        promote_row_to_header(table, offset)
    } else {
        let (source, columns, rows) = table.clone().into_parts();
        let rows = rows.into_iter().skip(offset).collect();
        relabel(RawTable::new(columns, rows)?, source)
    }
}

/// Makes row `index` the header and drops it and every row above it.
///
/// Blank header cells get synthetic names and repeated names get a numeric
/// suffix. Trailing columns that are blank both in the header and in every
/// remaining row (padding left over from a wide preamble line) are removed.
pub(crate) fn promote_row_to_header(table: &RawTable, index: usize) -> Result<RawTable> {
    let (source, _, rows) = table.clone().into_parts();
    let mut rows = rows.into_iter().skip(index);
    let header = rows.next().ok_or_else(|| {
        CollarError::parse(
            source.clone().unwrap_or_else(|| "table".to_string()),
            format!("no row {} to use as header", index),
        )
    })?;
    let mut data: Vec<Vec<Value>> = rows.collect();

    let mut width = header.len();
    while width > 0
        && header[width - 1].is_null()
        && data.iter().all(|row| row[width - 1].is_null())
    {
        width -= 1;
    }
    for row in &mut data {
        row.truncate(width);
    }

    let columns = header_names(&header[..width]);
    relabel(RawTable::new(columns, data)?, source)
}

fn header_names(cells: &[Value]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = match cell {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                Value::Null => format!("{}{}", SYNTHETIC_COLUMN_PREFIX, i + 1),
                other => other.to_string(),
            };
            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

fn cell_matches(cell: &Value, known_column: &str) -> bool {
    matches!(cell, Value::String(s) if s.trim() == known_column)
}

fn relabel(table: RawTable, source: Option<String>) -> Result<RawTable> {
    Ok(match source {
        Some(source) => table.with_source(source),
        None => table,
    })
}
