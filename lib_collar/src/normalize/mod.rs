//! # Result Normalizer
//!
//! Merges per-source tables into one [`NormalizedTable`]. Column names are
//! passed through a caller-supplied renaming hook first; the post-rename
//! column sets must then agree across all inputs. Mismatches are a hard
//! error: nothing is padded with empty values.
//!
//! A table with neither columns nor rows (a device with nothing new since its
//! cursor) is "no data", not a schema: it takes no part in the column check
//! and shows up in the provenance with a count of 0.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::errors::{CollarError, Result};
use crate::tables::{NormalizedTable, RawTable};

/// Default column renaming: drop non-ASCII characters, lower-case, and
/// replace `.` and spaces with `_`.
///
/// `"Latitude [°]"` becomes `"latitude_[]"`, `"Temp.C"` becomes `"temp_c"`.
pub fn default_rename(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii)
        .map(|c| match c {
            '.' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Leaves names untouched.
pub fn keep_names(name: &str) -> String {
    name.to_string()
}

/// Renames every column of every table and concatenates rows in input order.
///
/// The first table with columns fixes the column order. A later table with
/// the same column set in a different order has its cells reordered to match.
/// Shapeless empty tables are skipped by the check.
///
/// # Errors
/// - [`CollarError::SchemaMismatch`] when a table's renamed column set differs
///   from the first table's.
/// - [`CollarError::DuplicateColumn`] when renaming maps two columns of one
///   table onto the same name.
pub fn normalize<F>(tables: &[RawTable], rename: F) -> Result<NormalizedTable>
where
    F: Fn(&str) -> String,
{
    let provenance_of = |table: &RawTable| (table.source().map(str::to_string), table.len());

    let Some(first) = tables.iter().find(|t| !is_shapeless(t)) else {
        let provenance = tables.iter().map(provenance_of).collect();
        return Ok(NormalizedTable::new(RawTable::empty(Vec::new()), provenance));
    };

    let columns = renamed_columns(first, &rename)?;
    let expected: BTreeSet<&str> = columns.iter().map(String::as_str).collect();

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(tables.iter().map(RawTable::len).sum());
    let mut provenance = Vec::with_capacity(tables.len());

    for (table_index, table) in tables.iter().enumerate() {
        if is_shapeless(table) {
            provenance.push(provenance_of(table));
            continue;
        }
        let renamed = renamed_columns(table, &rename)?;
        let found: BTreeSet<&str> = renamed.iter().map(String::as_str).collect();
        if found != expected {
            return Err(CollarError::SchemaMismatch {
                table_index,
                expected: columns.clone(),
                found: renamed,
            });
        }

        if renamed == columns {
            rows.extend(table.rows().iter().cloned());
        } else {
            let position: HashMap<&str, usize> = renamed
                .iter()
                .enumerate()
                .map(|(i, c)| (c.as_str(), i))
                .collect();
            let order: Vec<usize> = columns.iter().map(|c| position[c.as_str()]).collect();
            rows.extend(
                table
                    .rows()
                    .iter()
                    .map(|row| order.iter().map(|&i| row[i].clone()).collect()),
            );
        }
        provenance.push(provenance_of(table));
    }

    debug!(
        tables = tables.len(),
        rows = rows.len(),
        columns = columns.len(),
        "Normalized tables"
    );

    let merged = RawTable::new(columns, rows)?;
    Ok(NormalizedTable::new(merged, provenance))
}

/// [`normalize`] with [`default_rename`].
pub fn normalize_default(tables: &[RawTable]) -> Result<NormalizedTable> {
    normalize(tables, default_rename)
}

fn is_shapeless(table: &RawTable) -> bool {
    table.columns().is_empty() && table.is_empty()
}

fn renamed_columns<F>(table: &RawTable, rename: &F) -> Result<Vec<String>>
where
    F: Fn(&str) -> String,
{
    let renamed: Vec<String> = table.columns().iter().map(|c| rename(c)).collect();
    let mut seen = BTreeSet::new();
    for name in &renamed {
        if !seen.insert(name.as_str()) {
            return Err(CollarError::DuplicateColumn {
                column: name.clone(),
            });
        }
    }
    Ok(renamed)
}
