//! # Tabular Records
//!
//! Every source produces [`RawTable`] values: an ordered list of column names
//! plus rows of `serde_json::Value` cells. There is no fixed schema across
//! sources; a Vectronics position table and a legacy CSV export share nothing
//! but this shape.
//!
//! Tables are values. Operations such as header removal or identifier tagging
//! return new tables instead of mutating in place.

use std::collections::{BTreeSet, HashSet};
use std::ops::Deref;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{CollarError, Result};

/// An ordered sequence of records sharing one column list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTable {
    /// Where the table came from (device id, file path, portal action).
    source: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RawTable {
    /// Builds a table, checking that every row is as wide as the column list.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(CollarError::parse(
                "table",
                format!(
                    "row {} has {} cells but the table has {} columns",
                    index,
                    row.len(),
                    columns.len()
                ),
            ));
        }
        Ok(Self {
            source: None,
            columns,
            rows,
        })
    }

    /// A table with columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            source: None,
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from JSON objects.
    ///
    /// The column list is the union of keys in first-seen order; keys missing
    /// from a record become `null` cells.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for record in &records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            source: None,
            columns,
            rows,
        }
    }

    /// Returns the same table labelled with a source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Records as column-name to value maps.
    pub fn records(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }

    /// The column names as a set, for order-insensitive schema checks.
    pub fn column_set(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Splits the table into its parts.
    pub fn into_parts(self) -> (Option<String>, Vec<String>, Vec<Vec<Value>>) {
        (self.source, self.columns, self.rows)
    }
}

/// A [`RawTable`] whose column names went through a renaming function and
/// whose rows are the concatenation of one or more input tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTable {
    table: RawTable,
    /// Source label and row count of each merged input, in input order.
    provenance: Vec<(Option<String>, usize)>,
}

impl NormalizedTable {
    pub(crate) fn new(table: RawTable, provenance: Vec<(Option<String>, usize)>) -> Self {
        Self { table, provenance }
    }

    /// Source label and row count of each merged input, in input order.
    pub fn provenance(&self) -> &[(Option<String>, usize)] {
        &self.provenance
    }

    pub fn into_inner(self) -> RawTable {
        self.table
    }
}

impl Deref for NormalizedTable {
    type Target = RawTable;

    fn deref(&self) -> &RawTable {
        &self.table
    }
}

/// Renders a cell the way it would appear in a delimited file.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn from_records_unions_keys_in_first_seen_order() {
        let table = RawTable::from_records(vec![
            obj(json!({"idPosition": 1, "latitude": 46.1})),
            obj(json!({"idPosition": 2, "longitude": 7.4})),
        ]);

        assert_eq!(table.columns(), ["idPosition", "latitude", "longitude"]);
        assert_eq!(table.rows()[0], vec![json!(1), json!(46.1), Value::Null]);
        assert_eq!(table.rows()[1], vec![json!(2), Value::Null, json!(7.4)]);
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let result = RawTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![json!(1), json!(2)], vec![json!(3)]],
        );
        assert!(matches!(result, Err(CollarError::Parse { .. })));
    }

    #[test]
    fn records_round_trip_through_maps() {
        let table = RawTable::new(
            vec!["id".into(), "lat".into()],
            vec![vec![json!("a"), json!(1.5)]],
        )
        .unwrap();
        let records: Vec<_> = table.records().collect();
        assert_eq!(records[0].get("lat"), Some(&json!(1.5)));
        assert_eq!(table.column_values("id").unwrap().count(), 1);
    }

    #[test]
    fn cell_to_string_leaves_strings_unquoted() {
        assert_eq!(cell_to_string(&json!("abc")), "abc");
        assert_eq!(cell_to_string(&json!(12)), "12");
        assert_eq!(cell_to_string(&Value::Null), "");
    }
}
