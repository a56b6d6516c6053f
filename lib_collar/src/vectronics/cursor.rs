//! # Incremental-Fetch Cursors
//!
//! A cursor tells the API to return only records after a point: after a
//! record id, or after a timestamp on one of two date fields.
//!
//! The two date fields overlap but are not interchangeable. Acquisition time
//! is when the collar took the fix; server-received time (`scts`) is when the
//! vendor stored it. Neither is guaranteed monotonic, and the vendor warns
//! that "new since X" may include records missed earlier. Treat date cursors
//! as best-effort, not as a completeness guarantee.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CollarError, Result};
use crate::tables::RawTable;

/// Id column of Vectronics position records.
pub const ID_POSITION_COLUMN: &str = "idPosition";

/// Which timestamp a date cursor compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    /// Time the collar acquired the record.
    Acquisition,
    /// Time the vendor server received the record (`scts`).
    ServerReceived,
}

impl DateField {
    /// Value of the `dateType` query parameter.
    pub fn query_value(self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::ServerReceived => "scts",
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value())
    }
}

/// Where an incremental fetch resumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FetchCursor {
    /// Everything the API has.
    #[default]
    None,
    /// Records with an id greater than `after_id`.
    ById { after_id: i64 },
    /// Records dated after `after_timestamp` on `field`.
    ByDate { after_timestamp: String, field: DateField },
}

impl FetchCursor {
    pub fn by_id(after_id: i64) -> Self {
        Self::ById { after_id }
    }

    /// Builds a date cursor after checking the timestamp is ISO-8601.
    ///
    /// Accepted forms: `2021-06-01`, `2021-06-01T12:00:00` (optionally with
    /// fractional seconds) and RFC 3339 with an offset. The string is sent to
    /// the API unchanged.
    pub fn by_date(after_timestamp: &str, field: DateField) -> Result<Self> {
        let ts = after_timestamp.trim();
        let valid = DateTime::parse_from_rfc3339(ts).is_ok()
            || NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            || NaiveDate::parse_from_str(ts, "%Y-%m-%d").is_ok();
        if !valid {
            return Err(CollarError::parse(
                "cursor",
                format!("{:?} is not an ISO-8601 timestamp", after_timestamp),
            ));
        }
        Ok(Self::ByDate {
            after_timestamp: ts.to_string(),
            field,
        })
    }

    /// Query parameters this cursor adds to a request.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::None => Vec::new(),
            Self::ById { after_id } => vec![("afterIdPosition", after_id.to_string())],
            Self::ByDate {
                after_timestamp,
                field,
            } => vec![
                ("after", after_timestamp.clone()),
                ("dateType", field.query_value().to_string()),
            ],
        }
    }

    /// Cursor resuming after the largest id found in `id_column`.
    ///
    /// Cells may be JSON integers or integer strings; other cells are
    /// ignored. `None` when the table has no such column or no usable id.
    pub fn resume_from(table: &RawTable, id_column: &str) -> Option<Self> {
        table
            .column_values(id_column)?
            .filter_map(|cell| match cell {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .max()
            .map(Self::by_id)
    }
}

/// One cursor for every device, or one cursor per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorSpec {
    Shared(FetchCursor),
    PerDevice(Vec<FetchCursor>),
}

impl Default for CursorSpec {
    fn default() -> Self {
        Self::Shared(FetchCursor::None)
    }
}

impl From<FetchCursor> for CursorSpec {
    fn from(cursor: FetchCursor) -> Self {
        Self::Shared(cursor)
    }
}

impl From<Vec<FetchCursor>> for CursorSpec {
    fn from(cursors: Vec<FetchCursor>) -> Self {
        Self::PerDevice(cursors)
    }
}

impl CursorSpec {
    /// Expands to exactly one cursor per device.
    ///
    /// An empty per-device list means no cursor for anyone.
    ///
    /// # Errors
    /// [`CollarError::Arity`] when a non-empty list's length differs from
    /// `devices`.
    pub fn resolve(&self, devices: usize) -> Result<Vec<FetchCursor>> {
        match self {
            Self::Shared(cursor) => Ok(vec![cursor.clone(); devices]),
            Self::PerDevice(cursors) if cursors.is_empty() => Ok(vec![FetchCursor::None; devices]),
            Self::PerDevice(cursors) if cursors.len() == devices => Ok(cursors.clone()),
            Self::PerDevice(cursors) => Err(CollarError::Arity {
                cursors: cursors.len(),
                devices,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_cursor_encodes_after_id_position() {
        assert_eq!(
            FetchCursor::by_id(1500).query_pairs(),
            vec![("afterIdPosition", "1500".to_string())]
        );
    }

    #[test]
    fn date_cursor_exposes_the_date_field() {
        let cursor = FetchCursor::by_date("2021-06-01T00:00:00", DateField::ServerReceived).unwrap();
        assert_eq!(
            cursor.query_pairs(),
            vec![
                ("after", "2021-06-01T00:00:00".to_string()),
                ("dateType", "scts".to_string())
            ]
        );
        let cursor = FetchCursor::by_date("2021-06-01", DateField::Acquisition).unwrap();
        assert_eq!(cursor.query_pairs()[1].1, "acquisition");
    }

    #[test]
    fn non_iso_timestamps_are_rejected() {
        assert!(FetchCursor::by_date("01/06/2021", DateField::Acquisition).is_err());
        assert!(FetchCursor::by_date("2021-06-01T00:00:00+02:00", DateField::Acquisition).is_ok());
    }

    #[test]
    fn list_length_must_match_devices() {
        let spec = CursorSpec::from(vec![FetchCursor::by_id(1), FetchCursor::by_id(2)]);
        assert!(matches!(
            spec.resolve(1),
            Err(CollarError::Arity { cursors: 2, devices: 1 })
        ));
        assert_eq!(spec.resolve(2).unwrap().len(), 2);
    }

    #[test]
    fn shared_and_empty_lists_cover_every_device() {
        assert_eq!(
            CursorSpec::from(FetchCursor::by_id(7)).resolve(3).unwrap(),
            vec![FetchCursor::by_id(7); 3]
        );
        assert_eq!(
            CursorSpec::PerDevice(Vec::new()).resolve(2).unwrap(),
            vec![FetchCursor::None; 2]
        );
    }

    #[test]
    fn resume_uses_largest_id() {
        let table = RawTable::new(
            vec![ID_POSITION_COLUMN.to_string()],
            vec![vec![json!(10)], vec![json!("42")], vec![Value::Null], vec![json!(7)]],
        )
        .unwrap();
        assert_eq!(
            FetchCursor::resume_from(&table, ID_POSITION_COLUMN),
            Some(FetchCursor::by_id(42))
        );
        assert_eq!(FetchCursor::resume_from(&table, "missing"), None);
        assert_eq!(
            FetchCursor::resume_from(&RawTable::empty(vec![ID_POSITION_COLUMN.into()]), ID_POSITION_COLUMN),
            None
        );
    }
}
