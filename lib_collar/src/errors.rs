//! # Error Taxonomy
//!
//! Every fallible operation in the crate returns [`CollarError`]. The variants
//! split into two families:
//!
//! - **Per-item failures** (`Parse`, `Transport`, `Source`, `Io`,
//!   `HeaderNotFound`): one key file, one device or one CSV file went wrong.
//!   Batch operations collect these as [`ItemFailure`] values next to the
//!   successful results.
//! - **Structural failures** (`Arity`, `SchemaMismatch`, `Auth`,
//!   `InvalidSessionState`): the call as a whole has no meaningful partial
//!   result and is aborted.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors produced while fetching, parsing and merging telemetry.
#[derive(Debug, Error)]
pub enum CollarError {
    /// Malformed key file, CSV file or vendor payload.
    #[error("parse error in {origin}: {reason}")]
    Parse {
        /// The file path or device id the input came from.
        origin: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A cursor list whose length does not match the number of devices.
    #[error("cursor arity mismatch: {cursors} cursors for {devices} devices")]
    Arity {
        /// Number of cursors supplied.
        cursors: usize,
        /// Number of devices (key files) supplied.
        devices: usize,
    },

    /// The portal rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A per-device API request failed (timeout, connection error or non-2xx).
    #[error("transport error for device {device_id}: {message}{}", fmt_status(.status))]
    Transport {
        /// The device the request was for.
        device_id: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// Underlying error text.
        message: String,
    },

    /// The web portal failed to produce a usable file.
    #[error("source error: {message}{}", fmt_status(.status))]
    Source {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// Underlying error text.
        message: String,
    },

    /// Tables that should share a column set do not.
    #[error("schema mismatch in table {table_index}: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        /// Position of the offending table in the input.
        table_index: usize,
        /// Column set of the first table.
        expected: Vec<String>,
        /// Column set of the offending table.
        found: Vec<String>,
    },

    /// The header-skip heuristic did not find the known column.
    #[error("header column '{column}' not found in {origin}")]
    HeaderNotFound {
        /// The column name that was searched for.
        column: String,
        /// The table source, if known.
        origin: String,
    },

    /// A column name appears twice where names must be unique.
    #[error("duplicate column '{column}'")]
    DuplicateColumn {
        /// The repeated name.
        column: String,
    },

    /// A session method was called in the wrong state.
    #[error("session is {found}, expected {expected}")]
    InvalidSessionState {
        /// The state(s) the operation needs.
        expected: &'static str,
        /// The state the session was in.
        found: &'static str,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl CollarError {
    /// Shorthand for a [`CollarError::Parse`].
    pub fn parse(origin: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Parse {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`CollarError::Source`].
    pub fn source_error(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Source {
            status,
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Short machine-readable name of the variant, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Arity { .. } => "arity",
            Self::Auth(_) => "auth",
            Self::Transport { .. } => "transport",
            Self::Source { .. } => "source",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::HeaderNotFound { .. } => "header_not_found",
            Self::DuplicateColumn { .. } => "duplicate_column",
            Self::InvalidSessionState { .. } => "invalid_session_state",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CollarError>;

/// One failed item of a batch: which input it was and why it failed.
#[derive(Debug)]
pub struct ItemFailure {
    /// The key file path, device id or CSV path.
    pub item: String,
    /// The error for that item.
    pub error: CollarError,
}

impl ItemFailure {
    /// Pairs an item label with its error.
    pub fn new(item: impl Into<String>, error: CollarError) -> Self {
        Self {
            item: item.into(),
            error,
        }
    }
}

/// Serializable view of an [`ItemFailure`] for logs and reports.
#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub item: &'a str,
    pub kind: &'static str,
    pub message: String,
}

impl<'a> From<&'a ItemFailure> for FailureReport<'a> {
    fn from(failure: &'a ItemFailure) -> Self {
        Self {
            item: &failure.item,
            kind: failure.error.kind(),
            message: failure.error.to_string(),
        }
    }
}
