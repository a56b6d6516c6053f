//! # Data Ingestors Module
//!
//! Flat-file sources: legacy and manual CSV exports, some of which open with
//! a metadata preamble of unknown length.
//!
//! ## Contained Modules:
//! - **`csv_files`**: delimited-text reading (headered and headerless),
//!   batch loading with a shared-schema check, identifier tagging.
//! - **`header`**: the header-skip heuristic that finds the real header row
//!   by a known column name.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Delimited-text reading and batch loading.
pub mod csv_files;
/// Preamble detection and removal.
pub mod header;

// --- Public API Re-exports ---
pub use csv_files::{
    add_identifier, add_identifier_as, load, load_file, load_files, read_headerless, read_headerless_str,
    read_table, read_table_str, sniff_delimiter, sniff_delimiter_for, CsvBatch, CsvFile, CsvOptions,
    DEFAULT_IDENTIFIER_COLUMN,
};
pub use header::{detect_header_offset, remove_header};
