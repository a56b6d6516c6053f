//! # Configuration Modules
//!
//! Typed configuration for every source, loadable from a JSON file. Every
//! field has a default so an empty file (or no file at all) is valid.

/// Source endpoints, portal form layout, action table and CSV defaults.
pub mod config_collar;

pub use config_collar::{AtsConfig, CollarConfig, CsvConfig, VectronicsConfig};
