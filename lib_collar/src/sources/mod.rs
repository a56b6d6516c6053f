//! # Source Dispatch
//!
//! One `fetch` entry point over the three source kinds. The caller picks the
//! kind explicitly by building the matching [`FetchRequest`] variant; each
//! variant carries its own parameter struct.
//!
//! Every kind answers with the same [`FetchOutcome`]: the tables that came
//! back plus the items that failed on their own. Structural failures (cursor
//! arity, schema mismatch, portal login) are returned as `Err` instead.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ats::{fetch_export, AtsCredentials};
use crate::configs::CollarConfig;
use crate::errors::{CollarError, ItemFailure, Result};
use crate::ingestors::{load_files, CsvFile, CsvOptions};
use crate::keys::load_keys_paired;
use crate::normalize::normalize;
use crate::tables::{NormalizedTable, RawTable};
use crate::vectronics::{ApiCallVectronics, CursorSpec, DataTypeSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Vectronics,
    Ats,
    Csv,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vectronics => "vectronics",
            Self::Ats => "ats",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = CollarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vectronics" => Ok(Self::Vectronics),
            "ats" => Ok(Self::Ats),
            "csv" => Ok(Self::Csv),
            other => Err(CollarError::Config(format!("unknown source kind {:?}", other))),
        }
    }
}

/// Vendor API fetch: one key file per device.
#[derive(Debug, Clone)]
pub struct VectronicsParams {
    pub key_paths: Vec<PathBuf>,
    pub data_type: DataTypeSelector,
    pub count_only: bool,
    /// Shared cursor, or one per key path in the same order.
    pub cursors: CursorSpec,
}

/// Portal export.
#[derive(Debug, Clone)]
pub struct AtsParams {
    pub credentials: AtsCredentials,
    /// Overrides the configured portal URL.
    pub base_url: Option<String>,
    /// Action name from the configured table, or a raw control id.
    pub action: String,
}

/// Local files.
#[derive(Debug, Clone, Default)]
pub struct CsvParams {
    pub files: Vec<CsvFile>,
    /// Known column used to skip a metadata preamble.
    pub header_column: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FetchRequest {
    Vectronics(VectronicsParams),
    Ats(AtsParams),
    Csv(CsvParams),
}

impl FetchRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Vectronics(_) => SourceKind::Vectronics,
            Self::Ats(_) => SourceKind::Ats,
            Self::Csv(_) => SourceKind::Csv,
        }
    }
}

/// Tables plus per-item failures of one fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub kind: SourceKind,
    pub tables: Vec<RawTable>,
    pub failed: Vec<ItemFailure>,
}

impl FetchOutcome {
    /// True when items were attempted and none produced a table.
    pub fn all_failed(&self) -> bool {
        self.tables.is_empty() && !self.failed.is_empty()
    }
}

/// [`FetchOutcome`] after merging.
#[derive(Debug)]
pub struct NormalizedOutcome {
    pub kind: SourceKind,
    pub table: NormalizedTable,
    pub failed: Vec<ItemFailure>,
}

impl NormalizedOutcome {
    /// True when items were attempted and none contributed a table.
    pub fn all_failed(&self) -> bool {
        self.table.provenance().is_empty() && !self.failed.is_empty()
    }
}

/// Runs one fetch against the source the request names.
///
/// # Errors
/// - Vectronics: [`CollarError::Arity`] when a per-device cursor list does
///   not match the key paths. Checked before any file is read.
/// - ATS: [`CollarError::Auth`] or [`CollarError::Source`]; a portal export
///   is a single item, so there is nothing partial to return.
/// - CSV: [`CollarError::SchemaMismatch`] when files disagree on columns.
pub async fn fetch(request: &FetchRequest, config: &CollarConfig) -> Result<FetchOutcome> {
    let kind = request.kind();
    info!(source = %kind, "Starting fetch");

    let (tables, failed) = match request {
        FetchRequest::Vectronics(params) => fetch_vectronics(params, config).await?,
        FetchRequest::Ats(params) => {
            let base_url = params.base_url.as_deref().unwrap_or(&config.ats.base_url);
            let table = fetch_export(&params.credentials, base_url, &params.action, &config.ats).await?;
            (vec![table], Vec::new())
        }
        FetchRequest::Csv(params) => {
            let options = CsvOptions {
                delimiter: config.csv.delimiter_byte()?,
                header_column: params.header_column.clone(),
            };
            let batch = load_files(&params.files, &options, &config.csv.identifier_column)?;
            (batch.tables, batch.failed)
        }
    };

    info!(source = %kind, tables = tables.len(), failed = failed.len(), "Fetch finished");
    Ok(FetchOutcome { kind, tables, failed })
}

async fn fetch_vectronics(
    params: &VectronicsParams,
    config: &CollarConfig,
) -> Result<(Vec<RawTable>, Vec<ItemFailure>)> {
    let cursors = params.cursors.resolve(params.key_paths.len())?;
    let (jobs, mut failed) = load_keys_paired(params.key_paths.iter().zip(cursors));

    let api = ApiCallVectronics::new(&config.vectronics)?;
    let mut batch = api.fetch_each(jobs, params.data_type, params.count_only).await;
    failed.append(&mut batch.failed);
    Ok((batch.into_tables(), failed))
}

/// [`fetch`] followed by [`normalize`] with the given renaming hook.
///
/// # Errors
/// Everything [`fetch`] returns, plus the normalizer's
/// [`CollarError::SchemaMismatch`] and [`CollarError::DuplicateColumn`].
pub async fn fetch_normalized<F>(request: &FetchRequest, config: &CollarConfig, rename: F) -> Result<NormalizedOutcome>
where
    F: Fn(&str) -> String,
{
    let outcome = fetch(request, config).await?;
    let table = normalize(&outcome.tables, rename)?;
    Ok(NormalizedOutcome {
        kind: outcome.kind,
        table,
        failed: outcome.failed,
    })
}
