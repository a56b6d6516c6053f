// Always-on core: error taxonomy, table values, merging and settings.
pub mod configs;
pub mod errors;
pub mod normalize;
pub mod tables;

// Source modules, one feature each (all on by default through `full`).
#[cfg(feature = "ats")]
pub mod ats; // Web-portal session client
#[cfg(feature = "ingestors")]
pub mod ingestors; // CSV files and the header-skip heuristic
#[cfg(feature = "keys")]
pub mod keys; // Vendor key files
#[cfg(feature = "loggers")]
pub mod loggers; // tracing-subscriber setup
#[cfg(feature = "retrieve")]
pub mod retrieve; // Shared HTTP client
#[cfg(feature = "sources")]
pub mod sources; // Dispatch over source kinds
#[cfg(feature = "vectronics")]
pub mod vectronics; // Vendor REST API client

// Re-export the types most callers need
pub use configs::CollarConfig;
pub use errors::{CollarError, FailureReport, ItemFailure, Result};
pub use normalize::{default_rename, keep_names, normalize, normalize_default};
pub use tables::{NormalizedTable, RawTable};

#[cfg(feature = "sources")]
pub use sources::{fetch, fetch_normalized, FetchOutcome, FetchRequest, NormalizedOutcome, SourceKind};
