//! # Vectronics API Source
//!
//! Per-device retrieval from the Vectronics collar API. Each device is
//! fetched with its own key; one device failing never sinks the others.
//!
//! ## Contained Modules:
//! - **`data_type`**: the record families and their route segments.
//! - **`cursor`**: incremental-fetch cursors by id or by date.
//! - **`apicall`**: URL construction, concurrent fetching and payload parsing.

pub mod apicall;
pub mod cursor;
pub mod data_type;

pub use apicall::{ApiCallVectronics, DevicePayload, DeviceResult, VectronicsBatch};
pub use cursor::{CursorSpec, DateField, FetchCursor, ID_POSITION_COLUMN};
pub use data_type::DataTypeSelector;
