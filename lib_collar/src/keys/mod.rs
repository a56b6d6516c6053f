//! # Key Registry
//!
//! Vectronics ships one XML key file per collar. Each file names the collar
//! (`<collar ID="...">`) and carries an opaque credential (`<key>...</key>`)
//! that signs every API request for that collar.
//!
//! This module turns key files into [`KeyRecord`]s. It never touches the
//! network. A malformed file fails on its own: [`load_keys`] reports it in
//! [`KeyBatch::failed`] and keeps every sibling that parsed.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{CollarError, ItemFailure, Result};

/// Key-file XML parsing.
pub mod keyx;

pub use keyx::parse_key_str;

/// A device id and the credential that signs requests for it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRecord {
    pub device_id: String,
    pub credential: String,
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("device_id", &self.device_id)
            .field("credential", &"*****")
            .finish()
    }
}

/// Outcome of parsing a batch of key files.
#[derive(Debug, Default)]
pub struct KeyBatch {
    /// Successfully parsed records, in input order.
    pub parsed: Vec<KeyRecord>,
    /// One entry per key file that failed, labelled with its path.
    pub failed: Vec<ItemFailure>,
}

/// Reads and parses one key file.
pub fn parse_key_file(path: &Path) -> Result<KeyRecord> {
    let origin = path.display().to_string();
    let xml = std::fs::read_to_string(path).map_err(|e| CollarError::io(&origin, e))?;
    parse_key_str(&xml, &origin)
}

/// Parses every key file, collecting failures instead of stopping at the first.
///
/// Two files naming the same device keep the first; the second is reported
/// as a failure.
pub fn load_keys<P: AsRef<Path>>(paths: &[P]) -> KeyBatch {
    let (parsed, failed) = load_keys_paired(paths.iter().map(|p| (p, ())));
    KeyBatch {
        parsed: parsed.into_iter().map(|(record, ())| record).collect(),
        failed,
    }
}

/// [`load_keys`] over paths carrying a companion value each.
///
/// The companion of a path that fails is dropped with it, so the surviving
/// records stay paired with the values they came in with.
pub fn load_keys_paired<P, T, I>(entries: I) -> (Vec<(KeyRecord, T)>, Vec<ItemFailure>)
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (P, T)>,
{
    let mut parsed = Vec::new();
    let mut failed = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (path, companion) in entries {
        let path = path.as_ref();
        let origin = path.display().to_string();
        match parse_key_file(path) {
            Ok(record) if !seen.insert(record.device_id.clone()) => {
                warn!(path = %origin, device_id = %record.device_id, "Duplicate key file for device");
                failed.push(ItemFailure::new(
                    origin.clone(),
                    CollarError::parse(origin, format!("duplicate key for device {}", record.device_id)),
                ));
            }
            Ok(record) => {
                debug!(path = %origin, device_id = %record.device_id, "Parsed key file");
                parsed.push((record, companion));
            }
            Err(e) => {
                warn!(path = %origin, error = %e, "Failed to parse key file");
                failed.push(ItemFailure::new(origin, e));
            }
        }
    }

    (parsed, failed)
}
