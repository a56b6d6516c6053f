use futures_util::stream::{self, StreamExt};
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::cursor::{CursorSpec, FetchCursor};
use super::data_type::DataTypeSelector;
use crate::configs::VectronicsConfig;
use crate::errors::{CollarError, ItemFailure, Result};
use crate::keys::KeyRecord;
use crate::retrieve::ky_http::{describe_error, error_status, mask_url_secrets, ApiClient, ClientOptions};
use crate::tables::RawTable;

/// Requests in flight at once.
pub const MAX_CONCURRENT_REQUESTS: usize = 8;

/// Columns of the table built from count-only results.
pub const COUNT_COLUMNS: [&str; 2] = ["device_id", "count"];

const BODY_EXCERPT_CHARS: usize = 200;

/// What one device returned.
#[derive(Debug, Clone, PartialEq)]
pub enum DevicePayload {
    Records(RawTable),
    Count(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResult {
    pub device_id: String,
    pub payload: DevicePayload,
}

/// Per-device outcomes of one fetch, in key order.
#[derive(Debug, Default)]
pub struct VectronicsBatch {
    pub results: Vec<DeviceResult>,
    pub failed: Vec<ItemFailure>,
}

impl VectronicsBatch {
    pub fn get(&self, device_id: &str) -> Option<&DevicePayload> {
        self.results
            .iter()
            .find(|r| r.device_id == device_id)
            .map(|r| &r.payload)
    }

    /// Turns results into tables ready for normalization.
    ///
    /// Record tables come through one per device. Counts are gathered into a
    /// single `device_id,count` table placed after them.
    pub fn into_tables(self) -> Vec<RawTable> {
        let mut tables = Vec::new();
        let mut counts = Vec::new();
        for result in self.results {
            match result.payload {
                DevicePayload::Records(table) => tables.push(table),
                DevicePayload::Count(n) => counts.push(vec![Value::String(result.device_id), Value::from(n)]),
            }
        }
        if !counts.is_empty() {
            let columns = COUNT_COLUMNS.iter().map(|c| c.to_string()).collect();
            // Every row has exactly two cells.
            if let Ok(table) = RawTable::new(columns, counts) {
                tables.push(table.with_source("vectronics:count"));
            }
        }
        tables
    }
}

/// Client for the Vectronics collar API.
///
/// One GET per device on `/v2/collar/{id}/{type}[/count]`, authenticated by
/// the device's `collarkey` query parameter. No retries: a failed device is
/// reported and the others carry on.
#[derive(Debug, Clone)]
pub struct ApiCallVectronics {
    client: ApiClient,
}

impl ApiCallVectronics {
    pub fn new(config: &VectronicsConfig) -> Result<Self> {
        let options = ClientOptions {
            timeout: config.timeout(),
            cookie_store: false,
        };
        Ok(Self {
            client: ApiClient::new(&config.base_url, &options)?,
        })
    }

    /// Builds the request URL for one device.
    ///
    /// The device id is a path segment and gets percent-encoded. The key and
    /// cursor go in the query string.
    pub fn request_url(
        &self,
        key: &KeyRecord,
        data_type: DataTypeSelector,
        count_only: bool,
        cursor: &FetchCursor,
    ) -> Result<Url> {
        let mut url = self.client.base_url().clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CollarError::Config(format!("base URL {} cannot take a path", self.client.base_url())))?;
            segments
                .pop_if_empty()
                .extend(["v2", "collar", key.device_id.as_str(), data_type.path_segment()]);
            if count_only {
                segments.push("count");
            }
        }
        {
            let mut query = url.query_pairs_mut();
            query.clear().append_pair("collarkey", &key.credential);
            for (name, value) in cursor.query_pairs() {
                query.append_pair(name, &value);
            }
        }
        Ok(url)
    }

    /// Fetches every device in `keys`.
    ///
    /// # Errors
    /// Only [`CollarError::Arity`], before any request is made, when a
    /// per-device cursor list does not match the number of keys. Failures of
    /// single devices land in [`VectronicsBatch::failed`].
    pub async fn fetch(
        &self,
        keys: &[KeyRecord],
        data_type: DataTypeSelector,
        count_only: bool,
        cursors: &CursorSpec,
    ) -> Result<VectronicsBatch> {
        let cursors = cursors.resolve(keys.len())?;
        let jobs = keys.iter().cloned().zip(cursors).collect();
        Ok(self.fetch_each(jobs, data_type, count_only).await)
    }

    /// Fetches pre-paired key and cursor jobs.
    pub async fn fetch_each(
        &self,
        jobs: Vec<(KeyRecord, FetchCursor)>,
        data_type: DataTypeSelector,
        count_only: bool,
    ) -> VectronicsBatch {
        info!(devices = jobs.len(), %data_type, count_only, "Fetching Vectronics data");

        let outcomes: Vec<(String, Result<DevicePayload>)> = stream::iter(jobs)
            .map(|(key, cursor)| async move {
                let outcome = self.fetch_device(&key, data_type, count_only, &cursor).await;
                (key.device_id, outcome)
            })
            .buffered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await;

        let mut batch = VectronicsBatch::default();
        for (device_id, outcome) in outcomes {
            match outcome {
                Ok(payload) => batch.results.push(DeviceResult { device_id, payload }),
                Err(error) => {
                    warn!(%device_id, kind = error.kind(), %error, "Vectronics device failed");
                    batch.failed.push(ItemFailure::new(device_id, error));
                }
            }
        }
        info!(
            succeeded = batch.results.len(),
            failed = batch.failed.len(),
            "Vectronics fetch finished"
        );
        batch
    }

    /// Fetches one device.
    pub async fn fetch_device(
        &self,
        key: &KeyRecord,
        data_type: DataTypeSelector,
        count_only: bool,
        cursor: &FetchCursor,
    ) -> Result<DevicePayload> {
        let url = self.request_url(key, data_type, count_only, cursor)?;
        debug!(device_id = %key.device_id, url = %mask_url_secrets(&url), "Requesting device");

        let response = self.client.get(url).await.map_err(|e| CollarError::Transport {
            device_id: key.device_id.clone(),
            status: error_status(&e),
            message: describe_error(&e),
        })?;

        if !response.success {
            return Err(CollarError::Transport {
                device_id: key.device_id.clone(),
                status: Some(response.status),
                message: excerpt(&response.body),
            });
        }

        if count_only {
            parse_count(&response.body, &key.device_id).map(DevicePayload::Count)
        } else {
            parse_records(&response.body, &key.device_id).map(DevicePayload::Records)
        }
    }
}

/// Parses a JSON list of flat records into a table tagged with the device.
pub fn parse_records(body: &str, device_id: &str) -> Result<RawTable> {
    let value: Value = serde_json::from_str(body).map_err(|e| CollarError::parse(device_id, e))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(CollarError::parse(
                device_id,
                format!("expected a JSON list of records, got {}", json_kind(&other)),
            ))
        }
    };
    let records = items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(CollarError::parse(
                device_id,
                format!("expected record objects, got {}", json_kind(&other)),
            )),
        })
        .collect::<Result<Vec<Map<String, Value>>>>()?;
    Ok(RawTable::from_records(records).with_source(device_id))
}

/// Parses a count answer: a bare number, a numeric string or `{"count": n}`.
pub fn parse_count(body: &str, device_id: &str) -> Result<u64> {
    let value: Value = serde_json::from_str(body).map_err(|e| CollarError::parse(device_id, e))?;
    let count = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("count").and_then(Value::as_u64),
        _ => None,
    };
    count.ok_or_else(|| CollarError::parse(device_id, format!("not a count: {}", excerpt(body))))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    }
}
