use std::path::{Path, PathBuf};

use lib_collar::configs::CollarConfig;
use lib_collar::ingestors::{load, CsvFile, CsvOptions};
use lib_collar::sources::{fetch, fetch_normalized, CsvParams, FetchRequest, SourceKind};
use lib_collar::{default_rename, CollarError};
use serde_json::json;

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn legacy_export(serial: &str) -> String {
    let mut text = format!("Collar serial: {serial}\nExported: 2021-06-03\n");
    for i in 0..6 {
        text.push_str(&format!("note {i}\n"));
    }
    text.push_str("Fix Date,Latitude,Longitude\n");
    text.push_str("2021-06-01,46.5,7.4\n2021-06-02,46.6,7.5\n");
    text
}

#[test]
fn preamble_files_load_with_a_known_header_column() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.csv", &legacy_export("A1"));
    let b = write(dir.path(), "b.csv", &legacy_export("B2"));

    let options = CsvOptions {
        delimiter: None,
        header_column: Some("Latitude".to_string()),
    };
    let batch = load(&[a, b], &options).unwrap();
    assert!(batch.failed.is_empty());
    assert_eq!(batch.tables.len(), 2);
    for table in &batch.tables {
        assert_eq!(table.columns(), ["Fix Date", "Latitude", "Longitude"]);
        assert_eq!(table.len(), 2);
    }
}

#[test]
fn missing_header_column_fails_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(dir.path(), "good.csv", &legacy_export("A1"));
    let bad = write(dir.path(), "bad.csv", "just,some\nrandom,rows\n");

    let options = CsvOptions {
        delimiter: Some(b','),
        header_column: Some("Latitude".to_string()),
    };
    let batch = load(&[good, bad.clone()], &options).unwrap();
    assert_eq!(batch.tables.len(), 1);
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].item, bad.display().to_string());
    assert!(matches!(batch.failed[0].error, CollarError::HeaderNotFound { .. }));
}

#[test]
fn different_column_sets_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.csv", "id,lat\n1,2\n");
    let b = write(dir.path(), "b.csv", "id,lon\n1,2\n");

    let err = load(&[a, b], &CsvOptions::default()).unwrap_err();
    assert!(matches!(err, CollarError::SchemaMismatch { table_index: 1, .. }));
}

#[tokio::test]
async fn csv_dispatch_tags_and_merges_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "wolf.csv", &legacy_export("A1"));
    let b = write(dir.path(), "lynx.csv", &legacy_export("B2"));
    let missing = dir.path().join("missing.csv");

    let request = FetchRequest::Csv(CsvParams {
        files: vec![
            CsvFile::new(a).with_identifier("wolf-7"),
            CsvFile::new(missing).with_identifier("ghost"),
            CsvFile::new(b).with_identifier("lynx-2"),
        ],
        header_column: Some("Latitude".to_string()),
    });
    let config = CollarConfig::default();

    let outcome = fetch(&request, &config).await.unwrap();
    assert_eq!(outcome.kind, SourceKind::Csv);
    assert_eq!(outcome.tables.len(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert!(matches!(outcome.failed[0].error, CollarError::Io { .. }));

    let merged = fetch_normalized(&request, &config, default_rename).await.unwrap();
    assert_eq!(
        merged.table.columns(),
        ["fix_date", "latitude", "longitude", "identifier"]
    );
    assert_eq!(merged.table.len(), 4);
    assert_eq!(merged.table.rows()[0][3], json!("wolf-7"));
    assert_eq!(merged.table.rows()[3][3], json!("lynx-2"));
    assert_eq!(merged.table.provenance().len(), 2);
}

#[test]
fn tab_export_under_a_comma_heavy_preamble_loads() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = "Exported by ATS, version 2.1, site: Yellowstone, WY\n".repeat(8);
    text.push_str("id\tlat\tlon\ttime\n");
    text.push_str("1\t44.6\t-110.5\t2021-06-01 00:00\n2\t44.7\t-110.6\t2021-06-01 04:00\n");
    let path = write(dir.path(), "legacy.txt", &text);

    let options = CsvOptions {
        delimiter: None,
        header_column: Some("lat".to_string()),
    };
    let batch = load(&[path], &options).unwrap();
    assert!(batch.failed.is_empty());
    assert_eq!(batch.tables.len(), 1);
    assert_eq!(batch.tables[0].columns(), ["id", "lat", "lon", "time"]);
    assert_eq!(batch.tables[0].len(), 2);
}
