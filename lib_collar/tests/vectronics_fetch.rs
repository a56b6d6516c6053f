use std::time::Duration;

use lib_collar::configs::{CollarConfig, VectronicsConfig};
use lib_collar::keys::KeyRecord;
use lib_collar::sources::{fetch_normalized, FetchRequest, VectronicsParams};
use lib_collar::vectronics::{
    ApiCallVectronics, CursorSpec, DataTypeSelector, DevicePayload, FetchCursor, ID_POSITION_COLUMN,
};
use lib_collar::{default_rename, CollarError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key(id: &str, credential: &str) -> KeyRecord {
    KeyRecord {
        device_id: id.to_string(),
        credential: credential.to_string(),
    }
}

fn api(server: &MockServer, timeout_secs: u64) -> ApiCallVectronics {
    ApiCallVectronics::new(&VectronicsConfig {
        base_url: server.uri(),
        timeout_secs,
    })
    .unwrap()
}

fn key_xml(id: &str, credential: &str) -> String {
    format!(r#"<?xml version="1.0"?><collarKeys><collar ID="{id}"><key>{credential}</key></collar></collarKeys>"#)
}

#[tokio::test]
async fn one_failing_device_does_not_sink_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/100/gps"))
        .and(query_param("collarkey", "K100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idPosition": 1, "latitude": 46.5, "longitude": 7.4},
            {"idPosition": 2, "latitude": 46.6, "longitude": 7.5}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/200/gps"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&server)
        .await;

    let batch = api(&server, 5)
        .fetch(
            &[key("100", "K100"), key("200", "K200")],
            DataTypeSelector::Position,
            false,
            &CursorSpec::default(),
        )
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 1);
    match batch.get("100") {
        Some(DevicePayload::Records(table)) => assert_eq!(table.len(), 2),
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].item, "200");
    assert!(matches!(
        batch.failed[0].error,
        CollarError::Transport { status: Some(500), .. }
    ));
}

#[tokio::test]
async fn timeouts_are_transport_errors_without_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/300/act"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let batch = api(&server, 1)
        .fetch(&[key("300", "K")], DataTypeSelector::Activity, false, &CursorSpec::default())
        .await
        .unwrap();

    assert!(batch.results.is_empty());
    assert!(matches!(
        batch.failed[0].error,
        CollarError::Transport { status: None, .. }
    ));
}

#[tokio::test]
async fn per_device_cursors_reach_their_own_requests() {
    let server = MockServer::start().await;
    for (id, after) in [("1", "10"), ("2", "20")] {
        Mock::given(method("GET"))
            .and(path(format!("/v2/collar/{id}/gps")))
            .and(query_param("afterIdPosition", after))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"idPosition": 99}])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let batch = api(&server, 5)
        .fetch(
            &[key("1", "A"), key("2", "B")],
            DataTypeSelector::Position,
            false,
            &CursorSpec::PerDevice(vec![FetchCursor::by_id(10), FetchCursor::by_id(20)]),
        )
        .await
        .unwrap();
    assert!(batch.failed.is_empty());
    assert_eq!(batch.results.len(), 2);
}

#[tokio::test]
async fn arity_mismatch_sends_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = api(&server, 5)
        .fetch(
            &[key("1", "A")],
            DataTypeSelector::Position,
            false,
            &CursorSpec::PerDevice(vec![FetchCursor::by_id(1), FetchCursor::by_id(2)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CollarError::Arity { cursors: 2, devices: 1 }));
}

#[tokio::test]
async fn count_mode_returns_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/5/mor/count"))
        .respond_with(ResponseTemplate::new(200).set_body_string("17"))
        .expect(1)
        .mount(&server)
        .await;

    let batch = api(&server, 5)
        .fetch(&[key("5", "K")], DataTypeSelector::Mortality, true, &CursorSpec::default())
        .await
        .unwrap();
    assert_eq!(batch.get("5"), Some(&DevicePayload::Count(17)));
}

#[tokio::test]
async fn key_files_to_normalized_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/100/gps"))
        .and(query_param("collarkey", "K100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idPosition": 5, "Acquisition Time": "2021-06-01T00:00:00", "latitude": 46.5}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/200/gps"))
        .and(query_param("collarkey", "K200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"latitude": 47.0, "idPosition": 9, "Acquisition Time": "2021-06-02T00:00:00"}
        ])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("100.keyx");
    let b = dir.path().join("200.keyx");
    let broken = dir.path().join("broken.keyx");
    std::fs::write(&a, key_xml("100", "K100")).unwrap();
    std::fs::write(&b, key_xml("200", "K200")).unwrap();
    std::fs::write(&broken, "<collarKeys/>").unwrap();

    let config = CollarConfig {
        vectronics: VectronicsConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        },
        ..CollarConfig::default()
    };
    let request = FetchRequest::Vectronics(VectronicsParams {
        key_paths: vec![a, broken.clone(), b],
        data_type: DataTypeSelector::Position,
        count_only: false,
        cursors: CursorSpec::default(),
    });

    let outcome = fetch_normalized(&request, &config, default_rename).await.unwrap();
    assert_eq!(outcome.table.columns(), ["idposition", "acquisition_time", "latitude"]);
    assert_eq!(outcome.table.len(), 2);
    assert_eq!(outcome.table.rows()[1], vec![json!(9), json!("2021-06-02T00:00:00"), json!(47.0)]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].item, broken.display().to_string());
    assert!(!outcome.all_failed());

    let resumed = FetchCursor::resume_from(&outcome.table, &default_rename(ID_POSITION_COLUMN));
    assert_eq!(resumed, Some(FetchCursor::by_id(9)));
}

#[tokio::test]
async fn device_with_nothing_new_is_no_data_not_a_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/100/gps"))
        .and(query_param("afterIdPosition", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idPosition": 11, "latitude": 46.5}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/200/gps"))
        .and(query_param("afterIdPosition", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("100.keyx");
    let b = dir.path().join("200.keyx");
    std::fs::write(&a, key_xml("100", "K100")).unwrap();
    std::fs::write(&b, key_xml("200", "K200")).unwrap();

    let config = CollarConfig {
        vectronics: VectronicsConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        },
        ..CollarConfig::default()
    };
    let request = FetchRequest::Vectronics(VectronicsParams {
        key_paths: vec![a, b],
        data_type: DataTypeSelector::Position,
        count_only: false,
        cursors: CursorSpec::Shared(FetchCursor::by_id(10)),
    });

    let outcome = fetch_normalized(&request, &config, default_rename).await.unwrap();
    assert!(outcome.failed.is_empty());
    assert!(!outcome.all_failed());
    assert_eq!(outcome.table.columns(), ["idposition", "latitude"]);
    assert_eq!(outcome.table.len(), 1);
    assert_eq!(
        outcome.table.provenance(),
        [(Some("100".to_string()), 1), (Some("200".to_string()), 0)]
    );
}

#[tokio::test]
async fn one_of_two_devices_timing_out_keeps_the_other() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/1/gps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"idPosition": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/collar/2/gps"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"idPosition": 2}]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let batch = api(&server, 1)
        .fetch(&[key("1", "A"), key("2", "B")], DataTypeSelector::Position, false, &CursorSpec::default())
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 1);
    assert!(batch.get("1").is_some());
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].item, "2");
    assert!(matches!(
        batch.failed[0].error,
        CollarError::Transport { status: None, .. }
    ));
    assert_eq!(batch.into_tables().len(), 1);
}
