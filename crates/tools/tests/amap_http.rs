//! The Amap weather client against a local HTTP server.

mod common;

use common::*;
use personax_core::error::ResourceError;
use personax_tools::weather::RetryPolicy;
use personax_tools::{AmapWeatherService, WeatherService};
use std::time::Duration;

const LIVE: &str = r#"{
    "status": "1",
    "count": "1",
    "info": "OK",
    "infocode": "10000",
    "lives": [{
        "province": "北京",
        "city": "北京市",
        "adcode": "110000",
        "weather": "晴",
        "temperature": "15",
        "winddirection": "北",
        "windpower": "≤3",
        "humidity": "45",
        "reporttime": "2024-05-01 12:00:00"
    }]
}"#;

fn service(server: &MockServer, max_retries: u32) -> AmapWeatherService {
    let retry = RetryPolicy {
        max_retries,
        wait: Duration::from_millis(1),
    };
    AmapWeatherService::new("amap-key", Duration::from_secs(5), retry)
        .unwrap()
        .with_base_url(server.url())
}

#[tokio::test]
async fn live_weather_is_fetched() {
    let server = MockServer::start(vec![respond("200 OK", LIVE)]).await;

    let info = service(&server, 3).fetch("110000").await.unwrap();
    assert_eq!(info.address, "北京 北京市");
    assert_eq!(info.condition, "晴");
    assert_eq!(info.temperature, "15");
    assert_eq!(info.windpower, "≤3");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request_line = requests[0].lines().next().unwrap();
    assert!(request_line.starts_with("GET /weatherInfo?"));
    assert!(request_line.contains("key=amap-key"));
    assert!(request_line.contains("city=110000"));
    assert!(request_line.contains("extensions=base"));
    assert!(request_line.contains("output=JSON"));
}

#[tokio::test]
async fn server_error_is_retried() {
    let server = MockServer::start(vec![respond("503 Service Unavailable", "{}"), respond("200 OK", LIVE)]).await;

    let info = service(&server, 3).fetch("110000").await.unwrap();
    assert_eq!(info.temperature, "15");
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn retries_stop_at_the_limit() {
    let server = MockServer::start(vec![
        respond("503 Service Unavailable", "{}"),
        respond("503 Service Unavailable", "{}"),
        respond("503 Service Unavailable", "{}"),
    ])
    .await;

    let err = service(&server, 2).fetch("110000").await.unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 503, .. }));
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start(vec![respond("400 Bad Request", "{}"), respond("200 OK", LIVE)]).await;

    let err = service(&server, 3).fetch("110000").await.unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 400, .. }));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn api_rejection_is_not_retried() {
    let rejected = r#"{"status":"0","info":"INVALID_USER_KEY","infocode":"10001"}"#;
    let server = MockServer::start(vec![respond("200 OK", rejected), respond("200 OK", LIVE)]).await;

    let err = service(&server, 3).fetch("110000").await.unwrap_err();
    match err {
        ResourceError::Rejected(message) => assert!(message.contains("INVALID_USER_KEY")),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn empty_lives_is_no_data() {
    let empty = r#"{"status":"1","info":"OK","infocode":"10000","lives":[]}"#;
    let server = MockServer::start(vec![respond("200 OK", empty)]).await;

    let err = service(&server, 3).fetch("110000").await.unwrap_err();
    assert!(matches!(err, ResourceError::NoData(_)));
}
