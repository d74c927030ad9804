//! Whole-service test: start on an ephemeral port, let the scheduler load a
//! snapshot from a mock mirror, query over HTTP, then shut down.

mod helpers;

use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{gzip, SNAPSHOT_CSV};
use ip_info::{serve_with, Config};

#[tokio::test]
async fn test_service_refreshes_serves_and_stops() {
    let mirror = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(SNAPSHOT_CSV)))
        .mount(&mirror)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        db_path: dir.path().join("ip_info.db"),
        snapshot_url: format!("{}/{{year}}-{{month}}.csv.gz", mirror.uri()),
        enable_limiter: true,
        rate_limit: 100,
        ..Config::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    let service = tokio::spawn(serve_with(config, listener, cancel.clone()));

    let client = reqwest::Client::new();
    let health = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "ok");

    // The first refresh runs about a second after startup
    let mut located = None;
    for _ in 0..50 {
        let response = client
            .get(format!("{base}/ip-info?ip=8.8.8.8"))
            .send()
            .await
            .unwrap();
        if response.status() == reqwest::StatusCode::OK {
            located = Some(response.json::<serde_json::Value>().await.unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let json = located.expect("dataset should be loaded by the scheduler");
    assert_eq!(json["content"]["city"], "Mountain View");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), service)
        .await
        .expect("service should stop after cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_invalid_config_fails_startup() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db_path: dir.path().join("ip_info.db"),
        snapshot_url: "https://mirror.invalid/latest.csv.gz".to_string(),
        ..Config::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let err = serve_with(config, listener, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("{year}"));
}
