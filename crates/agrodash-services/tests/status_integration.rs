//! Integration tests for the HTTP health probe and ServerStatusMonitor using wiremock.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use agrodash_core::{BackendConfig, ErrorCategory};
use agrodash_services::{
    Connectivity, HealthProbe, HttpHealthProbe, MonitorSettings, ServerStatusMonitor,
};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn monitor_for(base_url: &str, timeout: Duration) -> ServerStatusMonitor {
    let probe = HttpHealthProbe::new(base_url, "/Farm/All", timeout).unwrap();
    ServerStatusMonitor::new(Arc::new(probe), MonitorSettings::default())
}

/// A local port with nothing listening on it
fn closed_port_url() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn test_probe_hits_health_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Farm/All"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let probe =
        HttpHealthProbe::new(&mock_server.uri(), "/Farm/All", Duration::from_secs(5)).unwrap();
    assert_eq!(assert_ok!(probe.probe().await), 200);
}

#[tokio::test]
async fn test_not_found_means_online() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Farm/All"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let monitor = monitor_for(&mock_server.uri(), Duration::from_secs(5));
    let status = monitor.check_server_status().await;

    assert_eq!(status.connectivity, Connectivity::Online);
    assert_eq!(status.retry_count, 0);
    assert!(!status.is_initial_check);
}

#[tokio::test]
async fn test_unauthorized_means_online() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let monitor = monitor_for(&mock_server.uri(), Duration::from_secs(5));
    assert_eq!(monitor.check_server_status().await.is_online(), Some(true));
}

#[tokio::test]
async fn test_connection_refused_means_offline() {
    let monitor = monitor_for(&closed_port_url(), Duration::from_secs(5));

    let status = monitor.check_server_status().await;
    assert_eq!(status.connectivity, Connectivity::Offline);
    assert_eq!(status.retry_count, 1);

    let status = monitor.retry_connection().await;
    assert_eq!(status.retry_count, 2);
}

#[tokio::test]
async fn test_server_error_is_offline_without_counting() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Farm/All"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let monitor = monitor_for(&mock_server.uri(), Duration::from_secs(5));
    let status = monitor.check_server_status().await;

    assert_eq!(status.connectivity, Connectivity::Offline);
    assert_eq!(status.retry_count, 0);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let probe =
        HttpHealthProbe::new(&mock_server.uri(), "/Farm/All", Duration::from_millis(200)).unwrap();
    let failure = assert_err!(probe.probe().await);
    assert_eq!(agrodash_core::classify(&failure).category, ErrorCategory::Timeout);

    let monitor = ServerStatusMonitor::new(Arc::new(probe), MonitorSettings::default());
    let status = monitor.check_server_status().await;
    assert_eq!(status.connectivity, Connectivity::Offline);
    assert_eq!(status.retry_count, 1);
}

#[tokio::test]
async fn test_recovery_resets_retry_count() {
    let mock_server = MockServer::start().await;
    let monitor = monitor_for(&mock_server.uri(), Duration::from_millis(200));

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    monitor.check_server_status().await;
    monitor.check_server_status().await;
    assert_eq!(monitor.status().retry_count, 2);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let status = monitor.retry_connection().await;
    assert_eq!(status.connectivity, Connectivity::Online);
    assert_eq!(status.retry_count, 0);
}

#[tokio::test]
async fn test_from_config_polls_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Farm/All"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = BackendConfig {
        base_url: mock_server.uri(),
        ..BackendConfig::default()
    };
    let monitor = ServerStatusMonitor::from_config(&config).unwrap();
    let mut rx = monitor.subscribe();
    assert!(monitor.start());

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.borrow().connectivity, Connectivity::Online);
    monitor.stop();
}
