//! Integration tests for reqmeter.
//!
//! These run the full host: listener, dispatcher, scrape router, metrics
//! hook and upstream forwarding against a stub HTTP server.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use reqmeter::AppState;
use reqmeter::config::{Config, parse_config};
use reqmeter::frontend::FrontendListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Helper to create a simple HTTP server.
fn start_http_server(response_body: &'static str) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let request_count = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&request_count);

    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            count.fetch_add(1, Ordering::SeqCst);

            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Upstream: stub\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (addr, request_count)
}

/// Address nothing is listening on.
fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn host_config(upstream: SocketAddr) -> Config {
    parse_config(&format!(
        r#"
server:
  name: http
  listen: "127.0.0.1:0"
  host: it-host

metrics:
  path: /metrics
  sweep_interval: 1s

upstream:
  name: app
  address: "{upstream}"
  connect_timeout: 2s
"#
    ))
    .expect("valid config")
}

/// Start the host and return its address and state.
async fn start_host(upstream: SocketAddr) -> (SocketAddr, AppState) {
    let state = AppState::new(host_config(upstream)).expect("state");
    let listener = FrontendListener::bind(&state).await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(state.shutdown().subscribe()));
    (addr, state)
}

/// Send one request and read the whole response.
async fn http_request(addr: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request =
        format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_application_requests_pass_through() {
    let (upstream, upstream_hits) = start_http_server("hello from app");
    let (addr, state) = start_host(upstream).await;

    let response = http_request(addr, "GET", "/api/users").await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.to_lowercase().contains("x-upstream: stub"));
    assert!(response.ends_with("hello from app"));
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.hook().pending(), 0);

    state.trigger_shutdown();
}

#[tokio::test]
async fn test_metrics_path_is_served_in_band() {
    let (upstream, upstream_hits) = start_http_server("ok");
    let (addr, state) = start_host(upstream).await;

    http_request(addr, "GET", "/api/users").await;
    http_request(addr, "GET", "/").await;
    let scrape = http_request(addr, "GET", "/metrics").await;

    assert!(scrape.starts_with("HTTP/1.1 200 OK"), "{scrape}");
    assert!(scrape.contains("text/plain; version=0.0.4; charset=utf-8"));
    assert!(scrape.contains(
        r#"req_current_count_total{server="it-host",driver="http",endpoint="app",status="succ"} 2"#
    ));
    assert!(scrape.contains(
        r#"req_latency_seconds_count{server="it-host",driver="http",endpoint="app",status="succ"} 2"#
    ));
    assert!(scrape.contains(r#"worker_thread_count{host="it-host"} 1"#));
    assert!(scrape.contains("splits_thread_count"));

    // The scrape never reached the application.
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 2);

    // The scrape itself is recorded once it completes.
    let second = http_request(addr, "GET", "/metrics/").await;
    assert!(second.contains(
        r#"req_current_count_total{server="it-host",driver="http",endpoint="metrics",status="succ"} 1"#
    ));

    state.trigger_shutdown();
}

#[tokio::test]
async fn test_metrics_endpoint_rejects_post() {
    let (upstream, upstream_hits) = start_http_server("ok");
    let (addr, state) = start_host(upstream).await;

    let response = http_request(addr, "POST", "/metrics").await;

    assert!(response.starts_with("HTTP/1.1 405"), "{response}");
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 0);

    state.trigger_shutdown();
}

#[tokio::test]
async fn test_upstream_failure_is_recorded_as_fail() {
    let (addr, state) = start_host(closed_port()).await;

    let response = http_request(addr, "GET", "/checkout").await;
    assert!(response.starts_with("HTTP/1.1 502"), "{response}");

    // The metrics path keeps working while the application is down.
    let scrape = http_request(addr, "GET", "/metrics").await;
    assert!(scrape.starts_with("HTTP/1.1 200 OK"), "{scrape}");
    assert!(scrape.contains(
        r#"req_current_count_total{server="it-host",driver="http",endpoint="app",status="fail"} 1"#
    ));
    assert_eq!(state.hook().pending(), 0);

    state.trigger_shutdown();
}

#[tokio::test]
async fn test_concurrent_clients_drain_pending_timers() {
    let (upstream, upstream_hits) = start_http_server("ok");
    let (addr, state) = start_host(upstream).await;

    let clients: Vec<_> = (0..20)
        .map(|i| {
            tokio::spawn(async move { http_request(addr, "GET", &format!("/items/{i}")).await })
        })
        .collect();
    for client in clients {
        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }

    assert_eq!(upstream_hits.load(Ordering::SeqCst), 20);
    assert_eq!(state.hook().pending(), 0);
    assert_eq!(
        state
            .hook()
            .completed_or_create("http", "app", reqmeter::metrics::Outcome::Succ),
        20
    );

    state.trigger_shutdown();
}

#[test]
fn test_config_file_loading() {
    use reqmeter::config::load_config;
    use std::io::Write as IoWrite;
    use tempfile::NamedTempFile;

    let config_content = r#"
global:
  log_level: debug
  log_format: pretty

server:
  name: grpc-gateway
  listen: "0.0.0.0:8080"
  host: node-7

metrics:
  path: /internal/metrics
  latency_buckets: [0.01, 0.1, 1.0]
  pending_timeout: 10m

upstream:
  address: "127.0.0.1:9000"
"#;

    let mut temp_file = NamedTempFile::new().expect("failed to create temp file");
    temp_file
        .write_all(config_content.as_bytes())
        .expect("failed to write config");

    let config = load_config(temp_file.path()).expect("failed to load config");

    assert_eq!(config.server.name, "grpc-gateway");
    assert_eq!(config.server.host, "node-7");
    assert_eq!(config.metrics.path, "/internal/metrics");
    assert_eq!(config.metrics.latency_buckets, vec![0.01, 0.1, 1.0]);
    assert_eq!(config.metrics.pending_timeout, Duration::from_secs(600));
}

#[test]
fn test_config_validation_rejects_bad_buckets() {
    let result = parse_config(
        r#"
metrics:
  latency_buckets: [1.0, 0.5]
upstream:
  address: "127.0.0.1:9000"
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_lifecycle_through_public_api() {
    use reqmeter::frontend::TaskPools;
    use reqmeter::metrics::{
        HookSettings, InstrumentRegistry, ManualClock, MetricsHook, Outcome, RegistryError,
        RequestDescriptor, RequestLifecycle,
    };
    use reqmeter::util::RequestId;

    let pools = TaskPools::new();
    let clock = Arc::new(ManualClock::new());
    let mut registry = InstrumentRegistry::new();
    let hook = MetricsHook::setup(&mut registry, HookSettings::default(), pools.clone())
        .unwrap()
        .with_clock(clock.clone());

    let _bg = pools.enter_background();
    let _workers: Vec<_> = (0..3).map(|_| pools.enter_worker()).collect();

    let first = RequestDescriptor::new(RequestId::next(), "http", "app");
    let second = RequestDescriptor::new(RequestId::next(), "http", "app");
    hook.on_start(&first);
    assert_eq!(hook.thread_gauges_or_create(), (1, 3));

    clock.advance(Duration::from_millis(40));
    hook.on_start(&second);
    clock.advance(Duration::from_millis(10));

    assert_eq!(hook.finish(&second, Outcome::Fail), Ok(Duration::from_millis(10)));
    assert_eq!(hook.finish(&first, Outcome::Succ), Ok(Duration::from_millis(50)));
    assert!(hook.finish(&first, Outcome::Succ).is_err());
    assert_eq!(hook.pending(), 0);

    let err = MetricsHook::setup(&mut registry, HookSettings::default(), pools.clone())
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::Duplicate { .. }));
}
