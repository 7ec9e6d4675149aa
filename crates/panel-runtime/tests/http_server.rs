//! Integration tests for the plain HTTP server

use panel_config::ConfigBuilder;
use panel_core::FeatureFlags;
use panel_runtime::{RuntimeState, Server, ServerBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Running {
    server: Arc<Server>,
    addr: SocketAddr,
    task: JoinHandle<panel_core::Result<()>>,
    _static_dir: tempfile::TempDir,
}

async fn start(plugin_config: Option<&str>) -> Running {
    let static_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        static_dir.path().join("plugin-manifest.json"),
        r#"{"name":"troubleshooting-panel-console-plugin"}"#,
    )
    .unwrap();
    std::fs::write(static_dir.path().join("plugin-entry.js"), "entry();").unwrap();

    let mut builder = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .static_path(static_dir.path())
        .features(FeatureFlags::parse("korrel8r"))
        .shutdown_timeout(Duration::from_secs(2));
    if let Some(content) = plugin_config {
        let path = static_dir.path().join("plugin-config.yaml");
        std::fs::write(&path, content).unwrap();
        builder = builder.plugin_config_path(path);
    }

    let server = Arc::new(
        ServerBuilder::new()
            .config(builder.build().unwrap())
            .build()
            .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run_with_listener(listener).await }
    });

    Running {
        server,
        addr,
        task,
        _static_dir: static_dir,
    }
}

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_routes_over_http() {
    let running = start(Some("timeout: 45s\n")).await;

    let health = get(running.addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200 OK"));
    assert!(health.to_lowercase().contains("access-control-allow-origin: *"));
    assert!(health.ends_with("ok"));

    // health and config match by path prefix
    assert!(get(running.addr, "/healthz").await.ends_with("ok"));
    assert!(get(running.addr, "/config.json")
        .await
        .ends_with(r#"{"timeout":45.0}"#));

    let features = get(running.addr, "/features").await;
    assert!(features.ends_with(r#"{"korrel8r":true}"#));

    let config = get(running.addr, "/config").await;
    assert!(config.ends_with(r#"{"timeout":45.0}"#));

    let entry = get(running.addr, "/plugin-entry.js").await;
    assert!(entry
        .to_lowercase()
        .contains("cache-control: no-cache, no-store, must-revalidate"));

    running.server.shutdown_signal().trigger();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_invalid_plugin_config() {
    let running = start(Some("timeout: [not, a, duration]\n")).await;

    let config = get(running.addr, "/config").await;
    assert!(config.starts_with("HTTP/1.1 500"));
    assert!(config.ends_with("unable to unmarshall config data"));

    running.server.shutdown_signal().trigger();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lifecycle_states() {
    let running = start(None).await;

    // wait for the accept loop
    let _ = get(running.addr, "/health").await;
    assert_eq!(running.server.state().await, RuntimeState::Running);

    running.server.shutdown_signal().trigger();
    running.task.await.unwrap().unwrap();
    assert_eq!(running.server.state().await, RuntimeState::Stopped);
    assert_eq!(running.server.active_connections(), 0);

    assert!(TcpStream::connect(running.addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_finishes_open_keepalive_connection() {
    let running = start(None).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200 OK"));
    assert_eq!(running.server.active_connections(), 1);

    running.server.shutdown_signal().trigger();
    tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // the idle keep-alive connection was closed by the server
    let n = stream.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let running = start(None).await;
    let _ = get(running.addr, "/health").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    assert!(running.server.run_with_listener(listener).await.is_err());

    running.server.shutdown_signal().trigger();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stalled_request_head_is_closed() {
    let running = start(Some("timeout: 500ms\n")).await;
    assert_eq!(
        running.server.connection_timeout(),
        Duration::from_millis(500)
    );

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: loc")
        .await
        .unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("stalled connection was not closed")
        .ok();
    assert!(!String::from_utf8_lossy(&response).contains("200 OK"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while running.server.active_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection still counted as open");

    running.server.shutdown_signal().trigger();
    running.task.await.unwrap().unwrap();
}
