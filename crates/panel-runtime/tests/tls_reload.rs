//! End-to-end certificate rotation over real TLS connections

use panel_config::{ConfigBuilder, TlsConfig};
use panel_core::Error;
use panel_runtime::{RuntimeState, Server, ServerBuilder};
use panel_tls::testing::{CertDir, TestPair};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

struct Running {
    server: Arc<Server>,
    addr: SocketAddr,
    task: JoinHandle<panel_core::Result<()>>,
    _static_dir: tempfile::TempDir,
}

impl Running {
    async fn stop(self) {
        self.server.shutdown_signal().trigger();
        self.task.await.unwrap().unwrap();
        assert_eq!(self.server.state().await, RuntimeState::Stopped);
    }
}

fn tls_config(certs: &CertDir) -> TlsConfig {
    TlsConfig {
        reload_interval: Duration::from_millis(200),
        reload_debounce: Duration::from_millis(50),
        ..TlsConfig::new(
            certs.cert_path().to_string_lossy(),
            certs.key_path().to_string_lossy(),
        )
    }
}

async fn start(certs: &CertDir) -> Running {
    start_with(certs, None).await
}

async fn start_with(certs: &CertDir, plugin_config: Option<&str>) -> Running {
    let static_dir = tempfile::tempdir().unwrap();
    let mut builder = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .static_path(static_dir.path())
        .tls(tls_config(certs))
        .shutdown_timeout(Duration::from_secs(2));
    if let Some(content) = plugin_config {
        let path = static_dir.path().join("plugin-config.yaml");
        std::fs::write(&path, content).unwrap();
        builder = builder.plugin_config_path(path);
    }
    let config = builder.build().unwrap();

    let server = Arc::new(ServerBuilder::new().config(config).build().unwrap());
    assert!(server.tls_enabled());

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

fn connector(trusted: &[&TestPair]) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for pair in trusted {
        roots.add(pair.cert_der()).unwrap();
    }
    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
    // a resumed session would not present the current certificate
    config.resumption = rustls::client::Resumption::disabled();
    TlsConnector::from(Arc::new(config))
}

async fn connect(connector: &TlsConnector, addr: SocketAddr) -> TlsStream<TcpStream> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    connector.connect(name, tcp).await.unwrap()
}

fn presented(stream: &TlsStream<TcpStream>) -> Vec<u8> {
    let (_, conn) = stream.get_ref();
    conn.peer_certificates().unwrap()[0].as_ref().to_vec()
}

/// Send `GET /health` on a kept-alive connection and return the response
async fn health(stream: &mut TlsStream<TcpStream>) -> String {
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    while !response.ends_with(b"\r\n\r\nok") {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed mid-response");
        response.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(response).unwrap()
}

/// Open new connections until the server presents `expected`
async fn wait_for_certificate(connector: &TlsConnector, addr: SocketAddr, expected: &[u8]) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let stream = connect(connector, addr).await;
            if presented(&stream) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("certificate was not rotated in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rotation_is_picked_up_without_restart() {
    let a = TestPair::generate("a.local");
    let b = TestPair::generate("b.local");
    let certs = CertDir::with_pair(&a);
    let running = start(&certs).await;
    let connector = connector(&[&a, &b]);

    let mut old = connect(&connector, running.addr).await;
    assert_eq!(presented(&old), a.cert_der().as_ref());
    assert!(health(&mut old).await.starts_with("HTTP/1.1 200 OK"));

    certs.install(&b);
    wait_for_certificate(&connector, running.addr, b.cert_der().as_ref()).await;

    // connections made before the rotation keep working
    assert!(health(&mut old).await.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(presented(&old), a.cert_der().as_ref());

    let stats = running.server.reload_handle().unwrap().stats();
    assert!(stats.reloads >= 1);
    drop(old);

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_rotation_keeps_serving() {
    let a = TestPair::generate("a.local");
    let b = TestPair::generate("b.local");
    let certs = CertDir::with_pair(&a);
    let running = start(&certs).await;
    let connector = connector(&[&a, &b]);

    certs.write_cert("not a certificate");
    tokio::time::sleep(Duration::from_millis(600)).await;

    let mut stream = connect(&connector, running.addr).await;
    assert_eq!(presented(&stream), a.cert_der().as_ref());
    assert!(health(&mut stream).await.starts_with("HTTP/1.1 200 OK"));
    drop(stream);

    certs.install(&b);
    wait_for_certificate(&connector, running.addr, b.cert_der().as_ref()).await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_client_is_dropped_after_timeout() {
    let a = TestPair::generate("a.local");
    let certs = CertDir::with_pair(&a);
    let running = start_with(&certs, Some("timeout: 500ms\n")).await;

    // never sends a ClientHello
    let mut silent = TcpStream::connect(running.addr).await.unwrap();
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), silent.read(&mut buf))
        .await
        .expect("handshake was not timed out");
    assert!(matches!(read, Ok(0) | Err(_)));

    tokio::time::timeout(Duration::from_secs(5), async {
        while running.server.active_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection still counted as open");

    // the listener keeps serving handshaking clients
    let connector = connector(&[&a]);
    let mut stream = connect(&connector, running.addr).await;
    assert!(health(&mut stream).await.starts_with("HTTP/1.1 200 OK"));
    drop(stream);

    running.stop().await;
}

#[test]
fn test_missing_key_fails_before_binding() {
    let a = TestPair::generate("a.local");
    let certs = CertDir::with_pair(&a);
    certs.remove_key();

    let static_dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .static_path(static_dir.path())
        .tls(tls_config(&certs))
        .build()
        .unwrap();

    let err = ServerBuilder::new().config(config).build().unwrap_err();
    assert!(matches!(err, Error::Tls(_)));
}

#[test]
fn test_mismatched_pair_fails_before_binding() {
    let a = TestPair::generate("a.local");
    let b = TestPair::generate("b.local");
    let certs = CertDir::with_pair(&a);
    certs.write_key(&b.key_pem);

    let static_dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .static_path(static_dir.path())
        .tls(tls_config(&certs))
        .build()
        .unwrap();

    assert!(ServerBuilder::new().config(config).build().is_err());
}
