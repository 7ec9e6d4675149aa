//! HTTP server implementation

use crate::routes::{build_router, AppState, RouterOptions};
use crate::shutdown::ShutdownSignal;
use crate::RuntimeState;
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use panel_config::plugin::DEFAULT_REQUEST_TIMEOUT;
use panel_config::{load_plugin_config, Config, TlsConfig};
use panel_core::{Error, Result};
use panel_secrets::SecretWatcher;
use panel_tls::{
    MinTlsVersion, ReloadController, ReloadHandle, ReloadSettings, TlsAcceptor, TlsConfigProvider,
    TlsError,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// HTTP(S) server for the console plugin
pub struct Server {
    config: Config,
    router: Router,
    connection_timeout: Duration,
    tls: Option<TlsAcceptor>,
    reload_handle: Option<ReloadHandle>,
    reload_controller: Mutex<Option<ReloadController>>,
    secret_watcher: Mutex<Option<SecretWatcher>>,
    state: Arc<RwLock<RuntimeState>>,
    shutdown: ShutdownSignal,
    active_connections: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("connection_timeout", &self.connection_timeout)
            .field("tls", &self.tls.is_some())
            .field("active_connections", &self.active_connections)
            .finish()
    }
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Get the current state
    pub async fn state(&self) -> RuntimeState {
        *self.state.read().await
    }

    /// Get listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.server.listen
    }

    /// Whether connections are served over TLS
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Certificate reload status, when TLS is enabled
    pub fn reload_handle(&self) -> Option<ReloadHandle> {
        self.reload_handle.clone()
    }

    /// Time allowed for a TLS handshake or for a request head to arrive
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Number of open connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr()).await.map_err(|e| {
            Error::Runtime(format!("Failed to bind to {}: {}", self.listen_addr(), e))
        })?;

        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != RuntimeState::Initializing {
                return Err(Error::Runtime("server already started".to_string()));
            }
            *state = RuntimeState::Running;
        }

        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Runtime(format!("Failed to read listen address: {e}")))?;
        let cancel = self.shutdown.token();

        let mut background: Vec<JoinHandle<()>> = Vec::new();
        if let Some(controller) = self.reload_controller.lock().await.take() {
            background.push(tokio::spawn(controller.run(self.shutdown.child_token())));
        }
        if let Some(watcher) = self.secret_watcher.lock().await.take() {
            background.push(tokio::spawn(watcher.run(self.shutdown.child_token())));
        }

        if self.tls.is_some() {
            tracing::info!(listen = %local_addr, "Listening on https://{}", local_addr);
        } else {
            tracing::info!(listen = %local_addr, "Listening on http://{}", local_addr);
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        tracing::trace!(peer = %peer, "Accepted connection");
                        self.spawn_connection(stream, peer, cancel.clone());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::ShuttingDown;
        }

        let shutdown_timeout = self.config.server.shutdown_timeout;
        let start = std::time::Instant::now();

        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Waiting for open connections to complete"
        );

        loop {
            let active = self.active_connections();

            if active == 0 {
                tracing::info!("All connections closed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= shutdown_timeout {
                tracing::warn!(
                    active_connections = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tracing::debug!(
                active_connections = active,
                elapsed_ms = start.elapsed().as_millis(),
                "Waiting for open connections to complete"
            );

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for task in background {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::Stopped;
        }

        tracing::info!(
            shutdown_duration_ms = start.elapsed().as_millis(),
            "Server stopped"
        );

        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let router = self.router.clone();
        let tls = self.tls.clone();
        let timeout = self.connection_timeout;
        let guard = ConnectionGuard::new(Arc::clone(&self.active_connections));

        tokio::spawn(async move {
            let _guard = guard;

            match tls {
                Some(acceptor) => {
                    let handshake = tokio::select! {
                        result = tokio::time::timeout(timeout, acceptor.accept(stream)) => result,
                        _ = cancel.cancelled() => return,
                    };
                    match handshake {
                        Ok(Ok(tls_stream)) => {
                            serve_connection(tls_stream, router, timeout, cancel).await
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(peer = %peer, error = %e, "TLS handshake failed")
                        }
                        Err(_) => tracing::debug!(
                            peer = %peer,
                            timeout_ms = timeout.as_millis(),
                            "TLS handshake timed out"
                        ),
                    }
                }
                None => serve_connection(stream, router, timeout, cancel).await,
            }
        });
    }
}

/// Serve HTTP/1.1 on one connection, finishing the in-flight request on
/// shutdown.
///
/// A connection whose next request head does not arrive within
/// `header_timeout` is closed, which also bounds idle keep-alive.
async fn serve_connection<IO>(
    io: IO,
    router: Router,
    header_timeout: Duration,
    cancel: CancellationToken,
) where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(router);
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout);
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "HTTP connection error");
            }
        }
        _ = cancel.cancelled() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "HTTP connection error during shutdown");
            }
        }
    }
}

/// Counts a connection as open for as long as it lives
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server builder
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: Option<Config>,
    secret_watcher: Option<SecretWatcher>,
    access_log: bool,
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Run a secret watch alongside the server
    pub fn secret_watcher(mut self, watcher: SecretWatcher) -> Self {
        self.secret_watcher = Some(watcher);
        self
    }

    /// Log every request
    pub fn access_log(mut self, enable: bool) -> Self {
        self.access_log = enable;
        self
    }

    /// Build the server.
    ///
    /// With TLS enabled the certificate pair is loaded and validated here, so
    /// an unusable pair fails the build before any socket is bound.
    pub fn build(self) -> Result<Server> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("config is required".to_string()))?;

        let plugin_config = load_plugin_config(config.server.plugin_config_path.as_deref());
        let options = RouterOptions {
            request_timeout: plugin_config.request_timeout(),
            access_log: self.access_log,
        };

        let app_state = Arc::new(AppState {
            features: config.server.features.clone(),
            static_path: config.server.static_path.clone(),
            plugin_config,
        });
        let router = build_router(app_state, &options);
        let connection_timeout = options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let (tls, reload_controller) = match config.tls.as_ref() {
            Some(tls) if tls.is_enabled() => {
                let (acceptor, controller) = init_tls(tls)?;
                (Some(acceptor), Some(controller))
            }
            Some(_) => {
                tracing::warn!(
                    "Only one of the certificate and key files is set, serving plain HTTP"
                );
                (None, None)
            }
            None => (None, None),
        };
        let reload_handle = reload_controller.as_ref().map(ReloadController::handle);

        tracing::info!(
            listen = %config.server.listen,
            static_path = %config.server.static_path.display(),
            features = %config.server.features,
            request_timeout = ?options.request_timeout,
            connection_timeout = ?connection_timeout,
            tls = tls.is_some(),
            secret_watch = self.secret_watcher.is_some(),
            "Server components initialized"
        );

        Ok(Server {
            config,
            router,
            connection_timeout,
            tls,
            reload_handle,
            reload_controller: Mutex::new(reload_controller),
            secret_watcher: Mutex::new(self.secret_watcher),
            state: Arc::new(RwLock::new(RuntimeState::Initializing)),
            shutdown: ShutdownSignal::new(),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }
}

fn init_tls(tls: &TlsConfig) -> Result<(TlsAcceptor, ReloadController)> {
    let min_version: MinTlsVersion = tls.min_tls_version.parse()?;
    let settings = ReloadSettings::new(&tls.cert_file, &tls.key_file)
        .min_tls_version(min_version)
        .poll_interval(tls.reload_interval)
        .debounce(tls.reload_debounce);
    settings.validate()?;

    let controller = ReloadController::initialize(settings).map_err(TlsError::from)?;
    let provider = TlsConfigProvider::new(controller.state(), min_version);
    let acceptor = TlsAcceptor::new(provider)?;

    tracing::info!(
        cert_file = %tls.cert_file,
        min_tls = %min_version,
        "HTTPS enabled"
    );

    Ok((acceptor, controller))
}
