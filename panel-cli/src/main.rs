//! Console plugin backend CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use panel_config::{load_from_file, load_plugin_config, Config, ConfigBuilder, LoggingConfig};
use panel_core::FeatureFlags;
use panel_runtime::{ServerBuilder, SignalHandler};
use panel_secrets::SecretWatcher;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "plugin-backend")]
#[command(about = "Troubleshooting panel console plugin backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the plugin (start the server)
    Serve(ServeArgs),

    /// Validate configuration and, when TLS is enabled, the certificate pair
    Validate(ServeArgs),

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Server configuration file (YAML, TOML or JSON); flags override its values
    #[arg(short, long, env = "PLUGIN_BACKEND_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on [default: 9443]
    #[arg(long, env = "PLUGIN_BACKEND_PORT")]
    port: Option<u16>,

    /// TLS certificate file
    #[arg(long, env = "PLUGIN_BACKEND_TLS_CERT")]
    cert: Option<String>,

    /// TLS private key file
    #[arg(long, env = "PLUGIN_BACKEND_TLS_KEY")]
    key: Option<String>,

    /// Comma separated list of enabled features
    #[arg(long, env = "PLUGIN_BACKEND_FEATURES")]
    features: Option<String>,

    /// Directory holding the plugin build output
    #[arg(long, env = "PLUGIN_BACKEND_STATIC_PATH")]
    static_path: Option<PathBuf>,

    /// Plugin configuration file served under /config
    #[arg(long, env = "PLUGIN_BACKEND_PLUGIN_CONFIG_PATH")]
    plugin_config_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(short, long, env = "PLUGIN_BACKEND_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json) [default: text]
    #[arg(long, env = "PLUGIN_BACKEND_LOG_FORMAT")]
    log_format: Option<String>,

    /// Minimum TLS version (1.2, 1.3) [default: 1.2]
    #[arg(long, env = "PLUGIN_BACKEND_MIN_TLS_VERSION")]
    min_tls_version: Option<String>,

    /// Watch Kubernetes secrets and log their changes [default]
    #[arg(long, overrides_with = "no_watch_secrets")]
    watch_secrets: bool,

    /// Do not watch Kubernetes secrets
    #[arg(long, overrides_with = "watch_secrets")]
    no_watch_secrets: bool,

    /// Only watch secrets in this namespace
    #[arg(long, env = "PLUGIN_BACKEND_SECRETS_NAMESPACE")]
    secrets_namespace: Option<String>,
}

impl ServeArgs {
    /// Layer the flags over the configuration file (or defaults) and validate
    fn build_config(&self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => load_from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => Config::default(),
        };
        let mut builder = ConfigBuilder::from_config(base);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(path) = &self.static_path {
            builder = builder.static_path(path);
        }
        if let Some(path) = &self.plugin_config_path {
            builder = builder.plugin_config_path(path);
        }
        if let Some(features) = &self.features {
            builder = builder.features(FeatureFlags::parse(features));
        }
        if let Some((cert, key)) = self.tls_files() {
            builder = builder.tls_files(cert, key);
        }
        if let Some(version) = &self.min_tls_version {
            builder = builder.min_tls_version(version);
        }
        if let Some(enabled) = self.watch_secrets() {
            builder = builder.watch_secrets(enabled);
        }
        if let Some(namespace) = &self.secrets_namespace {
            builder = builder.secrets_namespace(namespace);
        }
        if let Some(level) = &self.log_level {
            builder = builder.log_level(level);
        }
        if let Some(format) = &self.log_format {
            builder = builder.log_format(format);
        }

        Ok(builder.build()?)
    }

    /// Certificate and key paths, when both are given
    fn tls_files(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.cert), non_empty(&self.key)) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    /// Exactly one of `--cert` and `--key` was given
    fn partial_tls(&self) -> bool {
        non_empty(&self.cert).is_some() != non_empty(&self.key).is_some()
    }

    fn watch_secrets(&self) -> Option<bool> {
        if self.no_watch_secrets {
            Some(false)
        } else if self.watch_secrets {
            Some(true)
        } else {
            None
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Validate(args) => validate(args),
        Commands::Version => {
            println!("Troubleshooting panel plugin backend");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.build_config()?;
    init_tracing(&config.logging)?;

    // kube and the TLS listener share one process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    if args.partial_tls() {
        tracing::warn!("Both --cert and --key are required for TLS, serving plain HTTP");
    }

    tracing::info!(
        listen = %config.server.listen,
        static_path = %config.server.static_path.display(),
        features = %config.server.features,
        "Starting plugin backend"
    );

    let access_log = config.logging.level.eq_ignore_ascii_case("trace");
    let mut builder = ServerBuilder::new()
        .config(config.clone())
        .access_log(access_log);

    if config.secrets.enabled {
        let watcher = SecretWatcher::new(&config.secrets)
            .await
            .context("secret watch is enabled but no Kubernetes client is available")?;
        builder = builder.secret_watcher(watcher);
    }

    let server = builder.build()?;

    let shutdown_signal = server.shutdown_signal();
    tokio::spawn(async move {
        let handler = SignalHandler::new(shutdown_signal);
        handler.run().await;
    });

    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn validate(args: ServeArgs) -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = match args.build_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("✗ Configuration validation failed: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("✓ Configuration is valid");
    tracing::info!("  Listen: {}", config.server.listen);
    tracing::info!("  Static path: {}", config.server.static_path.display());
    tracing::info!("  Features: {}", config.server.features);
    tracing::info!(
        "  Plugin config: {:?}",
        load_plugin_config(config.server.plugin_config_path.as_deref())
    );

    let Some(tls) = config.tls_enabled() else {
        if args.partial_tls() {
            tracing::warn!("  TLS: disabled, both --cert and --key are required");
        } else {
            tracing::info!("  TLS: disabled");
        }
        return Ok(());
    };

    let cert = std::fs::read(&tls.cert_file)
        .with_context(|| format!("failed to read certificate {}", tls.cert_file))?;
    let key = std::fs::read(&tls.key_file)
        .with_context(|| format!("failed to read key {}", tls.key_file))?;

    match panel_tls::validate(&cert, &key) {
        Ok(pair) => {
            tracing::info!("✓ Certificate pair is valid");
            tracing::info!("  Fingerprint: {}", pair.fingerprint());
            tracing::info!("  Subject: {}", pair.subject());
            tracing::info!("  Not after: {}", pair.not_after());
            tracing::info!("  Minimum TLS version: {}", tls.min_tls_version);
            Ok(())
        }
        Err(e) => {
            tracing::error!("✗ Certificate pair is invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level: tracing::Level = logging
        .level
        .parse()
        .with_context(|| format!("invalid log level: {}", logging.level))?;

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .init();
    }

    Ok(())
}
