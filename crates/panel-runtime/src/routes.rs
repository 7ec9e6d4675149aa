//! HTTP routes
//!
//! - `/plugin-manifest.json` serves the manifest from the static directory
//! - paths starting with `/health` answer `ok`
//! - paths starting with `/features` serve the feature flags as a JSON object
//! - paths starting with `/config` serve the plugin configuration as JSON
//! - everything else is a static file from the plugin build output
//!
//! Prefixes are plain string prefixes, so `/healthz` is a health check and
//! `/config.js` is the plugin configuration rather than a static file.

use axum::{
    extract::{Request, State},
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, EXPIRES},
        HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use panel_config::PluginConfigSource;
use panel_core::FeatureFlags;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    services::ServeDir, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower::ServiceExt as _;
use tracing::error;

const MANIFEST_FILE: &str = "plugin-manifest.json";
const ENTRY_PREFIX: &str = "/plugin-entry.js";
const HEALTH_PREFIX: &str = "/health";
const FEATURES_PREFIX: &str = "/features";
const CONFIG_PREFIX: &str = "/config";

/// Shared state for the route handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Feature flags served under `/features`
    pub features: FeatureFlags,

    /// Plugin build output
    pub static_path: PathBuf,

    /// Plugin configuration served under `/config`
    pub plugin_config: PluginConfigSource,
}

/// Layers wrapped around the routes
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Per-request time limit, `None` for no limit
    pub request_timeout: Option<Duration>,

    /// Log every request (trace level)
    pub access_log: bool,
}

/// Build the router serving the plugin
pub fn build_router(state: Arc<AppState>, options: &RouterOptions) -> Router {
    let mut router = Router::new()
        .route("/plugin-manifest.json", get(manifest))
        .fallback(dispatch)
        .with_state(state)
        .layer(middleware::from_fn(entry_point_no_cache))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ));

    if let Some(timeout) = options.request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }

    if options.access_log {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

/// Route by path prefix, falling back to the static directory
async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let path = request.uri().path();

    if path.starts_with(HEALTH_PREFIX) {
        return health().await.into_response();
    }
    if path.starts_with(FEATURES_PREFIX) {
        return features(State(state)).await.into_response();
    }
    if path.starts_with(CONFIG_PREFIX) {
        return plugin_config(State(state)).await;
    }

    static_file(&state, request).await
}

async fn static_file(state: &AppState, request: Request) -> Response {
    let result: Result<_, Infallible> = ServeDir::new(&state.static_path).oneshot(request).await;
    match result {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn manifest(State(state): State<Arc<AppState>>) -> Response {
    let path = state.static_path.join(MANIFEST_FILE);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, path = %path.display(), "Cannot read plugin manifest");
            return (StatusCode::INTERNAL_SERVER_ERROR, "unable to read plugin manifest")
                .into_response();
        }
    };

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        error!(error = %e, path = %path.display(), "Plugin manifest is not valid JSON");
        return (StatusCode::INTERNAL_SERVER_ERROR, "invalid plugin manifest").into_response();
    }

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        bytes,
    )
        .into_response()
}

async fn features(State(state): State<Arc<AppState>>) -> Json<FeatureFlags> {
    Json(state.features.clone())
}

async fn plugin_config(State(state): State<Arc<AppState>>) -> Response {
    match &state.plugin_config {
        PluginConfigSource::Loaded(config) => Json(config.clone()).into_response(),
        PluginConfigSource::Missing => Json(serde_json::json!({})).into_response(),
        PluginConfigSource::Invalid(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unable to unmarshall config data",
        )
            .into_response(),
    }
}

/// Disable caching for the plugin entry point
async fn entry_point_no_cache(request: Request, next: Next) -> Response {
    let is_entry = request.uri().path().starts_with(ENTRY_PREFIX);
    let mut response = next.run(request).await;

    if is_entry {
        let headers = response.headers_mut();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(EXPIRES, HeaderValue::from_static("0"));
    }

    response
}
