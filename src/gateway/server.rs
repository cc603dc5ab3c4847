//! HTTP surface for the gateway

use super::envelope::RpcResponse;
use super::Gateway;
use crate::config::ServerConfig;
use crate::{Error, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    api_key: Option<Arc<SecretString>>,
}

impl AppState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.api_key else {
            return true;
        };
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|provided| provided == expected.expose_secret())
    }
}

/// Build the router: `POST /rpc`, `POST /mcp` and `GET /health`
pub fn router(gateway: Arc<Gateway>, api_key: Option<SecretString>) -> Router {
    let state = AppState {
        gateway,
        api_key: api_key.map(Arc::new),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/mcp", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn rpc_handler(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    if !state.authorized(&headers) {
        tracing::warn!("Rejected request with missing or wrong API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing API key" })),
        )
            .into_response();
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(request) => Json(state.gateway.handle_value(request).await).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(RpcResponse::parse_error(&e.to_string()).to_value()),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let chains: Vec<&str> = state
        .gateway
        .dispatcher()
        .adapters()
        .chains()
        .iter()
        .map(|c| c.name())
        .collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "chains": chains,
    }))
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn serve(gateway: Arc<Gateway>, config: &ServerConfig) -> Result<()> {
    let api_key = config
        .api_key
        .as_ref()
        .map(|k| SecretString::from(k.expose_secret().to_string()));
    if api_key.is_none() {
        tracing::warn!("No API key configured; the gateway accepts unauthenticated requests");
    }
    let app = router(gateway, api_key);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Config(format!("server error: {}", e)))?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
