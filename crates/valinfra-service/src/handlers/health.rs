//! Liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::warn;
use valinfra_store::Store;

use crate::state::ServiceState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// `ready` or `not_ready`.
    pub status: &'static str,
    /// Whether driver events are being consumed.
    pub subscriber: bool,
    /// Number of configured networks, absent when the store could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<usize>,
}

/// Liveness handler.
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness handler. Returns 503 until the subscriber runs and the store answers.
pub async fn ready<S: Store + 'static>(State(state): State<ServiceState<S>>) -> impl IntoResponse {
    let subscriber = state.subscriber_running();
    let networks = match state.store.list_network_configs() {
        Ok(configs) => Some(configs.len()),
        Err(e) => {
            warn!(error = %e, "Readiness check could not read the store");
            None
        }
    };

    let ready = subscriber && networks.is_some();
    let response = ReadyResponse {
        status: if ready { "ready" } else { "not_ready" },
        subscriber,
        networks,
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
