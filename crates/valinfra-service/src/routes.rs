//! Router configuration.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use valinfra_store::Store;

use crate::handlers::health;
use crate::state::ServiceState;

/// Create the service router.
///
/// # Routes
///
/// - `GET /health` - Liveness
/// - `GET /ready` - Readiness
pub fn create_router<S: Store + 'static>(state: ServiceState<S>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;
    use valinfra_store::{ChainParams, NetworkSetupConfig, RocksStore};

    fn state() -> (tempfile::TempDir, ServiceState<RocksStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (dir, ServiceState::new(store))
    }

    fn cosmoshub() -> NetworkSetupConfig {
        NetworkSetupConfig {
            network: "cosmoshub-4".into(),
            name: "Cosmos Hub".into(),
            container_name: "gaiad".into(),
            setup_script: None,
            status_command: None,
            default_size_gigabytes: 400,
            chain: ChainParams {
                chain_id: "cosmoshub-4".into(),
                rest_url: "https://rest.cosmos.directory/cosmoshub".into(),
                denom: "uatom".into(),
                decimals: 6,
            },
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_dir, state) = state();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn not_ready_until_subscriber_runs() {
        let (_dir, state) = state();
        let server = TestServer::new(create_router(state.clone())).unwrap();

        let response = server.get("/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["subscriber"], false);

        state.set_subscriber_running(true);
        state.store.put_network_config(&cosmoshub()).unwrap();

        let response = server.get("/ready").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["networks"], 1);
    }

    #[tokio::test]
    async fn not_ready_once_the_subscriber_stops() {
        let (_dir, state) = state();
        state.store.put_network_config(&cosmoshub()).unwrap();
        state.set_subscriber_running(true);
        let server = TestServer::new(create_router(state.clone())).unwrap();
        server.get("/ready").await.assert_status_ok();

        state.set_subscriber_running(false);

        let response = server.get("/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["subscriber"], false);
        assert_eq!(body["networks"], 1);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (_dir, state) = state();
        let server = TestServer::new(create_router(state)).unwrap();

        server
            .get("/v1/unknown")
            .expect_failure()
            .await
            .assert_status_not_found();
    }
}
