//! Health check HTTP server.
//!
//! Provides `/health` (liveness), `/ready` (readiness) and `/metrics`
//! (Prometheus exposition) endpoints.

use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::HealthConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::registry::DeviceRegistry;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct HealthResponse {
    status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct ReadyResponse {
    status: String,
    gateway_configured: bool,
    store_reachable: bool,
}

/// Shared state for the handlers.
struct HealthState {
    registry: Arc<DeviceRegistry>,
    gateway_configured: bool,
    metrics: Option<Metrics>,
}

/// Health check HTTP server.
pub struct HealthServer {
    config: HealthConfig,
    registry: Arc<DeviceRegistry>,
    gateway_configured: bool,
    metrics: Option<Metrics>,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(
        config: HealthConfig,
        registry: Arc<DeviceRegistry>,
        gateway_configured: bool,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            config,
            registry,
            gateway_configured,
            metrics,
        }
    }

    /// Run the health server until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if !self.config.enabled {
            info!("Health server disabled");
            // Wait for shutdown
            let _ = shutdown.changed().await;
            return Ok(());
        }

        let state = Arc::new(HealthState {
            registry: self.registry.clone(),
            gateway_configured: self.gateway_configured,
            metrics: self.metrics.clone(),
        });

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!(address = %self.config.bind_address, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
                info!("Health server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Liveness check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let store_reachable = state.registry.list_all().await.is_ok();
    let is_ready = state.gateway_configured && store_reachable;

    let response = ReadyResponse {
        status: if is_ready { "ready" } else { "not_ready" }.to_string(),
        gateway_configured: state.gateway_configured,
        store_reachable,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus exposition handler.
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled".to_string()).into_response();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics.gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "encoding failure".to_string(),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::{Device, DeviceStore, MemoryStore, Platform, RegisterOutcome};
    use async_trait::async_trait;
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl DeviceStore for BrokenStore {
        async fn register(
            &self,
            _user_id: &str,
            _push_token: &str,
            _platform: Platform,
        ) -> crate::error::Result<(Device, RegisterOutcome)> {
            Err(Error::Internal("store offline".to_string()))
        }

        async fn rotate(
            &self,
            _old_token: &str,
            _new_token: &str,
            _platform: Platform,
        ) -> crate::error::Result<Device> {
            Err(Error::Internal("store offline".to_string()))
        }

        async fn remove(&self, _push_token: &str) -> crate::error::Result<Device> {
            Err(Error::Internal("store offline".to_string()))
        }

        async fn touch(&self, _push_token: &str) -> crate::error::Result<()> {
            Err(Error::Internal("store offline".to_string()))
        }

        async fn find_by_user(&self, _user_id: &str) -> crate::error::Result<Vec<Device>> {
            Err(Error::Internal("store offline".to_string()))
        }

        async fn all(&self) -> crate::error::Result<Vec<Device>> {
            Err(Error::Internal("store offline".to_string()))
        }
    }

    fn memory_registry() -> Arc<DeviceRegistry> {
        Arc::new(DeviceRegistry::new(Arc::new(MemoryStore::new())))
    }

    async fn free_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    async fn spawn_server(
        registry: Arc<DeviceRegistry>,
        gateway_configured: bool,
        metrics: Option<Metrics>,
    ) -> (String, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let address = free_address().await;
        let config = HealthConfig {
            enabled: true,
            bind_address: address.clone(),
        };
        let server = HealthServer::new(config, registry, gateway_configured, metrics);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { server.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        (address, shutdown_tx, handle)
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ok"));
    }

    #[test]
    fn test_ready_response_serialization() {
        let response = ReadyResponse {
            status: "ready".to_string(),
            gateway_configured: true,
            store_reachable: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ready"));
        assert!(json.contains("gateway_configured"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (address, shutdown_tx, handle) =
            spawn_server(memory_registry(), true, None).await;

        let response = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: HealthResponse = response.json().await.unwrap();
        assert_eq!(body.status, "ok");

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn test_ready_endpoint_ready() {
        let (address, shutdown_tx, handle) =
            spawn_server(memory_registry(), true, None).await;

        let response = reqwest::get(format!("http://{address}/ready"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: ReadyResponse = response.json().await.unwrap();
        assert_eq!(body.status, "ready");
        assert!(body.store_reachable);

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn test_ready_endpoint_store_offline() {
        let registry = Arc::new(DeviceRegistry::new(Arc::new(BrokenStore)));
        let (address, shutdown_tx, handle) = spawn_server(registry, true, None).await;

        let response = reqwest::get(format!("http://{address}/ready"))
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        let body: ReadyResponse = response.json().await.unwrap();
        assert_eq!(body.status, "not_ready");
        assert!(!body.store_reachable);

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dispatch("user");
        let (address, shutdown_tx, handle) =
            spawn_server(memory_registry(), true, Some(metrics)).await;

        let response = reqwest::get(format!("http://{address}/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("courier_dispatches_total"));

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn test_metrics_endpoint_disabled() {
        let (address, shutdown_tx, handle) =
            spawn_server(memory_registry(), true, None).await;

        let response = reqwest::get(format!("http://{address}/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn test_server_disabled() {
        let config = HealthConfig {
            enabled: false,
            bind_address: "127.0.0.1:0".to_string(),
        };
        let server = HealthServer::new(config, memory_registry(), true, None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { server.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Server should complete")
            .expect("Server task should not panic");
        assert!(result.is_ok());
    }
}
