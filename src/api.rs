use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::constants::{SERVICE_NAME, VERSION};
use crate::coordinator::{Coordinator, StatsSnapshot};
use crate::error::Result;
use crate::store::PeerRecord;

#[derive(Serialize)]
pub struct CoordinatorStatus {
    pub service: String,
    pub status: String,
    pub listen_addr: String,
    pub peers_stored: usize,
    pub uptime_seconds: u64,
    pub stats: StatsSnapshot,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct PeerListing {
    pub count: usize,
    pub peers: Vec<PeerRecord>,
    pub timestamp: String,
}

// Хранилище недоступно → 503, детали только в лог
fn unavailable(e: crate::error::Error) -> StatusCode {
    log::warn!("⚠️ Status API: {}", e);
    StatusCode::SERVICE_UNAVAILABLE
}

pub async fn status_handler(
    State(coordinator): State<Arc<Coordinator>>,
) -> std::result::Result<Json<CoordinatorStatus>, StatusCode> {
    let peers_stored = coordinator.store().len().map_err(unavailable)?;
    Ok(Json(CoordinatorStatus {
        service: SERVICE_NAME.to_string(),
        status: "active".to_string(),
        listen_addr: coordinator.config().listen_addr.to_string(),
        peers_stored,
        uptime_seconds: coordinator.uptime_secs(),
        stats: coordinator.stats().snapshot(),
        version: VERSION.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

async fn peers_handler(
    State(coordinator): State<Arc<Coordinator>>,
) -> std::result::Result<Json<PeerListing>, StatusCode> {
    let peers = coordinator.store().snapshot().map_err(unavailable)?;
    Ok(Json(PeerListing {
        count: peers.len(),
        peers,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/v1/status", get(status_handler))
        .route("/v1/peers", get(peers_handler))
        .with_state(coordinator)
}

/// Serves the read-only status API until `shutdown` fires.
pub async fn serve(addr: SocketAddr, coordinator: Arc<Coordinator>, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("🌐 Status API on http://{}/v1/status", listener.local_addr()?);
    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
