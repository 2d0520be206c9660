//! Process control reachable from the local machine only.

use axum::{
    extract::{Request, State},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use super::{ApiError, AppState, peer_addr};

/// `GET /stop-process`: begins a graceful shutdown.
///
/// Remote peers get the same not-found answer as any unknown page.
pub async fn stop_process(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let Some(peer) = peer_addr(req.extensions()).filter(std::net::IpAddr::is_loopback) else {
        return Err(ApiError::page_not_found(req.uri().path()));
    };

    info!(peer = %peer, "Stop requested");
    state.shutdown.notify_one();
    Ok("Stopping")
}
