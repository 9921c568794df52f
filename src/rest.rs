// Copyright 2026 axscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface for the scan service.
//!
//! One router over shared state: the scan endpoint plus health, status,
//! and a live event stream. Scan failures map to HTTP through
//! [`ScanError`]'s `IntoResponse` — 400 for bad targets, 429 for rate
//! limiting, 500 with a generic message for everything internal.

use crate::browser::find_chromium;
use crate::engine::find_axe_bundle;
use crate::error::ScanError;
use crate::events::EventBus;
use crate::scan::Scanner;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Shared state behind every handler.
pub struct AppState {
    pub scanner: Scanner,
    pub bus: EventBus,
    pub started_at: Instant,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/events", get(events_sse))
        .route("/scan", post(scan))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("scan service listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

/// Serve the embedded scan form.
async fn index() -> impl IntoResponse {
    Html(include_str!("dashboard.html"))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Runtime status for dashboards and probes.
async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "active_sessions": state.scanner.active_sessions(),
        "chromium_available": find_chromium().is_some(),
        "axe_bundle_cached": find_axe_bundle().is_some(),
    }))
}

#[derive(Deserialize)]
struct ScanBody {
    url: String,
}

/// Run one scan for the calling client.
async fn scan(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ScanBody>,
) -> Result<Json<Value>, ScanError> {
    let caller = caller_identity(&headers, peer);
    let audit = state.scanner.scan(&body.url, &caller).await?;
    Ok(Json(serde_json::json!({ "result": audit })))
}

/// Server-Sent Events endpoint streaming scan events as they happen.
async fn events_sse(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Missed some events due to slow consumer — continue
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": { "code": "NOT_FOUND", "message": "no such route" }
        })),
    )
}

/// Caller identity for rate limiting: the first `X-Forwarded-For` hop when
/// behind a proxy, otherwise the socket peer address.
fn caller_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}
