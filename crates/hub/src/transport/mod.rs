// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the hub.

pub mod control;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/healthz", get(http::health))
        // Segment cache
        .route(
            "/put/{*key}",
            axum::routing::put(http::put_segment)
                .post(http::put_segment)
                .delete(http::delete_segment),
        )
        .route("/get/{*key}", get(http::get_segment).post(http::get_segment))
        // Introspection
        .route("/info", get(http::info_root).post(http::info_root))
        .route("/info/{user}", get(http::info_user).post(http::info_user))
        .route("/info/{user}/{cam}", get(http::info_cam).post(http::info_cam))
        .route("/allhistory", get(http::all_history_root))
        .route("/allhistory/{*path}", get(http::all_history_path))
        // Session control
        .route(
            "/stream/start/{user}/{cam}",
            get(control::stream_start).post(control::stream_start),
        )
        .route(
            "/stream/stop/{user}/{cam}",
            get(control::stream_stop).post(control::stream_stop),
        )
        .route(
            "/storage/start/{user}/{cam}",
            get(control::storage_start).post(control::storage_start),
        )
        .route(
            "/storage/stop/{user}/{cam}",
            get(control::storage_stop).post(control::storage_stop),
        )
        // Hub log
        .route("/log", get(http::log_dump).post(http::log_publish))
        // WebSocket log streaming
        .route("/ws", get(ws::ws_log))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
