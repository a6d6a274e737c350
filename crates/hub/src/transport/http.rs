// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for the segment cache, introspection and the hub log.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::{parent_path, KeyInfo};
use crate::error::{ApiResponse, HubError};
use crate::notify::{Envelope, Method};
use crate::ringlog::LogEntry;
use crate::state::AppState;
use crate::storefs;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub streams: usize,
    pub storages: usize,
    pub cached_keys: usize,
}

/// `GET /healthz`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "running".to_owned(),
        streams: s.streams.read().await.len(),
        storages: s.storages.read().await.len(),
        cached_keys: s.cache.keys().len(),
    })
}

/// `PUT /put/{*key}` — store a segment and fan out to the prefix's targets.
pub async fn put_segment(
    State(s): State<Arc<AppState>>,
    Path(key): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, axum::extract::rejection::BytesRejection>,
) -> Response {
    if !s.trust.is_trusted(&addr.to_string()) {
        tracing::warn!(remote = %addr, "forbidden by remote ip");
        return HubError::Untrusted.into_response();
    }
    let key = format!("/{key}");
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(key = %key, err = %err, "error reading body");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    // The fan-out carries the producer's original bytes, not the rewrite.
    let prev = s.cache.add(&key, body.clone(), content_type);

    let envelope = Envelope {
        method: Method::Put,
        name: file_name(&key),
        headers: mirror_headers(&headers),
        body,
    };
    s.cache.notify_prefix(&parent_path(&key), &envelope);

    if prev.is_none() {
        tracing::info!(key = %key, "segment created");
        (StatusCode::CREATED, "created").into_response()
    } else {
        tracing::info!(key = %key, "segment replaced");
        (StatusCode::OK, "updated").into_response()
    }
}

/// `DELETE /put/{*key}` — delete one key, or schedule a prefix deletion when
/// the key has no extension.
pub async fn delete_segment(
    State(s): State<Arc<AppState>>,
    Path(key): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !s.trust.is_trusted(&addr.to_string()) {
        tracing::warn!(remote = %addr, "forbidden by remote ip");
        return HubError::Untrusted.into_response();
    }
    let key = format!("/{key}");

    let response = if !key.contains('.') {
        s.cache.del_any(&key);
        (StatusCode::ACCEPTED, "accepted").into_response()
    } else if s.cache.del(&key).is_some() {
        (StatusCode::OK, "deleted").into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    };

    let envelope = Envelope {
        method: Method::Delete,
        name: file_name(&key),
        headers: mirror_headers(&headers),
        body: Bytes::new(),
    };
    s.cache.notify_prefix(&parent_path(&key), &envelope);

    response
}

/// `GET /get/{*key}` — return a segment, waiting for the producer if needed.
pub async fn get_segment(State(s): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let key = format!("/{key}");
    match s.cache.get(&key).await {
        Some(segment) => {
            let date: chrono::DateTime<chrono::Utc> = segment.created.into();
            let mut builder = axum::http::Response::builder()
                .status(StatusCode::OK)
                .header(header::DATE, date.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
            if !segment.content_type.is_empty() {
                builder = builder.header(header::CONTENT_TYPE, &segment.content_type);
            }
            builder
                .body(Body::from(segment.data.clone()))
                .unwrap_or_default()
                .into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `GET /info` — parent path → cached key count.
pub async fn info_root(
    State(s): State<Arc<AppState>>,
) -> axum::Json<ApiResponse<HashMap<String, usize>>> {
    axum::Json(ApiResponse::ok(s.cache.translations()))
}

/// `GET /info/{user}` — keys under one user.
pub async fn info_user(
    State(s): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> axum::Json<ApiResponse<Vec<KeyInfo>>> {
    axum::Json(ApiResponse::ok(s.cache.files(&format!("/{user}"))))
}

/// `GET /info/{user}/{cam}` — keys of one translation.
pub async fn info_cam(
    State(s): State<Arc<AppState>>,
    Path((user, cam)): Path<(String, String)>,
) -> axum::Json<ApiResponse<Vec<KeyInfo>>> {
    axum::Json(ApiResponse::ok(s.cache.files(&format!("/{user}/{cam}"))))
}

/// `GET /allhistory` — recursive listing of the whole storage tree.
pub async fn all_history_root(State(s): State<Arc<AppState>>) -> Response {
    history_listing(&s, "")
}

/// `GET /allhistory/{*path}` — recursive listing of one subtree.
pub async fn all_history_path(
    State(s): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Response {
    history_listing(&s, &path)
}

fn history_listing(s: &AppState, sub: &str) -> Response {
    if sub.split('/').any(|part| part == "..") {
        return HubError::bad_request("bad path").into_response();
    }
    let dir = s.config.store_dir.join(sub);
    match storefs::list_tree(&dir, &s.config.store_dir) {
        Some(files) => axum::Json(ApiResponse::ok(files)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(ApiResponse::<Vec<String>>::not_found("directory not found")),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub mess: String,
}

/// `GET /log` — text dump of the most recent hub log entries.
pub async fn log_dump(State(s): State<Arc<AppState>>) -> Response {
    render_entries(&s.hub_log.buffer(200)).into_response()
}

/// `POST /log` — let a trusted peer publish one line into the hub log.
pub async fn log_publish(
    State(s): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<LogMessage>,
) -> Response {
    if form.mess.is_empty() {
        return render_entries(&s.hub_log.buffer(200)).into_response();
    }
    if !s.trust.is_trusted(&addr.to_string()) {
        tracing::warn!(remote = %addr, "forbidden by remote ip");
        return HubError::Untrusted.into_response();
    }
    s.hub_log.info(form.mess);
    (StatusCode::OK, "accept").into_response()
}

fn render_entries(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let when = chrono::DateTime::from_timestamp_millis(entry.at_ms as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(&when);
        out.push_str("  \t");
        out.push_str(&entry.message);
        out.push('\n');
    }
    out
}

/// Name part after the last `/` of a normalized key.
pub fn file_name(key: &str) -> String {
    match key.rfind('/') {
        Some(end) => key[end + 1..].to_owned(),
        None => key.to_owned(),
    }
}

/// Request headers mirrored onto notification envelopes. Hop-by-hop fields
/// belong to the outgoing connection, not the mirror.
pub fn mirror_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            if name == header::HOST || name == header::CONTENT_LENGTH {
                return None;
            }
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}
