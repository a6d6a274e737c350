// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start/stop handlers for stream and storage sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::cache::INIT_SEGMENT_MARKER;
use crate::error::HubError;
use crate::notify::{self, Envelope, Target, TargetSpec};
use crate::ringlog::{RingLog, SESSION_RING_CAPACITY};
use crate::session::command::{epoch_time_string, StorageCommand, StreamCommand};
use crate::session::{self, LifecycleHooks, SessionHandle, SessionKind};
use crate::state::{epoch_ms, AppState};

type Params = Vec<(String, String)>;

/// `POST /stream/start/{user}/{cam}?url=...&notify=...`
pub async fn stream_start(
    State(s): State<Arc<AppState>>,
    Path((user, cam)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<Params>,
) -> Response {
    start(s, SessionKind::Stream, user, cam, addr, params).await
}

/// `GET /stream/stop/{user}/{cam}`
pub async fn stream_stop(
    State(s): State<Arc<AppState>>,
    Path((user, cam)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    stop(s, SessionKind::Stream, user, cam, addr).await
}

/// `POST /storage/start/{user}/{cam}?url=...`
pub async fn storage_start(
    State(s): State<Arc<AppState>>,
    Path((user, cam)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<Params>,
) -> Response {
    start(s, SessionKind::Storage, user, cam, addr, params).await
}

/// `GET /storage/stop/{user}/{cam}`
pub async fn storage_stop(
    State(s): State<Arc<AppState>>,
    Path((user, cam)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    stop(s, SessionKind::Storage, user, cam, addr).await
}

async fn start(
    s: Arc<AppState>,
    kind: SessionKind,
    user: String,
    cam: String,
    addr: SocketAddr,
    params: Params,
) -> Response {
    if !s.trust.is_trusted(&addr.to_string()) {
        tracing::warn!(remote = %addr, "forbidden by remote ip");
        return HubError::Untrusted.into_response();
    }
    if !valid_path_part(&user) || !valid_path_part(&cam) {
        return HubError::bad_request("bad session path").into_response();
    }
    let Some(url) = query_value(&params, "url") else {
        return HubError::bad_request("url isn't set in query").into_response();
    };

    let name = format!("{user}/{cam}");
    let root = match kind {
        SessionKind::Stream => &s.config.work_dir,
        SessionKind::Storage => &s.config.store_dir,
    };
    let work_dir = root.join(&user);
    if let Err(err) = tokio::fs::create_dir_all(&work_dir).await {
        tracing::error!(dir = %work_dir.display(), err = %err, "error creating session dir");
        return HubError::bad_request("error create dir").into_response();
    }
    let sentinel = root.join(format!("{name}.{}", kind.sentinel_ext()));
    if let Err(err) = tokio::fs::File::create(&sentinel).await {
        tracing::error!(sentinel = %sentinel.display(), err = %err, "error creating sentinel");
        return HubError::internal(format!("unable to create {}", sentinel.display()))
            .into_response();
    }

    let template = kind.template();
    if !s.commands.has(template) {
        let _ = tokio::fs::remove_file(&sentinel).await;
        return HubError::internal(format!("{template} template not found")).into_response();
    }
    let command = match render_command(&s, kind, &name, &cam, &work_dir, url) {
        Ok(command) => command,
        Err(err) => {
            tracing::error!(err = %err, "build command");
            let _ = tokio::fs::remove_file(&sentinel).await;
            return HubError::internal(format!("{template} template not rendered"))
                .into_response();
        }
    };

    let specs = notify::parse_targets(&query_values(&params, "notify"));
    let hooks = LifecycleHooks {
        on_start: query_values(&params, "onstart"),
        on_stop: query_values(&params, "onstop"),
        on_error: query_values(&params, "onerror"),
    };
    let handle = Arc::new(SessionHandle {
        name,
        kind,
        command,
        work_dir,
        sentinel,
        ring: Arc::new(RingLog::new(SESSION_RING_CAPACITY)),
        started_at_ms: epoch_ms(),
        hooks,
    });

    let mut targets: Vec<Target> = Vec::with_capacity(specs.len());
    let mut receivers: Vec<(TargetSpec, tokio::sync::mpsc::Receiver<Envelope>)> =
        Vec::with_capacity(specs.len());
    for spec in specs {
        let (target, rx) = Target::new(spec.clone());
        targets.push(target);
        receivers.push((spec, rx));
    }

    // A stop for this path may still be pending; this start revives it. The
    // response goes out now, the child spawns in the supervisor task.
    s.cache.cancel_del_any(&handle.cache_prefix());
    let state = Arc::clone(&s);
    s.tasks.spawn(session::run::supervise(state, handle, targets, receivers));

    (StatusCode::CREATED, "created").into_response()
}

async fn stop(
    s: Arc<AppState>,
    kind: SessionKind,
    user: String,
    cam: String,
    addr: SocketAddr,
) -> Response {
    if !s.trust.is_trusted(&addr.to_string()) {
        tracing::warn!(remote = %addr, "forbidden by remote ip");
        return HubError::Untrusted.into_response();
    }
    if !valid_path_part(&user) || !valid_path_part(&cam) {
        return HubError::bad_request("bad session path").into_response();
    }
    let name = format!("{user}/{cam}");
    let root = match kind {
        SessionKind::Stream => &s.config.work_dir,
        SessionKind::Storage => &s.config.store_dir,
    };
    let sentinel = root.join(format!("{name}.{}", kind.sentinel_ext()));
    let _ = tokio::fs::remove_file(&sentinel).await;

    if kind == SessionKind::Stream {
        // Deferred: the sweep honors this one short-TTL window later, and a
        // quick re-start cancels it.
        s.cache.del_any(&format!("/{name}"));
    }
    tracing::info!(session = %name, kind = %kind.as_str(), "stop accepted");

    (StatusCode::ACCEPTED, "deleted").into_response()
}

fn render_command(
    s: &AppState,
    kind: SessionKind,
    name: &str,
    cam: &str,
    work_dir: &std::path::Path,
    url: &str,
) -> anyhow::Result<String> {
    let dir = work_dir.display().to_string();
    match kind {
        SessionKind::Stream => s.commands.render(
            kind.template(),
            &StreamCommand {
                name: name.to_owned(),
                dir,
                time: epoch_time_string(),
                urlin: url.to_owned(),
                port: s.config.port,
                init: INIT_SEGMENT_MARKER.to_owned(),
                extra: s.config.chunk_secs * 2,
            },
        ),
        SessionKind::Storage => s.commands.render(
            kind.template(),
            &StorageCommand {
                name: name.to_owned(),
                dir: dir.clone(),
                time: epoch_time_string(),
                urlin: url.to_owned(),
                urlout: format!("{dir}/{cam}"),
                duration: s.config.chunk_secs,
                numbers: s.config.chunk_count,
            },
        ),
    }
}

fn query_value<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).filter(|v| !v.is_empty())
}

fn query_values(params: &Params, key: &str) -> Vec<String> {
    params.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
}

/// Session path parts come from route params; still refuse dots-only names
/// that would escape the root or collide with sentinel suffixes.
fn valid_path_part(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains('/')
}
