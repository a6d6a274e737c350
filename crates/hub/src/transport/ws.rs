// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket log streaming for a running session.
//!
//! The client opens `/ws` and sends one init frame naming the session:
//! `{"method":"Init","path":"/user/cam"}`. The hub answers with the ring
//! backlog and then live entries as `{"method":"Log","entry":…}`, plus a
//! 1-second `{"method":"Ping"}` heartbeat.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ringlog::LogEntry;
use crate::state::AppState;

const SUBSCRIBER_QUEUE: usize = 100;
const BACKLOG: usize = 10;
const PING_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct InitFrame {
    #[serde(default)]
    method: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Serialize)]
struct WsFault {
    errno: u8,
    error: String,
}

#[derive(Debug, Serialize)]
struct LogFrame<'a> {
    method: &'static str,
    entry: &'a LogEntry,
}

#[derive(Debug, Serialize)]
struct PingFrame {
    method: &'static str,
}

/// `GET /ws` — WebSocket upgrade for session log streaming.
pub async fn ws_log(State(s): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, s))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let init = match read_init(&mut ws_rx).await {
        Ok(init) => init,
        Err(error) => {
            let _ = send_json(&mut ws_tx, &WsFault { errno: 1, error }).await;
            return;
        }
    };
    let Some(handle) = state.lookup_session(&init.path).await else {
        let _ = send_json(&mut ws_tx, &WsFault { errno: 2, error: "stream not found".to_owned() })
            .await;
        return;
    };

    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE);
    let backlog = handle.ring.add_subscriber_buffer(tx.clone(), BACKLOG);
    for entry in &backlog {
        if send_json(&mut ws_tx, &LogFrame { method: "Log", entry }).await.is_err() {
            handle.ring.del_subscriber(&tx);
            return;
        }
    }

    let mut ping = tokio::time::interval(PING_PERIOD);
    loop {
        tokio::select! {
            entry = rx.recv() => {
                match entry {
                    Some(entry) => {
                        if send_json(&mut ws_tx, &LogFrame { method: "Log", entry: &entry })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    // Ring closed: the session is gone.
                    None => break,
                }
            }
            _ = ping.tick() => {
                if send_json(&mut ws_tx, &PingFrame { method: "Ping" }).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    handle.ring.del_subscriber(&tx);
}

async fn read_init(ws_rx: &mut SplitStream<WebSocket>) -> Result<InitFrame, String> {
    let bad_frame =
        || "bad init frame, want {\"method\": \"Init\", \"path\": \"/user/cam\"}".to_owned();
    let init: InitFrame = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                break serde_json::from_str(text.as_str()).map_err(|_| bad_frame())?;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            _ => return Err(bad_frame()),
        }
    };
    if init.method != "Init" {
        return Err(bad_frame());
    }
    Ok(init)
}

async fn send_json<T: Serialize>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_default();
    ws_tx.send(Message::Text(text.into())).await
}
