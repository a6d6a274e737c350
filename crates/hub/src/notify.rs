// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of cache mutations and lifecycle events to registered HTTP peers.
//!
//! Each target has a bounded inbound queue and a single sender task. Enqueueing
//! never blocks: a full queue drops the envelope. The sender delivers in queue
//! order with a one-shot retry on transport errors.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::ringlog::RingLog;

/// Inbound queue capacity per target.
pub const QUEUE_CAPACITY: usize = 30;

/// Per-request timeout for notification delivery.
pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(400);

/// Per-request timeout for lifecycle webhooks.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// One notification: method, object name appended to the target URL, request
/// headers to mirror, and the payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub method: Method,
    pub name: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Envelope {
    /// The final `DELETE` sent to a prefix's targets before their queues close.
    pub fn goodbye() -> Self {
        Self { method: Method::Delete, name: String::new(), headers: Vec::new(), body: Bytes::new() }
    }
}

/// Parsed form of one `notify` query value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub url: String,
    /// Header attached to every request; the value may be empty.
    pub header: Option<(String, String)>,
}

/// Parse repeatable `notify` values: `URL`, `KEY|URL` or `KEY|VALUE|URL`.
pub fn parse_targets(values: &[String]) -> Vec<TargetSpec> {
    let mut specs = Vec::new();
    for value in values {
        let parts: Vec<&str> = value.split('|').collect();
        let spec = match parts.as_slice() {
            [url] => TargetSpec { url: (*url).to_owned(), header: None },
            [key, url] => TargetSpec {
                url: (*url).to_owned(),
                header: Some(((*key).to_owned(), String::new())),
            },
            [key, val, url] => TargetSpec {
                url: (*url).to_owned(),
                header: Some(((*key).to_owned(), (*val).to_owned())),
            },
            _ => continue,
        };
        if !spec.url.is_empty() {
            specs.push(spec);
        }
    }
    specs
}

/// A registered notification destination. Dropping every `Target` for a queue
/// closes it and terminates the sender task.
#[derive(Debug)]
pub struct Target {
    pub spec: TargetSpec,
    tx: mpsc::Sender<Envelope>,
}

impl Target {
    pub fn new(spec: TargetSpec) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { spec, tx }, rx)
    }

    /// Non-blocking enqueue; `false` means the queue was full or closed.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        self.tx.try_send(envelope).is_ok()
    }
}

/// Enqueue an envelope on every target. Returns `(sent, skipped)`.
pub fn send_all(targets: &[Target], envelope: &Envelope) -> (usize, usize) {
    let mut sent = 0;
    let mut skipped = 0;
    for target in targets {
        if target.enqueue(envelope.clone()) {
            sent += 1;
        } else {
            skipped += 1;
            tracing::warn!(
                url = %target.spec.url,
                name = %envelope.name,
                "notification queue full, dropping"
            );
        }
    }
    (sent, skipped)
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(100)
        .timeout(CLIENT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// The sole consumer of one target's queue. Runs until the queue closes.
pub async fn run_sender(spec: TargetSpec, mut rx: mpsc::Receiver<Envelope>, ring: Arc<RingLog>) {
    ring.warn(format!("notifier started for {}", spec.url));
    let base = spec.url.trim_end_matches('/').to_owned();
    let mut client = build_client();

    while let Some(envelope) = rx.recv().await {
        let url = request_url(&base, &envelope.name);
        match deliver(&client, &url, &spec, &envelope).await {
            Ok(status) => {
                ring.info(format!("notification {} {url} -> {status}", envelope.method.as_str()));
            }
            Err(err) => {
                ring.error(format!("notification {url} failed: {err}, retrying"));
                client = build_client();
                match deliver(&client, &url, &spec, &envelope).await {
                    Ok(status) => ring.info(format!(
                        "notification {} {url} -> {status} (retry)",
                        envelope.method.as_str()
                    )),
                    Err(err) => {
                        ring.error(format!("notification {url} failed twice: {err}"));
                        client = build_client();
                    }
                }
            }
        }
    }

    ring.warn(format!("notifier stopped for {}", spec.url));
}

fn request_url(base: &str, name: &str) -> String {
    if name.is_empty() {
        base.to_owned()
    } else if name.starts_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    spec: &TargetSpec,
    envelope: &Envelope,
) -> reqwest::Result<reqwest::StatusCode> {
    let method = match envelope.method {
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    };
    let mut req = client.request(method, url);
    for (key, value) in &envelope.headers {
        req = req.header(key.as_str(), value.as_str());
    }
    if let Some((key, value)) = &spec.header {
        req = req.header(key.as_str(), value.as_str());
    }
    let resp = req.body(envelope.body.clone()).send().await?;
    let status = resp.status();
    // Drain so the connection returns to the pool.
    let _ = resp.bytes().await;
    Ok(status)
}

/// One-shot `GET` for lifecycle events (`onstart`, `onstop`, `onerror`).
#[derive(Debug, Clone)]
pub struct Webhook {
    pub url: String,
}

impl Webhook {
    pub async fn fire(&self, ring: &RingLog) {
        ring.warn(format!("webhook {}", self.url));
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        match client.get(&self.url).send().await {
            Ok(resp) => {
                let _ = resp.bytes().await;
            }
            Err(err) => ring.error(format!("webhook {} failed: {err}", self.url)),
        }
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
