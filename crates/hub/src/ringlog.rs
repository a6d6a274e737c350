// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory log ring with live fan-out to subscribers.
//!
//! One ring exists for the hub itself and one per running session. Publication
//! never blocks: entries go through an internal bounded channel (drop-if-full)
//! to a single consumer task, which writes the ring and forwards each entry to
//! every subscriber with a non-blocking send.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::state::epoch_ms;

/// Ring capacity for the hub-wide log.
pub const HUB_RING_CAPACITY: usize = 2000;

/// Ring capacity for a per-session log.
pub const SESSION_RING_CAPACITY: usize = 250;

/// One captured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at_ms: u64,
    pub level: &'static str,
    pub message: String,
}

impl LogEntry {
    fn empty() -> Self {
        Self { at_ms: 0, level: "", message: String::new() }
    }
}

struct Inner {
    ring: Vec<LogEntry>,
    head: usize,
    subscribers: Vec<mpsc::Sender<LogEntry>>,
}

/// Fixed-capacity log ring with subscriber fan-out.
pub struct RingLog {
    inner: Arc<Mutex<Inner>>,
    tx: Mutex<Option<mpsc::Sender<LogEntry>>>,
}

impl RingLog {
    /// Create a ring and spawn its consumer task. Must run inside a tokio
    /// runtime.
    pub fn new(capacity: usize) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            ring: vec![LogEntry::empty(); capacity.max(1)],
            head: 0,
            subscribers: Vec::new(),
        }));
        let (tx, mut rx) = mpsc::channel::<LogEntry>(capacity.max(1));

        let consumer = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let mut inner = consumer.lock();
                let cap = inner.ring.len();
                let head = inner.head;
                inner.ring[head] = entry.clone();
                inner.head = (head + 1) % cap;
                for sub in &inner.subscribers {
                    let _ = sub.try_send(entry.clone());
                }
            }
        });

        Self { inner, tx: Mutex::new(Some(tx)) }
    }

    /// Enqueue an entry, dropping it if the internal channel is full or the
    /// ring is closed.
    pub fn publish(&self, entry: LogEntry) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.try_send(entry);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.publish(LogEntry { at_ms: epoch_ms(), level: "INFO", message });
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.publish(LogEntry { at_ms: epoch_ms(), level: "WARN", message });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.publish(LogEntry { at_ms: epoch_ms(), level: "ERROR", message });
    }

    /// Up to `n` most-recent entries in chronological order.
    pub fn buffer(&self, n: usize) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        backlog(&inner, n)
    }

    /// Register a subscriber channel. Returns 1 if added, 0 if it was already
    /// registered.
    pub fn add_subscriber(&self, tx: mpsc::Sender<LogEntry>) -> usize {
        let mut inner = self.inner.lock();
        if inner.subscribers.iter().any(|s| s.same_channel(&tx)) {
            return 0;
        }
        inner.subscribers.push(tx);
        1
    }

    /// Register a subscriber and return the backlog atomically, so no entry
    /// published in between is lost or duplicated.
    pub fn add_subscriber_buffer(&self, tx: mpsc::Sender<LogEntry>, n: usize) -> Vec<LogEntry> {
        let mut inner = self.inner.lock();
        if !inner.subscribers.iter().any(|s| s.same_channel(&tx)) {
            inner.subscribers.push(tx);
        }
        backlog(&inner, n)
    }

    /// Remove a subscriber. Returns 1 if it was registered.
    pub fn del_subscriber(&self, tx: &mpsc::Sender<LogEntry>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| !s.same_channel(tx));
        before - inner.subscribers.len()
    }

    /// Stop the consumer and close every subscriber channel.
    pub fn close(&self) {
        self.tx.lock().take();
        self.inner.lock().subscribers.clear();
    }
}

/// Walk newest-to-oldest starting at the slot before `head`, wrapping once,
/// stopping at the cap or at the first never-written slot; reversed on return.
fn backlog(inner: &Inner, n: usize) -> Vec<LogEntry> {
    let cap = inner.ring.len();
    let n = n.min(cap);
    let mut out = Vec::with_capacity(n);
    for i in (0..inner.head).rev() {
        if out.len() >= n {
            break;
        }
        out.push(inner.ring[i].clone());
    }
    if out.len() < n {
        for i in (inner.head..cap).rev() {
            if out.len() >= n || inner.ring[i].message.is_empty() {
                break;
            }
            out.push(inner.ring[i].clone());
        }
    }
    out.reverse();
    out
}

#[cfg(test)]
#[path = "ringlog_tests.rs"]
mod tests;
