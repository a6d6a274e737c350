// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed in-memory segment cache with a wait-for-write read path.
//!
//! Producers `add` DASH/HLS artifacts; consumers `get` them, blocking on a
//! per-key wakeup for a bounded budget when the producer has not written yet.
//! Media keys live for the short TTL, manifests and init segments for the long
//! one. Prefix deletion is deferred one short-TTL window so that a restart of
//! the same session can cancel it before data is discarded.
//!
//! Locking: the map mutex only ever guards locate/create/remove of entries;
//! the per-entry mutex only guards its segment slot. Both are held together
//! only in map→entry order, never across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::notify::{self, Envelope, Target};
use crate::rewrite;

/// Marker ffmpeg puts into DASH initialization segment names
/// (`-init_seg_name`, default `init-stream$RepresentationID$.$ext$`).
pub const INIT_SEGMENT_MARKER: &str = "init-stream";

/// One cached artifact. Immutable after insert; replacing a key installs a new
/// `Segment` value.
#[derive(Debug)]
pub struct Segment {
    pub data: Bytes,
    pub content_type: String,
    pub created: SystemTime,
    inserted: Instant,
    ttl: Duration,
}

#[derive(Default)]
struct Entry {
    slot: Mutex<Option<Arc<Segment>>>,
    wakeup: Notify,
}

struct PendingDelete {
    prefix: String,
    at: Instant,
}

/// Introspection row for the admin listings.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    pub key: String,
    pub created: chrono::DateTime<chrono::Utc>,
}

/// The segment store plus the notification targets bound to its key prefixes.
pub struct SegmentCache {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    pending: Mutex<Vec<PendingDelete>>,
    targets: Mutex<HashMap<String, Vec<Target>>>,
    short_ttl: Duration,
    long_ttl: Duration,
    wait_data: Duration,
}

impl SegmentCache {
    pub fn new(short_ttl: Duration, long_ttl: Duration, wait_data: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            targets: Mutex::new(HashMap::new()),
            short_ttl,
            long_ttl,
            wait_data,
        }
    }

    pub fn sweep_period(&self) -> Duration {
        (self.short_ttl / 10).max(Duration::from_millis(10))
    }

    /// Store a segment, waking every reader parked on the key.
    ///
    /// Classifies the TTL from the key, applies manifest rewriting, and
    /// returns the previous segment when the key already held one (the HTTP
    /// layer uses this for 200-vs-201 only).
    pub fn add(&self, key: &str, data: Bytes, content_type: &str) -> Option<Arc<Segment>> {
        let key = normalize_key(key);
        let mut data = data;
        let mut ttl = self.short_ttl;
        if key.contains(INIT_SEGMENT_MARKER) {
            ttl = self.long_ttl;
        } else if key.ends_with(".mpd") {
            ttl = self.long_ttl;
            data = Bytes::from(rewrite::mpd(&data));
        } else if key.ends_with(".m3u8") {
            ttl = self.long_ttl;
            if key.ends_with("master.m3u8") {
                data = Bytes::from(rewrite::master_playlist(&data));
            }
        }

        let segment = Arc::new(Segment {
            data,
            content_type: content_type.to_owned(),
            created: SystemTime::now(),
            inserted: Instant::now(),
            ttl,
        });

        let entry = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(key).or_default())
        };
        let prev = entry.slot.lock().replace(segment);
        entry.wakeup.notify_waiters();
        prev
    }

    /// Return the segment for `key`, waiting up to the wait-data budget for a
    /// producer that has not written yet.
    ///
    /// Every caller waits the same configured budget; interest is registered
    /// on the entry's wakeup before the slot is re-checked, so a concurrent
    /// `add` cannot slip between check and wait.
    pub async fn get(&self, key: &str) -> Option<Arc<Segment>> {
        let key = normalize_key(key);
        let entry = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        let wakeup = entry.wakeup.notified();
        tokio::pin!(wakeup);
        wakeup.as_mut().enable();

        if let Some(segment) = entry.slot.lock().clone() {
            return Some(segment);
        }

        let _ = tokio::time::timeout(self.wait_data, wakeup).await;

        let segment = entry.slot.lock().clone();
        if segment.is_none() {
            self.remove_if_empty(&key);
        }
        segment
    }

    /// Remove a key, releasing any parked readers; they observe absence.
    pub fn del(&self, key: &str) -> Option<Arc<Segment>> {
        let key = normalize_key(key);
        let entry = self.entries.lock().remove(&key)?;
        let prev = entry.slot.lock().take();
        entry.wakeup.notify_waiters();
        prev
    }

    /// Schedule every key under `prefix` for deletion by a later sweep.
    /// Nothing is deleted now; `cancel_del_any` can still revoke it.
    pub fn del_any(&self, prefix: &str) {
        let prefix = normalize_key(prefix);
        if prefix.len() < 2 {
            return;
        }
        tracing::warn!(prefix = %prefix, "prefix delete scheduled");
        self.pending.lock().push(PendingDelete { prefix, at: Instant::now() });
    }

    /// Revoke pending prefix deletions that `prefix` descends from (or equals).
    ///
    /// The rule is deliberately asymmetric: a new, more specific start revives
    /// everything broader that was scheduled to die.
    pub fn cancel_del_any(&self, prefix: &str) -> usize {
        let prefix = normalize_key(prefix);
        if prefix.len() < 2 {
            return 0;
        }
        tracing::warn!(prefix = %prefix, "prefix delete cancelled");
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|p| !(p.prefix == prefix || is_path_prefix(&p.prefix, &prefix)));
        before - pending.len()
    }

    /// One sweep pass: age out ripe pending prefixes, then drop every key that
    /// outlived its TTL or sits under a ripe prefix. Returns the cull count.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ripe: Vec<String> = {
            let mut pending = self.pending.lock();
            let mut ripe = Vec::new();
            pending.retain(|p| {
                if now.saturating_duration_since(p.at) <= self.short_ttl {
                    true
                } else {
                    ripe.push(p.prefix.clone());
                    false
                }
            });
            ripe
        };

        let keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        let mut culled = 0;
        for key in keys {
            let entry = {
                let entries = self.entries.lock();
                match entries.get(&key) {
                    Some(e) => Arc::clone(e),
                    None => continue,
                }
            };
            let expired = match entry.slot.lock().as_ref() {
                Some(segment) => now.saturating_duration_since(segment.inserted) > segment.ttl,
                // A reader is parked here; the wait-data timeout owns cleanup.
                None => false,
            };
            let doomed = expired || ripe.iter().any(|p| is_path_prefix(p, &key));
            if doomed && self.remove_entry(&key) {
                tracing::warn!(key = %key, "swept segment");
                culled += 1;
            }
        }
        culled
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Keys with their creation instants. Entries still waiting for their
    /// first write are skipped.
    pub fn keys_created(&self) -> Vec<KeyInfo> {
        let snapshot: Vec<(String, Arc<Entry>)> = {
            let entries = self.entries.lock();
            entries.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        snapshot
            .into_iter()
            .filter_map(|(key, entry)| {
                let created = entry.slot.lock().as_ref().map(|s| s.created)?;
                Some(KeyInfo { key, created: created.into() })
            })
            .collect()
    }

    /// Parent path → number of keys directly or transitively under it.
    pub fn translations(&self) -> HashMap<String, usize> {
        let mut out = HashMap::new();
        for key in self.keys() {
            let parent = parent_path(&key);
            *out.entry(parent).or_insert(0) += 1;
        }
        out
    }

    /// Introspection listing of the keys under one prefix.
    pub fn files(&self, prefix: &str) -> Vec<KeyInfo> {
        let prefix = normalize_key(prefix);
        self.keys_created()
            .into_iter()
            .filter(|info| info.key == prefix || is_path_prefix(&prefix, &info.key))
            .collect()
    }

    // -- Notification target registry -------------------------------------

    /// Bind targets to a key prefix (one session's cache subtree).
    pub fn add_targets(&self, prefix: &str, targets: Vec<Target>) {
        self.targets.lock().insert(normalize_key(prefix), targets);
    }

    /// Fan an envelope out to the targets bound to `prefix`, if any.
    pub fn notify_prefix(&self, prefix: &str, envelope: &Envelope) -> (usize, usize) {
        let targets = self.targets.lock();
        match targets.get(&normalize_key(prefix)) {
            Some(list) => notify::send_all(list, envelope),
            None => (0, 0),
        }
    }

    /// Unbind and return a prefix's targets; dropping them closes the queues.
    pub fn remove_targets(&self, prefix: &str) -> Option<Vec<Target>> {
        self.targets.lock().remove(&normalize_key(prefix))
    }

    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.lock().remove(key) {
            Some(entry) => {
                entry.slot.lock().take();
                entry.wakeup.notify_waiters();
                true
            }
            None => false,
        }
    }

    fn remove_if_empty(&self, key: &str) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(key).map(Arc::clone) else {
            return;
        };
        let slot = entry.slot.lock();
        if slot.is_some() {
            return;
        }
        entries.remove(key);
        drop(slot);
        drop(entries);
        entry.wakeup.notify_waiters();
    }
}

impl Segment {
    #[cfg(test)]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Spawn the periodic sweeper; it stops when the token is cancelled.
pub fn spawn_sweeper(cache: Arc<SegmentCache>, shutdown: CancellationToken, tasks: &TaskTracker) {
    let period = cache.sweep_period();
    tasks.spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    let culled = cache.sweep();
                    tracing::debug!(culled, "cache sweep");
                }
            }
        }
    });
}

/// Keys always begin with `/` and never end with `/`.
pub fn normalize_key(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Path-segment-aware prefix check: `/u/c` covers `/u/c/seg.m4s` but not
/// `/u/cx`.
pub fn is_path_prefix(prefix: &str, key: &str) -> bool {
    key.len() > prefix.len()
        && key.starts_with(prefix)
        && key.as_bytes()[prefix.len()] == b'/'
}

/// Everything up to the last `/` of a normalized key.
pub fn parent_path(key: &str) -> String {
    match key.rfind('/') {
        Some(0) | None => String::new(),
        Some(end) => key[..end].to_owned(),
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
