// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::SegmentCache;
use crate::config::Config;
use crate::ringlog::RingLog;
use crate::session::{SessionHandle, SessionKind};
use crate::session::command::CommandSet;
use crate::trust::TrustGate;

/// Shared hub state.
pub struct AppState {
    pub config: Config,
    pub cache: Arc<SegmentCache>,
    pub trust: TrustGate,
    pub commands: CommandSet,
    pub hub_log: Arc<RingLog>,
    /// Running stream sessions keyed by `"/" + user/cam`.
    pub streams: RwLock<HashMap<String, Arc<SessionHandle>>>,
    /// Running storage sessions keyed by `"/" + user/cam`.
    pub storages: RwLock<HashMap<String, Arc<SessionHandle>>>,
    pub shutdown: CancellationToken,
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(
        config: Config,
        cache: Arc<SegmentCache>,
        trust: TrustGate,
        commands: CommandSet,
        hub_log: Arc<RingLog>,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            config,
            cache,
            trust,
            commands,
            hub_log,
            streams: RwLock::new(HashMap::new()),
            storages: RwLock::new(HashMap::new()),
            shutdown,
            tasks,
        }
    }

    pub fn registry(&self, kind: SessionKind) -> &RwLock<HashMap<String, Arc<SessionHandle>>> {
        match kind {
            SessionKind::Stream => &self.streams,
            SessionKind::Storage => &self.storages,
        }
    }

    /// Find a session of either flavor by its `"/" + user/cam` key.
    pub async fn lookup_session(&self, key: &str) -> Option<Arc<SessionHandle>> {
        if let Some(handle) = self.streams.read().await.get(key) {
            return Some(Arc::clone(handle));
        }
        self.storages.read().await.get(key).map(Arc::clone)
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
