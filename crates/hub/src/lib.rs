// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! camhub: local HTTP control plane for live media streaming.
//!
//! Supervises transcoder child processes (one per stream/storage session),
//! buffers their DASH/HLS output in a wait-for-write segment cache, and fans
//! cache mutations out to registered HTTP peers.

pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod rewrite;
pub mod ringlog;
pub mod session;
pub mod state;
pub mod storefs;
pub mod transport;
pub mod trust;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::SegmentCache;
use crate::config::Config;
use crate::ringlog::{RingLog, HUB_RING_CAPACITY};
use crate::session::command::CommandSet;
use crate::state::AppState;
use crate::transport::build_router;
use crate::trust::TrustGate;

/// Run the hub until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let trust = TrustGate::new(&config.trusted_ip)?;
    let commands = CommandSet::load(&config.cmd_dir)?;
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("failed to create {}", config.work_dir.display()))?;
    std::fs::create_dir_all(&config.store_dir)
        .with_context(|| format!("failed to create {}", config.store_dir.display()))?;

    let shutdown = CancellationToken::new();
    let tasks = TaskTracker::new();

    let cache = Arc::new(SegmentCache::new(
        config.segment_ttl(),
        config.meta_ttl(),
        config.wait_data(),
    ));
    cache::spawn_sweeper(Arc::clone(&cache), shutdown.clone(), &tasks);
    storefs::spawn_cleaner(
        config.store_dir.clone(),
        config.history_ttl(),
        shutdown.clone(),
        &tasks,
    );

    let hub_log = Arc::new(RingLog::new(HUB_RING_CAPACITY));
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(
        config,
        cache,
        trust,
        commands,
        hub_log,
        shutdown.clone(),
        tasks,
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    state.hub_log.warn(format!("camhub listening on {addr}"));
    let listener = TcpListener::bind(&addr).await?;
    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Stop the sweepers and supervisors, then drain every background task.
    shutdown.cancel();
    state.tasks.close();
    state.tasks.wait().await;

    Ok(())
}
