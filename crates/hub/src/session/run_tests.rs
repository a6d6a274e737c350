// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::SegmentCache;
use crate::config::Config;
use crate::ringlog::RingLog;
use crate::session::command::CommandSet;
use crate::session::{LifecycleHooks, SessionKind};
use crate::state::{epoch_ms, AppState};
use crate::trust::TrustGate;

fn test_state(root: &Path) -> anyhow::Result<Arc<AppState>> {
    let mut config = Config::parse_from(["camhub"]);
    config.work_dir = root.join("work");
    config.store_dir = root.join("store");
    config.cmd_dir = root.join("cmd");
    std::fs::create_dir_all(&config.cmd_dir)?;
    std::fs::write(config.cmd_dir.join("stream.hbs"), "sleep \"60\"")?;
    std::fs::write(config.cmd_dir.join("storage.hbs"), "sleep \"60\"")?;
    let commands = CommandSet::load(&config.cmd_dir)?;
    let cache = Arc::new(SegmentCache::new(
        Duration::from_millis(100),
        Duration::from_secs(3600),
        Duration::from_millis(100),
    ));
    let trust = TrustGate::new("127\\.0\\.0\\.1;")?;
    let hub_log = Arc::new(RingLog::new(64));
    Ok(Arc::new(AppState::new(
        config,
        cache,
        trust,
        commands,
        hub_log,
        CancellationToken::new(),
        TaskTracker::new(),
    )))
}

async fn make_handle(
    state: &AppState,
    command: &str,
) -> anyhow::Result<Arc<SessionHandle>> {
    let work_dir = state.config.work_dir.join("u");
    tokio::fs::create_dir_all(&work_dir).await?;
    let sentinel = state.config.work_dir.join("u/c.sdp");
    tokio::fs::File::create(&sentinel).await?;
    Ok(Arc::new(SessionHandle {
        name: "u/c".to_owned(),
        kind: SessionKind::Stream,
        command: command.to_owned(),
        work_dir,
        sentinel,
        ring: Arc::new(RingLog::new(64)),
        started_at_ms: epoch_ms(),
        hooks: LifecycleHooks::default(),
    }))
}

async fn wait_deregistered(state: &AppState) {
    for _ in 0..100 {
        if state.streams.read().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("session was never deregistered");
}

#[tokio::test]
async fn sentinel_removal_stops_the_session() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path())?;
    let handle = make_handle(&state, "sleep \"60\"").await?;
    let sentinel = handle.sentinel.clone();
    let work_dir = handle.work_dir.clone();

    tokio::spawn(supervise(Arc::clone(&state), handle, Vec::new(), Vec::new()));

    // The session registers and its log file appears.
    for _ in 0..100 {
        if state.streams.read().await.contains_key("/u/c") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state.streams.read().await.contains_key("/u/c"));

    tokio::fs::remove_file(&sentinel).await?;
    wait_deregistered(&state).await;

    // The log file is deleted and the (now empty) work dir removed.
    assert!(tokio::fs::metadata(log_file_path(&sentinel)).await.is_err());
    assert!(tokio::fs::metadata(&work_dir).await.is_err());
    Ok(())
}

#[tokio::test]
async fn child_exit_tears_the_session_down() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path())?;
    let handle = make_handle(&state, "true").await?;
    let sentinel = handle.sentinel.clone();

    tokio::spawn(supervise(Arc::clone(&state), handle, Vec::new(), Vec::new()));
    wait_deregistered(&state).await;

    // Clean exit: the sentinel is left where it was.
    assert!(tokio::fs::metadata(&sentinel).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn failing_child_leaves_the_sentinel_in_place() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path())?;
    let handle = make_handle(&state, "false").await?;
    let sentinel = handle.sentinel.clone();

    tokio::spawn(supervise(Arc::clone(&state), handle, Vec::new(), Vec::new()));
    wait_deregistered(&state).await;

    assert!(tokio::fs::metadata(&sentinel).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn unspawnable_command_still_tears_down() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path())?;
    let handle = make_handle(&state, "/no/such/binary --flag").await?;

    tokio::spawn(supervise(Arc::clone(&state), handle, Vec::new(), Vec::new()));
    wait_deregistered(&state).await;
    Ok(())
}

#[test]
fn log_path_is_next_to_the_sentinel() {
    assert_eq!(log_file_path(Path::new("/w/u/c.sdp")), PathBuf::from("/w/u/c.sdp.log"));
}
