// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session supervisor task.
//!
//! Lifecycle is driven entirely through the filesystem: the session runs while
//! its sentinel file exists. Removing the sentinel (by the stop handler or by
//! any external tool) makes the supervisor send SIGQUIT to the child and tear
//! the session down.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::notify::{self, Envelope, Target, TargetSpec, Webhook};
use crate::ringlog::RingLog;
use crate::state::AppState;

use super::{command, SessionHandle};

/// How often the sentinel file is checked.
const SENTINEL_POLL: Duration = Duration::from_millis(200);

/// How long a signalled child may take to exit before SIGKILL.
const EXIT_WAIT: Duration = Duration::from_secs(2);

/// Supervise one session from registration to teardown.
///
/// The start handler has already created the working directory, the sentinel
/// file and the rendered command; it responds 201 before this task runs.
pub async fn supervise(
    state: Arc<AppState>,
    handle: Arc<SessionHandle>,
    targets: Vec<Target>,
    receivers: Vec<(TargetSpec, mpsc::Receiver<Envelope>)>,
) {
    let key = handle.cache_prefix();
    let ring = Arc::clone(&handle.ring);
    ring.warn(format!("session start for {}", handle.sentinel.display()));

    state.registry(handle.kind).write().await.insert(key.clone(), Arc::clone(&handle));
    state.cache.add_targets(&key, targets);
    for (spec, rx) in receivers {
        state.tasks.spawn(notify::run_sender(spec, rx, Arc::clone(&ring)));
    }
    fire_hooks(&state, &ring, &handle.hooks.on_start);

    if let Err(err) = run_child(&state, &handle).await {
        ring.error(format!("session {} failed: {err:#}", handle.name));
        fire_hooks(&state, &ring, &handle.hooks.on_error);
    }

    teardown(&state, &handle, &key).await;
}

async fn run_child(state: &AppState, handle: &SessionHandle) -> anyhow::Result<()> {
    let ring = &handle.ring;
    let argv = command::split_args(&handle.command);
    let Some(program) = argv.first() else {
        anyhow::bail!("rendered command is empty");
    };
    ring.warn(format!("spawn {argv:?}"));

    let mut child = Command::new(program)
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let log_path = log_file_path(&handle.sentinel);
    let log_file = tokio::fs::File::create(&log_path)
        .await
        .with_context(|| format!("failed to create {}", log_path.display()))?;
    let log_file = Arc::new(Mutex::new(log_file));
    write_line(&log_file, &handle.command, true).await;

    if let Some(stdout) = child.stdout.take() {
        state.tasks.spawn(scan_pipe(
            stdout,
            "transcoder out: ",
            Arc::clone(&log_file),
            Arc::clone(ring),
            false,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        state.tasks.spawn(scan_pipe(
            stderr,
            "transcoder err: ",
            Arc::clone(&log_file),
            Arc::clone(ring),
            true,
        ));
    }

    let mut poll = tokio::time::interval(SENTINEL_POLL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut stop_requested = false;

    let status = loop {
        if stop_requested {
            signal_quit(&child, ring);
            break wait_bounded(&mut child, ring).await?;
        }
        tokio::select! {
            status = child.wait() => {
                break status.context("wait on child")?;
            }
            _ = state.shutdown.cancelled() => {
                ring.warn(format!("hub shutdown, stopping {}", handle.name));
                stop_requested = true;
            }
            _ = poll.tick() => {
                if tokio::fs::metadata(&handle.sentinel).await.is_err() {
                    ring.warn(format!("sentinel removed for {}", handle.name));
                    stop_requested = true;
                }
            }
        }
    };

    if stop_requested || status.success() {
        ring.warn(format!("session {} exited ({status})", handle.name));
        Ok(())
    } else {
        // The sentinel stays in place so the failure is observable; clients
        // decide whether to stop or restart.
        anyhow::bail!("transcoder exited with {status}")
    }
}

async fn teardown(state: &AppState, handle: &Arc<SessionHandle>, key: &str) {
    let ring = &handle.ring;
    if let Some(targets) = state.cache.remove_targets(key) {
        let (sent, skipped) = notify::send_all(&targets, &Envelope::goodbye());
        ring.warn(format!("final DELETE notification: {sent} sent, {skipped} skipped"));
        // Dropping the targets closes their queues once the goodbye drains.
    }
    {
        // A replacing start may have overwritten the registration; only the
        // session's own entry is removed.
        let mut registry = state.registry(handle.kind).write().await;
        if registry.get(key).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            registry.remove(key);
        }
    }
    fire_hooks(state, ring, &handle.hooks.on_stop);

    let _ = tokio::fs::remove_file(log_file_path(&handle.sentinel)).await;
    remove_dir_if_empty(&handle.work_dir, ring).await;

    let uptime_ms = crate::state::epoch_ms().saturating_sub(handle.started_at_ms);
    ring.warn(format!("session stop for {} after {uptime_ms} ms", handle.sentinel.display()));
    ring.close();
}

fn fire_hooks(state: &AppState, ring: &Arc<RingLog>, urls: &[String]) {
    for url in urls {
        let webhook = Webhook { url: url.clone() };
        let ring = Arc::clone(ring);
        state.tasks.spawn(async move {
            webhook.fire(&ring).await;
        });
    }
}

async fn scan_pipe<R: AsyncRead + Unpin>(
    pipe: R,
    prefix: &'static str,
    log_file: Arc<Mutex<tokio::fs::File>>,
    ring: Arc<RingLog>,
    sync: bool,
) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let text = format!("{prefix}{line}");
        write_line(&log_file, &text, sync).await;
        ring.info(text);
    }
}

async fn write_line(log_file: &Mutex<tokio::fs::File>, text: &str, sync: bool) {
    let mut file = log_file.lock().await;
    let _ = file.write_all(text.as_bytes()).await;
    let _ = file.write_all(b"\n").await;
    if sync {
        let _ = file.sync_data().await;
    }
}

fn signal_quit(child: &Child, ring: &RingLog) {
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(err) = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGQUIT,
    ) {
        ring.error(format!("SIGQUIT failed: {err}"));
    }
}

async fn wait_bounded(
    child: &mut Child,
    ring: &RingLog,
) -> anyhow::Result<std::process::ExitStatus> {
    match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
        Ok(status) => status.context("wait on signalled child"),
        Err(_) => {
            ring.error("child ignored SIGQUIT, killing");
            let _ = child.start_kill();
            child.wait().await.context("wait on killed child")
        }
    }
}

/// The per-session text log lives alongside the sentinel.
pub fn log_file_path(sentinel: &Path) -> PathBuf {
    let mut path = sentinel.as_os_str().to_owned();
    path.push(".log");
    PathBuf::from(path)
}

async fn remove_dir_if_empty(dir: &Path, ring: &RingLog) {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => match entries.next_entry().await {
            Ok(None) => {
                let _ = tokio::fs::remove_dir(dir).await;
            }
            Ok(Some(_)) => {
                ring.info(format!("directory {} not empty, keeping", dir.display()));
            }
            Err(_) => {}
        },
        Err(_) => {}
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
