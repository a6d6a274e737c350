// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Janitor and history listing for the storage recording tree.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Spawn the recording janitor; it stops when the token is cancelled.
pub fn spawn_cleaner(
    root: PathBuf,
    ttl: Duration,
    shutdown: CancellationToken,
    tasks: &TaskTracker,
) {
    let period = (ttl / 10).max(Duration::from_millis(100));
    tasks.spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    match clean_tree(&root, ttl) {
                        Ok(0) => {}
                        Ok(count) => {
                            tracing::warn!(count, root = %root.display(), "removed expired recordings");
                        }
                        Err(err) => {
                            tracing::error!(err = %err, root = %root.display(), "recording cleanup failed");
                        }
                    }
                }
            }
        }
    });
}

/// Recursively delete regular files older than `ttl`. Directories themselves
/// are left alone; session teardown removes its own directory when empty.
pub fn clean_tree(dir: &Path, ttl: Duration) -> std::io::Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(ttl)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            count += clean_tree(&path, ttl)?;
        } else if meta.modified()? < cutoff {
            std::fs::remove_file(&path)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Recursive file listing with paths relative to `base`. `None` when the
/// directory cannot be read.
pub fn list_tree(dir: &Path, base: &Path) -> Option<Vec<String>> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(children) = list_tree(&path, base) {
                out.extend(children);
            }
        } else {
            let rel = path.strip_prefix(base).unwrap_or(&path);
            out.push(format!("/{}", rel.display()));
        }
    }
    Some(out)
}

#[cfg(test)]
#[path = "storefs_tests.rs"]
mod tests;
