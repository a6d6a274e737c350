// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the camhub control plane.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "camhub", version, about = "Local control plane for live media streaming.")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "CAMHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 6060, env = "CAMHUB_PORT")]
    pub port: u16,

    /// Root directory for stream session working directories.
    #[arg(long, default_value = "work", env = "CAMHUB_WORK_DIR")]
    pub work_dir: PathBuf,

    /// Root directory for storage session recordings.
    #[arg(long, default_value = "store", env = "CAMHUB_STORE_DIR")]
    pub store_dir: PathBuf,

    /// Command template directory (one `.hbs` file per template).
    #[arg(long, default_value = "cmd", env = "CAMHUB_CMD_DIR")]
    pub cmd_dir: PathBuf,

    /// Semicolon-delimited regex list matched against the remote host part.
    #[arg(long, default_value = "127.0.0.1;", env = "CAMHUB_TRUSTED_IP")]
    pub trusted_ip: String,

    /// Media segment TTL in seconds.
    #[arg(long, default_value_t = 60, env = "CAMHUB_SEGMENT_TTL")]
    pub segment_ttl_secs: u64,

    /// Manifest and init-segment TTL in seconds.
    #[arg(long, default_value_t = 86400, env = "CAMHUB_META_TTL")]
    pub meta_ttl_secs: u64,

    /// How long a reader waits for a segment that is not written yet, in
    /// milliseconds. Every reader uses this same budget.
    #[arg(long, default_value_t = 3000, env = "CAMHUB_WAIT_DATA_MS")]
    pub wait_data_ms: u64,

    /// Chunk duration in seconds, handed to command templates.
    #[arg(long, default_value_t = 4, env = "CAMHUB_CHUNK_SECS")]
    pub chunk_secs: u64,

    /// Number of chunks a storage session keeps, handed to command templates.
    #[arg(long, default_value_t = 300, env = "CAMHUB_CHUNK_COUNT")]
    pub chunk_count: u64,

    /// Recording retention in seconds for the storage janitor.
    #[arg(long, default_value_t = 86400, env = "CAMHUB_HISTORY_TTL")]
    pub history_ttl_secs: u64,

    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is
    /// not set.
    #[arg(long, default_value = "info", env = "CAMHUB_LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    pub fn segment_ttl(&self) -> Duration {
        Duration::from_secs(self.segment_ttl_secs)
    }

    pub fn meta_ttl(&self) -> Duration {
        Duration::from_secs(self.meta_ttl_secs)
    }

    pub fn wait_data(&self) -> Duration {
        Duration::from_millis(self.wait_data_ms)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.segment_ttl_secs == 0 || self.meta_ttl_secs == 0 || self.history_ttl_secs == 0 {
            anyhow::bail!("TTLs must be non-zero");
        }
        if self.wait_data() > self.segment_ttl() {
            anyhow::bail!("wait-data budget exceeds the segment TTL");
        }
        Ok(())
    }
}
