// src/config.rs
//
// Scheduling and pacing parameters for the monitor core.
//
// These intervals are part of the behavioral contract, not tuning knobs: the
// display consumer is polled (bounded staleness, not zero-latency), the
// reader backs off on transient errors, and the frame hold time is the
// bridge's required inter-frame gap.

use serde::{Deserialize, Serialize};

/// Monitor core configuration. All durations in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval at which the stats watcher polls the dirty flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reader sleep when a poll returns no data.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Reader back-off after a transport read error.
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
    /// Hold time after each transmitted frame — the bridge's required
    /// inter-frame gap.
    #[serde(default = "default_frame_hold_ms")]
    pub frame_hold_ms: u64,
    /// Frames per chunk in a batch send; cancellation is also checked
    /// between chunks.
    #[serde(default = "default_batch_chunk_size")]
    pub batch_chunk_size: usize,
    /// Upper bound on buffered line bytes before the reassembler drops them.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_idle_poll_ms() -> u64 {
    5
}
fn default_read_backoff_ms() -> u64 {
    20
}
fn default_frame_hold_ms() -> u64 {
    10
}
fn default_batch_chunk_size() -> usize {
    10
}
fn default_max_line_len() -> usize {
    1024
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            poll_interval_ms: default_poll_interval_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            read_backoff_ms: default_read_backoff_ms(),
            frame_hold_ms: default_frame_hold_ms(),
            batch_chunk_size: default_batch_chunk_size(),
            max_line_len: default_max_line_len(),
        }
    }
}
