// src/session.rs
//
// Collaborator-facing session over one transport.
//
// `Session::connect` spawns the reader task; the front end then talks to the
// session only through this API: stats snapshots via a polled watcher,
// capture control, frame injection, per-byte diffs, and a raw byte tap for a
// terminal-style view of the stream. All background loops stop cooperatively
// on `shutdown` (also triggered by drop).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::changes::{ByteDiff, ChangeTracker};
use crate::codec::{self, CanFrame};
use crate::config::MonitorConfig;
use crate::error::IoError;
use crate::framing::LineReassembler;
use crate::recorder::{RecordedEvent, Recorder};
use crate::sender::{PeriodicFrame, Sender};
use crate::stats::{FrameStats, StatsTable};
use crate::transport::{self, SharedTransport, Transport};

type RawListener = Arc<Mutex<Option<Arc<dyn Fn(&[u8]) + Send + Sync>>>>;

/// Live monitoring session over one transport.
pub struct Session {
    transport: SharedTransport,
    config: MonitorConfig,
    stats: StatsTable,
    changes: Mutex<ChangeTracker>,
    sender: Sender,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    raw_listener: RawListener,
}

impl Session {
    /// Start a session on the given transport and spawn the reader task.
    /// Must be called from within a tokio runtime.
    pub fn connect(transport_impl: impl Transport + 'static, config: MonitorConfig) -> Self {
        let transport = transport::shared(transport_impl);
        let sender = Sender::new(transport.clone(), &config);
        let session = Session {
            transport: transport.clone(),
            stats: StatsTable::new(),
            changes: Mutex::new(ChangeTracker::new()),
            sender,
            stop: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            raw_listener: Arc::new(Mutex::new(None)),
            config,
        };
        session.spawn_reader();
        session
    }

    /// Reader task: poll the transport, reassemble lines, decode, update
    /// stats. Read errors are logged and retried after a back-off; malformed
    /// lines are logged and dropped. While paused the transport is left
    /// untouched so a replay harness can own it.
    fn spawn_reader(&self) {
        let transport = self.transport.clone();
        let stats = self.stats.clone();
        let stop = self.stop.clone();
        let paused = self.paused.clone();
        let raw_listener = self.raw_listener.clone();
        let idle = Duration::from_millis(self.config.idle_poll_ms);
        let backoff = Duration::from_millis(self.config.read_backoff_ms);
        let max_line_len = self.config.max_line_len;

        tokio::spawn(async move {
            let mut reassembler = LineReassembler::new(max_line_len);
            while !stop.load(Ordering::SeqCst) {
                if paused.load(Ordering::SeqCst) {
                    tokio::time::sleep(idle).await;
                    continue;
                }

                let chunk = {
                    let mut port = transport.lock().unwrap();
                    port.read_available()
                };
                match chunk {
                    Err(e) => {
                        tlog!("[session] read failed, backing off: {}", e);
                        tokio::time::sleep(backoff).await;
                    }
                    Ok(chunk) if chunk.is_empty() => {
                        tokio::time::sleep(idle).await;
                    }
                    Ok(chunk) => {
                        // Cloned out so the callback runs without the
                        // listener lock held; a callback may replace or
                        // clear the listener.
                        let listener = raw_listener.lock().unwrap().clone();
                        if let Some(listener) = listener {
                            listener(&chunk);
                        }
                        for line in reassembler.feed(&chunk) {
                            match codec::decode(&line) {
                                Ok(Some(frame)) => stats.update(&frame, crate::now_us()),
                                Ok(None) => {}
                                Err(e) => tlog!("[session] dropping line {:?}: {}", line, e),
                            }
                        }
                    }
                }
            }
            tlog!("[session] reader stopped");
        });
    }

    // ========================================================================
    // Stats
    // ========================================================================

    /// Spawn the stats watcher: polls the table's dirty flag at the
    /// configured interval and hands the callback a fresh snapshot when
    /// anything changed since the last poll. Runs until shutdown.
    pub fn watch_stats(&self, callback: impl Fn(Vec<(u16, FrameStats)>) + Send + 'static) {
        let stats = self.stats.clone();
        let stop = self.stop.clone();
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                if stats.take_dirty() {
                    callback(stats.snapshot());
                }
            }
        });
    }

    pub fn snapshot(&self) -> Vec<(u16, FrameStats)> {
        self.stats.snapshot()
    }

    /// Global reset: zero the stats table (keeping its identifiers) and drop
    /// every change-tracking baseline.
    pub fn reset_stats(&self) {
        self.stats.reset();
        self.changes.lock().unwrap().reset();
    }

    // ========================================================================
    // Capture
    // ========================================================================

    pub fn start_capture(&self) {
        self.stats.start_capture();
    }

    pub fn stop_capture(&self) {
        self.stats.stop_capture();
    }

    pub fn is_capturing(&self) -> bool {
        self.stats.is_capturing()
    }

    pub fn capture_len(&self) -> usize {
        self.stats.capture_len()
    }

    pub fn export_capture<W: std::io::Write>(&self, sink: W) -> Result<(), IoError> {
        self.stats.export_capture(sink)
    }

    /// Load a previously exported capture. The events are returned for the
    /// replay/edit path; the live capture buffer is untouched.
    pub fn import_capture<R: std::io::Read>(source: R) -> Result<Vec<RecordedEvent>, IoError> {
        Recorder::import(source)
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    pub async fn send_single(&self, frame: &CanFrame) -> Result<(), IoError> {
        self.sender.send_single(frame).await
    }

    pub fn send_batch(&self, frames: Vec<CanFrame>) -> Result<(), IoError> {
        self.sender.send_batch(frames)
    }

    pub fn batch_in_flight(&self) -> bool {
        self.sender.batch_in_flight()
    }

    pub fn start_periodic(&self, entries: Vec<PeriodicFrame>) {
        self.sender.start_periodic(entries);
    }

    /// Cancel the in-flight batch and the current periodic set.
    pub fn stop_sending(&self) {
        self.sender.stop();
    }

    /// Write one raw line to the transport, bypassing the frame codec. A
    /// trailing newline is added when missing.
    pub fn send_raw(&self, line: &str) -> Result<(), IoError> {
        let mut port = self.transport.lock().unwrap();
        port.write(line.as_bytes())?;
        if !line.ends_with('\n') {
            port.write(b"\n")?;
        }
        port.flush()
    }

    // ========================================================================
    // Change tracking
    // ========================================================================

    /// Per-byte change classification for one identifier's latest data.
    pub fn diff(&self, id: u16, data: &[u8]) -> Vec<ByteDiff> {
        self.changes.lock().unwrap().diff(id, data)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install a tap that sees every raw inbound chunk before reassembly.
    /// Replaces any previous listener.
    pub fn set_raw_listener(&self, listener: impl Fn(&[u8]) + Send + Sync + 'static) {
        *self.raw_listener.lock().unwrap() = Some(Arc::new(listener));
    }

    pub fn clear_raw_listener(&self) {
        *self.raw_listener.lock().unwrap() = None;
    }

    /// Suspend the reader without dropping transport state. Buffered partial
    /// lines survive across pause/resume.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop the reader, the stats watcher, and every sender task. Idempotent.
    pub fn shutdown(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            self.sender.stop();
            tlog!("[session] shutdown requested");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 10,
            idle_poll_ms: 1,
            read_backoff_ms: 1,
            frame_hold_ms: 1,
            ..MonitorConfig::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_reader_decodes_and_updates_stats() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        handle.push_inbound(b"T1232AABB\n");
        settle().await;

        let snap = session.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, 0x123);
        assert_eq!(snap[0].1.count, 1);
        assert_eq!(snap[0].1.last_data, vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_reader_survives_malformed_lines() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        handle.push_inbound(b"GARBAGE\n\nT1231FF\nT12\n");
        settle().await;

        let snap = session.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, 0x123);
        assert_eq!(snap[0].1.last_data, vec![0xFF]);
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_frames() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        handle.push_inbound(b"T0014112");
        settle().await;
        assert!(session.snapshot().is_empty());

        handle.push_inbound(b"2334455\n");
        settle().await;

        let snap = session.snapshot();
        assert_eq!(snap[0].0, 0x001);
        assert_eq!(snap[0].1.last_data, vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[tokio::test]
    async fn test_reader_retries_after_read_errors() {
        let handle = MemoryTransport::new();
        handle.fail_next_reads(3);
        let session = Session::connect(handle.clone(), fast_config());

        handle.push_inbound(b"T1230\n");
        settle().await;

        assert_eq!(session.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        session.pause();
        settle().await;
        handle.push_inbound(b"T1230\n");
        settle().await;
        assert!(session.snapshot().is_empty(), "reader consumed while paused");

        session.resume();
        settle().await;
        assert_eq!(session.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_raw_listener_sees_inbound_chunks() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.set_raw_listener(move |chunk| {
            sink.lock().unwrap().extend_from_slice(chunk);
        });

        handle.push_inbound(b"T1230\nnoise");
        settle().await;

        assert_eq!(seen.lock().unwrap().as_slice(), b"T1230\nnoise");
    }

    #[tokio::test]
    async fn test_raw_listener_may_clear_itself() {
        let handle = MemoryTransport::new();
        let session = Arc::new(Session::connect(handle.clone(), fast_config()));

        // A callback that mutates the listener slot must not deadlock
        // against the reader invoking it.
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let this = session.clone();
        session.set_raw_listener(move |_| {
            *counter.lock().unwrap() += 1;
            this.clear_raw_listener();
        });

        handle.push_inbound(b"T1230\n");
        settle().await;
        handle.push_inbound(b"T4560\n");
        settle().await;

        assert_eq!(*calls.lock().unwrap(), 1);
        // The reader kept running after the listener removed itself.
        assert_eq!(session.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_send_raw_appends_newline() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        session.send_raw("V").unwrap();
        session.send_raw("O\n").unwrap();

        assert_eq!(handle.written(), b"V\nO\n");
        assert_eq!(handle.flush_count(), 2);
    }

    #[tokio::test]
    async fn test_capture_roundtrip_through_session() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        session.start_capture();
        handle.push_inbound(b"T1231AA\nT4561BB\n");
        settle().await;
        session.stop_capture();
        assert_eq!(session.capture_len(), 2);

        let mut sink = Vec::new();
        session.export_capture(&mut sink).unwrap();
        let events = Session::import_capture(sink.as_slice()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 0x123);
        assert_eq!(events[1].id, 0x456);
    }

    #[tokio::test]
    async fn test_watch_stats_delivers_snapshots() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        session.watch_stats(move |snap| {
            sink.lock().unwrap().push(snap);
        });

        handle.push_inbound(b"T1230\n");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snaps = delivered.lock().unwrap();
        assert!(!snaps.is_empty());
        assert_eq!(snaps.last().unwrap()[0].0, 0x123);
    }

    #[tokio::test]
    async fn test_watch_stats_idle_when_clean() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        handle.push_inbound(b"T1230\n");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let count = Arc::new(Mutex::new(0usize));
        let sink = count.clone();
        session.watch_stats(move |_| {
            *sink.lock().unwrap() += 1;
        });

        // Drain the dirty flag left by the frame above, then stay idle.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_drain = *count.lock().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*count.lock().unwrap(), after_drain);
    }

    #[tokio::test]
    async fn test_reset_stats_resets_change_baselines() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        session.diff(0x123, &[0x00]);
        let diffs = session.diff(0x123, &[0x01]);
        assert!(diffs[0].changed);

        session.reset_stats();

        // After a global reset the next observation is a fresh baseline.
        let diffs = session.diff(0x123, &[0x02]);
        assert!(!diffs[0].changed);
    }

    #[tokio::test]
    async fn test_send_single_through_session() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        let frame = CanFrame::new(0x123, vec![0x01]).unwrap();
        session.send_single(&frame).await.unwrap();

        assert_eq!(handle.written(), b"T123101\nEND\n");
    }

    #[tokio::test]
    async fn test_shutdown_stops_reader() {
        let handle = MemoryTransport::new();
        let session = Session::connect(handle.clone(), fast_config());

        session.shutdown();
        settle().await;

        handle.push_inbound(b"T1230\n");
        settle().await;
        assert!(session.snapshot().is_empty());
    }
}
