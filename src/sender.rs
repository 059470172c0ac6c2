// src/sender.rs
//
// Frame transmission: single-shot, batch (single-flight), and periodic.
//
// Every mode is encode -> write -> flush -> fixed hold delay. The hold time
// is the bridge's required inter-frame gap and must not be removed. Batch and
// periodic sends run as spawned tasks cancelled cooperatively through
// per-operation flags; nothing is interrupted mid-write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CanFrame};
use crate::config::MonitorConfig;
use crate::error::IoError;
use crate::transport::SharedTransport;

/// Frame plus its injection period for periodic sending.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeriodicFrame {
    pub frame: CanFrame,
    /// Sleep between consecutive sends of this frame.
    pub period_ms: u64,
}

/// Transmit coordinator over a shared transport.
pub struct Sender {
    transport: SharedTransport,
    frame_hold: Duration,
    batch_chunk_size: usize,
    /// Single-flight guard: true while a batch send is running.
    batch_active: Arc<AtomicBool>,
    /// Cancellation token of the in-flight batch, if any.
    batch_cancel: Mutex<Option<Arc<AtomicBool>>>,
    /// Cancellation token of the current periodic task set, if any.
    periodic_cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl Sender {
    pub fn new(transport: SharedTransport, config: &MonitorConfig) -> Self {
        Sender {
            transport,
            frame_hold: Duration::from_millis(config.frame_hold_ms),
            batch_chunk_size: config.batch_chunk_size.max(1),
            batch_active: Arc::new(AtomicBool::new(false)),
            batch_cancel: Mutex::new(None),
            periodic_cancel: Mutex::new(None),
        }
    }

    /// Encode, write, and flush one frame. The transport lock is held only
    /// for the synchronous write+flush, never across a sleep.
    fn write_frame(transport: &SharedTransport, frame: &CanFrame) -> Result<(), IoError> {
        let wire = codec::encode(frame);
        let mut port = transport.lock().unwrap();
        port.write(wire.as_bytes())?;
        port.flush()
    }

    /// Send one frame synchronously. Write and flush errors are returned to
    /// the caller; the call returns after the hold delay.
    pub async fn send_single(&self, frame: &CanFrame) -> Result<(), IoError> {
        Self::write_frame(&self.transport, frame)?;
        tokio::time::sleep(self.frame_hold).await;
        Ok(())
    }

    /// Send a list of frames in fixed-size chunks as a background task.
    ///
    /// Single-flight: a second batch while one is running is rejected with
    /// `Busy`, never queued or merged. The cancellation flag is checked
    /// between frames and between chunks. A write failure aborts the rest of
    /// the batch (logged, not retried).
    pub fn send_batch(&self, frames: Vec<CanFrame>) -> Result<(), IoError> {
        if self.batch_active.swap(true, Ordering::SeqCst) {
            return Err(IoError::busy("a batch send is already in flight"));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        *self.batch_cancel.lock().unwrap() = Some(cancel.clone());

        let transport = self.transport.clone();
        let active = self.batch_active.clone();
        let hold = self.frame_hold;
        let chunk_size = self.batch_chunk_size;

        tokio::spawn(async move {
            let total = frames.len();
            let mut sent = 0usize;

            'outer: for chunk in frames.chunks(chunk_size) {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                for frame in chunk {
                    if cancel.load(Ordering::SeqCst) {
                        break 'outer;
                    }
                    if let Err(e) = Self::write_frame(&transport, frame) {
                        tlog!("[sender] batch aborted after {} of {} frames: {}", sent, total, e);
                        break 'outer;
                    }
                    sent += 1;
                    tokio::time::sleep(hold).await;
                }
                // Inter-chunk gap, same as the per-frame hold.
                tokio::time::sleep(hold).await;
            }

            if cancel.load(Ordering::SeqCst) {
                tlog!("[sender] batch send stopped after {} of {} frames", sent, total);
            } else {
                tlog!("[sender] batch send finished ({} frames)", sent);
            }
            active.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    pub fn batch_in_flight(&self) -> bool {
        self.batch_active.load(Ordering::SeqCst)
    }

    /// Launch one independent repeating task per entry.
    ///
    /// Each task re-encodes and sends its frame, then sleeps the frame's own
    /// period, until the set's cancellation token is set. Calling this while
    /// a set is already running replaces it: the previous set's token is
    /// cancelled first, so task sets never compound.
    pub fn start_periodic(&self, entries: Vec<PeriodicFrame>) {
        let mut guard = self.periodic_cancel.lock().unwrap();
        if let Some(previous) = guard.take() {
            previous.store(true, Ordering::SeqCst);
            tlog!("[sender] replacing running periodic set");
        }

        let token = Arc::new(AtomicBool::new(false));
        for entry in entries {
            let transport = self.transport.clone();
            let cancel = token.clone();
            let hold = self.frame_hold;

            tokio::spawn(async move {
                let period = Duration::from_millis(entry.period_ms);
                while !cancel.load(Ordering::SeqCst) {
                    if let Err(e) = Self::write_frame(&transport, &entry.frame) {
                        tlog!("[sender] periodic {:#05X} stopped: {}", entry.frame.id, e);
                        break;
                    }
                    tokio::time::sleep(hold).await;
                    tokio::time::sleep(period).await;
                }
            });
        }
        *guard = Some(token);
    }

    /// Cooperatively stop the in-flight batch and the current periodic set.
    /// Tasks observe their flag at the next loop check; no write is
    /// interrupted midway.
    pub fn stop(&self) {
        if let Some(cancel) = self.batch_cancel.lock().unwrap().take() {
            cancel.store(true, Ordering::SeqCst);
        }
        if let Some(cancel) = self.periodic_cancel.lock().unwrap().take() {
            cancel.store(true, Ordering::SeqCst);
        }
    }
}
