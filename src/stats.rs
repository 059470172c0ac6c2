// src/stats.rs
//
// Per-identifier running statistics over the live frame stream.
//
// One table-wide mutex guards the stats map, the capture buffer, and the
// capturing flag together: a frame's stats update and its capture append are
// atomic with respect to every other reader and writer. Lock holders only do
// arithmetic and map access, never I/O.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::codec::CanFrame;
use crate::error::IoError;
use crate::recorder::{RecordedEvent, Recorder};

/// Running statistics for one frame identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Timestamp of the most recent observation, microseconds since epoch.
    pub last_seen_us: Option<u64>,
    /// Observations since the last reset.
    pub count: u64,
    /// Milliseconds between the two most recent observations.
    /// Meaningful only after the second observation of the identifier.
    pub period_ms: f64,
    /// Data bytes of the most recent observation.
    pub last_data: Vec<u8>,
}

struct StatsInner {
    entries: HashMap<u16, FrameStats>,
    recorder: Recorder,
    dirty: bool,
}

/// Shared statistics table. Clones are handles to the same table.
#[derive(Clone)]
pub struct StatsTable {
    inner: Arc<Mutex<StatsInner>>,
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTable {
    pub fn new() -> Self {
        StatsTable {
            inner: Arc::new(Mutex::new(StatsInner {
                entries: HashMap::new(),
                recorder: Recorder::new(),
                dirty: false,
            })),
        }
    }

    /// Record one decoded frame at time `now_us`.
    ///
    /// Creates the entry on first observation. The period is computed from
    /// the previous `last_seen_us`, so it is only defined from the second
    /// observation on. When a capture is active the event is appended to the
    /// recorder inside the same critical section.
    pub fn update(&self, frame: &CanFrame, now_us: u64) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let entry = inner.entries.entry(frame.id).or_default();
        if let Some(last) = entry.last_seen_us {
            entry.period_ms = now_us.saturating_sub(last) as f64 / 1000.0;
        }
        entry.last_seen_us = Some(now_us);
        entry.count += 1;
        entry.last_data = frame.data.clone();

        if inner.recorder.is_capturing() {
            inner
                .recorder
                .append(frame.id, now_us as f64 / 1_000_000.0, frame.data.clone());
        }

        inner.dirty = true;
    }

    /// Zero every entry's counters and clear its data, keeping the
    /// identifiers themselves in the table.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        for stats in inner.entries.values_mut() {
            stats.last_seen_us = None;
            stats.count = 0;
            stats.period_ms = 0.0;
            stats.last_data.clear();
        }
        inner.dirty = true;
    }

    /// Consistent, independent copy of the whole table, ordered by id.
    /// Nothing in the returned value aliases the shared map.
    pub fn snapshot(&self) -> Vec<(u16, FrameStats)> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<(u16, FrameStats)> = inner
            .entries
            .iter()
            .map(|(id, stats)| (*id, stats.clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }

    /// Clear and return the dirty flag. The display consumer polls this on a
    /// fixed interval rather than being woken per frame.
    pub fn take_dirty(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        std::mem::replace(&mut inner.dirty, false)
    }

    pub fn start_capture(&self) {
        self.inner.lock().unwrap().recorder.start();
    }

    pub fn stop_capture(&self) {
        self.inner.lock().unwrap().recorder.stop();
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.lock().unwrap().recorder.is_capturing()
    }

    pub fn capture_len(&self) -> usize {
        self.inner.lock().unwrap().recorder.len()
    }

    /// Export the capture buffer as the flat {id, time, data} array.
    ///
    /// The events are copied out under the lock and serialized afterwards:
    /// sink I/O must not stall the reader's update path.
    pub fn export_capture<W: io::Write>(&self, sink: W) -> Result<(), IoError> {
        let events = self.inner.lock().unwrap().recorder.events().to_vec();
        Recorder::export_events(&events, sink)
    }

    /// Owned copy of the captured events.
    pub fn captured_events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().unwrap().recorder.events().to_vec()
    }
}
