// src/recorder.rs
//
// Timestamped capture buffer for frame events.
//
// The persisted format is a flat JSON array of {id, time, data} records in
// arrival order. There is no schema version field; import accepts exactly
// this shape and does not validate timestamp monotonicity.

use std::io;

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// One captured frame observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Frame identifier.
    pub id: u16,
    /// Wallclock timestamp in seconds.
    pub time: f64,
    /// Frame data bytes.
    pub data: Vec<u8>,
}

/// Capture buffer. Events are appended in arrival order and that order is
/// preserved through export/import.
#[derive(Debug, Default)]
pub struct Recorder {
    capturing: bool,
    events: Vec<RecordedEvent>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    /// Begin capturing. Any prior uncommitted capture is discarded.
    pub fn start(&mut self) {
        self.capturing = true;
        self.events.clear();
    }

    /// Stop capturing. The buffer is retained until the next `start()`.
    pub fn stop(&mut self) {
        self.capturing = false;
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn append(&mut self, id: u16, time: f64, data: Vec<u8>) {
        self.events.push(RecordedEvent { id, time, data });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Serialize the ordered event list to a sink.
    pub fn export<W: io::Write>(&self, sink: W) -> Result<(), IoError> {
        Self::export_events(&self.events, sink)
    }

    /// Serialize an already-copied event list. Callers that hold a lock
    /// around the live buffer copy the events out first and run the sink
    /// I/O through this instead.
    pub fn export_events<W: io::Write>(events: &[RecordedEvent], sink: W) -> Result<(), IoError> {
        serde_json::to_writer(sink, events)
            .map_err(|e| IoError::write(format!("capture export: {}", e)))
    }

    /// Deserialize an ordered event list from a source.
    ///
    /// Returns the events rather than replacing the live buffer — imported
    /// captures feed the replay/edit path, not the recorder itself.
    pub fn import<R: io::Read>(source: R) -> Result<Vec<RecordedEvent>, IoError> {
        serde_json::from_reader(source)
            .map_err(|e| IoError::protocol("capture", format!("import failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_events() -> Vec<RecordedEvent> {
        vec![
            RecordedEvent {
                id: 0x123,
                time: 1000.25,
                data: vec![0xAA, 0xBB],
            },
            RecordedEvent {
                id: 0x001,
                time: 1000.50,
                data: vec![],
            },
            RecordedEvent {
                id: 0x123,
                time: 1000.75,
                data: vec![0xAA, 0xBC],
            },
        ]
    }

    #[test]
    fn test_start_clears_previous_capture() {
        let mut rec = Recorder::new();
        rec.start();
        rec.append(0x123, 1.0, vec![0x01]);
        rec.stop();
        assert_eq!(rec.len(), 1);

        rec.start();
        assert!(rec.is_empty());
        assert!(rec.is_capturing());
    }

    #[test]
    fn test_stop_retains_buffer() {
        let mut rec = Recorder::new();
        rec.start();
        rec.append(0x123, 1.0, vec![0x01]);
        rec.stop();
        assert!(!rec.is_capturing());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_export_import_preserves_order() {
        let mut rec = Recorder::new();
        rec.start();
        for e in sample_events() {
            rec.append(e.id, e.time, e.data);
        }
        rec.stop();

        let mut sink = Vec::new();
        rec.export(&mut sink).unwrap();

        let imported = Recorder::import(sink.as_slice()).unwrap();
        assert_eq!(imported, sample_events());
    }

    #[test]
    fn test_import_accepts_flat_record_shape() {
        // The exact wire shape: an array of {id, time, data} objects.
        let json = r#"[{"id":291,"time":1000.25,"data":[170,187]}]"#;
        let events = Recorder::import(json.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 0x123);
        assert_eq!(events[0].data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_import_does_not_sort_by_time() {
        let json = r#"[{"id":1,"time":9.0,"data":[]},{"id":2,"time":1.0,"data":[]}]"#;
        let events = Recorder::import(json.as_bytes()).unwrap();
        assert_eq!(events[0].id, 1);
        assert_eq!(events[1].id, 2);
    }

    #[test]
    fn test_import_rejects_malformed_document() {
        assert!(Recorder::import(&b"{\"not\":\"an array\"}"[..]).is_err());
        assert!(Recorder::import(&b"[{\"id\":1}]"[..]).is_err());
    }
}
