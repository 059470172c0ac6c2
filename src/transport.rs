// src/transport.rs
//
// Abstract duplex byte transport plus an in-memory implementation.
//
// The core treats its transport as an opaque object: a non-blocking read of
// whatever is available, a write, and a flush. Serial ports, TCP bridges, or
// test doubles all fit behind this trait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::IoError;

/// Duplex byte stream the monitor core runs on.
pub trait Transport: Send {
    /// Read whatever bytes are available right now. May return an empty
    /// vector; must not block waiting for data.
    fn read_available(&mut self) -> Result<Vec<u8>, IoError>;

    /// Write bytes to the peer.
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError>;

    /// Push any buffered output to the peer.
    fn flush(&mut self) -> Result<(), IoError>;
}

/// Transport handle shared between the reader task and the sender tasks.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport for shared access.
pub fn shared(transport: impl Transport + 'static) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

// ============================================================================
// In-Memory Transport
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    /// Scripted inbound chunks; each entry is one `read_available` result.
    inbound: VecDeque<Vec<u8>>,
    /// Everything written by the core.
    written: Vec<u8>,
    flushes: usize,
    /// Number of upcoming reads that fail.
    failing_reads: usize,
    /// When set, writes fail.
    failing_writes: bool,
}

/// In-memory transport double.
///
/// Clones are handles to the same channel, so a test (or a replay harness)
/// can keep one handle to script inbound chunks and inspect outbound bytes
/// while the core owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Queue one chunk to be returned by the next `read_available`.
    pub fn push_inbound(&self, chunk: &[u8]) {
        self.inner.lock().unwrap().inbound.push_back(chunk.to_vec());
    }

    /// Bytes written by the core so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Take and clear the written bytes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.lock().unwrap().written)
    }

    pub fn flush_count(&self) -> usize {
        self.inner.lock().unwrap().flushes
    }

    /// Make the next `n` reads fail with a read error.
    pub fn fail_next_reads(&self, n: usize) {
        self.inner.lock().unwrap().failing_reads = n;
    }

    /// Toggle write failures.
    pub fn set_write_error(&self, failing: bool) {
        self.inner.lock().unwrap().failing_writes = failing;
    }
}

impl Transport for MemoryTransport {
    fn read_available(&mut self) -> Result<Vec<u8>, IoError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(IoError::read("simulated read failure"));
        }
        Ok(inner.inbound.pop_front().unwrap_or_default())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_writes {
            return Err(IoError::write("simulated write failure"));
        }
        inner.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IoError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_writes {
            return Err(IoError::write("simulated flush failure"));
        }
        inner.flushes += 1;
        Ok(())
    }
}
