// src/lib.rs
//
// canmon: core engine for monitoring and injecting CAN frames through an
// ASCII serial bridge.
//
// The crate decodes the bridge's newline-delimited T<ID><DLC><DATA> protocol
// into structured frames, keeps live per-identifier statistics, captures and
// replays frame sequences, and injects frames single-shot, in batches, or
// periodically. `Session` is the front-end-facing entry point; everything
// below it works against the `Transport` trait so serial hardware and the
// in-memory test double are interchangeable.

#[macro_use]
pub mod logging;

pub mod changes;
pub mod codec;
pub mod config;
pub mod error;
pub mod framing;
pub mod recorder;
pub mod sender;
pub mod serial;
pub mod session;
pub mod stats;
pub mod transport;

pub use changes::{ByteDiff, ChangeTracker, Highlight};
pub use codec::CanFrame;
pub use config::MonitorConfig;
pub use error::IoError;
pub use recorder::{RecordedEvent, Recorder};
pub use sender::PeriodicFrame;
pub use serial::{SerialConfig, SerialTransport};
pub use session::Session;
pub use stats::{FrameStats, StatsTable};
pub use transport::{MemoryTransport, Transport};

/// Current wallclock time in microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
