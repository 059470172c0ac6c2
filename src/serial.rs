// src/serial.rs
//
// serialport-backed Transport implementation.
//
// Port enumeration and selection UI live outside the core; this module only
// opens a configured port and adapts it to the Transport trait. Configuration
// problems are fatal at connect time, read problems afterwards are not.

use std::io::Read;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::error::IoError;
use crate::transport::Transport;

/// Largest single read pulled off the port per poll.
const READ_CHUNK: usize = 4096;

/// Serial port configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port path (e.g., "/dev/ttyUSB0", "COM3").
    pub port: String,
    /// Baud rate (typically 115200 for USB-CAN bridges).
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8) - defaults to 8
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits (1, 2) - defaults to 1
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Parity ("none", "odd", "even") - defaults to "none"
    #[serde(default = "default_parity")]
    pub parity: String,
}

fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "none".to_string()
}

fn to_data_bits(bits: u8) -> Result<DataBits, IoError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(IoError::configuration(format!(
            "invalid data bits: {} (must be 5-8)",
            other
        ))),
    }
}

fn to_stop_bits(bits: u8) -> Result<StopBits, IoError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(IoError::configuration(format!(
            "invalid stop bits: {} (must be 1 or 2)",
            other
        ))),
    }
}

fn to_parity(parity: &str) -> Result<Parity, IoError> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        other => Err(IoError::configuration(format!(
            "invalid parity: '{}' (must be none, odd, or even)",
            other
        ))),
    }
}

/// Transport over a local serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open and configure the port. Invalid parameters or an unopenable port
    /// are fatal here; transient errors later are handled by the reader loop.
    pub fn open(config: &SerialConfig) -> Result<Self, IoError> {
        if config.baud_rate == 0 {
            return Err(IoError::configuration("baud rate must be non-zero"));
        }
        let data_bits = to_data_bits(config.data_bits)?;
        let stop_bits = to_stop_bits(config.stop_bits)?;
        let parity = to_parity(&config.parity)?;

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                IoError::configuration(format!("failed to open {}: {}", config.port, e))
            })?;

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn read_available(&mut self) -> Result<Vec<u8>, IoError> {
        let waiting = self
            .port
            .bytes_to_read()
            .map_err(|e| IoError::read(e.to_string()))? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; waiting.min(READ_CHUNK)];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(IoError::read(e.to_string())),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        self.port
            .write_all(bytes)
            .map_err(|e| IoError::write(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.port
            .flush()
            .map_err(|e| IoError::write(e.to_string()))
    }
}
