// src/codec.rs
//
// ASCII-hex line codec for the serial CAN bridge protocol.
//
// Frame format: T<ID:3hex><DLC:1hex><DATA:2hex*DLC>
//
// Inbound frames arrive one per newline-delimited line. Outbound frames are
// followed by a literal "END" line, a transport-level terminator the bridge
// firmware requires after every frame.

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// First character of every frame line.
pub const FRAME_MARKER: char = 'T';

/// Transport-level terminator appended after every encoded frame.
pub const END_SENTINEL: &str = "END";

/// Maximum data length for a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

/// Maximum 3-hex-digit frame identifier.
pub const MAX_FRAME_ID: u16 = 0xFFF;

/// One CAN message: identifier plus up to 8 data bytes.
///
/// The DLC is not stored separately; it is always `data.len()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Frame identifier (0..=0xFFF, rendered as 3 hex digits on the wire).
    pub id: u16,
    /// Frame data (0..=8 bytes).
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Build a frame, validating the identifier range and data length.
    pub fn new(id: u16, data: Vec<u8>) -> Result<Self, IoError> {
        if id > MAX_FRAME_ID {
            return Err(IoError::protocol(
                "codec",
                format!("frame id {:#X} exceeds {:#X}", id, MAX_FRAME_ID),
            ));
        }
        if data.len() > MAX_DATA_LEN {
            return Err(IoError::protocol(
                "codec",
                format!("data too long: {} bytes (max {})", data.len(), MAX_DATA_LEN),
            ));
        }
        Ok(CanFrame { id, data })
    }

    /// Data Length Code, always equal to the data length.
    pub fn dlc(&self) -> u8 {
        self.data.len() as u8
    }
}

/// Decode one frame line.
///
/// Returns `Ok(None)` for a line that is empty after trimming — blank lines
/// are not an error, they simply produce no frame. Any malformed line yields
/// an error the caller is expected to drop, leaving the stream usable for
/// the next line.
///
/// Examples:
///   `T1233010203` -> ID=0x123, DLC=3, data=01 02 03
///   `T0010`       -> ID=0x001, DLC=0, no data
pub fn decode(line: &str) -> Result<Option<CanFrame>, IoError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let bytes = line.as_bytes();
    if bytes[0] != FRAME_MARKER as u8 {
        return Err(IoError::protocol(
            "codec",
            format!("invalid frame prefix: '{}'", bytes[0] as char),
        ));
    }

    // prefix + ID + DLC
    if bytes.len() < 5 {
        return Err(IoError::protocol(
            "codec",
            format!("frame too short: {} bytes, need at least 5", bytes.len()),
        ));
    }

    // Parse frame ID (3 hex digits)
    let id_str = std::str::from_utf8(&bytes[1..4])
        .map_err(|_| IoError::protocol("codec", "invalid UTF-8 in frame ID"))?;
    let id = u16::from_str_radix(id_str, 16)
        .map_err(|_| IoError::protocol("codec", format!("invalid hex ID: {}", id_str)))?;

    // Parse DLC (single hex digit)
    let dlc_char = bytes[4] as char;
    let dlc = dlc_char.to_digit(16).ok_or_else(|| {
        IoError::protocol("codec", format!("invalid DLC character: '{}'", dlc_char))
    })? as usize;

    if dlc > MAX_DATA_LEN {
        return Err(IoError::protocol(
            "codec",
            format!("invalid DLC: {} (max {})", dlc, MAX_DATA_LEN),
        ));
    }

    // Parse data bytes (pairs of hex characters)
    let expected_len = 5 + dlc * 2;
    if bytes.len() < expected_len {
        return Err(IoError::protocol(
            "codec",
            format!(
                "incomplete data: {} bytes, need {}",
                bytes.len(),
                expected_len
            ),
        ));
    }

    let data_str = std::str::from_utf8(&bytes[5..expected_len])
        .map_err(|_| IoError::protocol("codec", "invalid UTF-8 in data bytes"))?;
    let data = hex::decode(data_str)
        .map_err(|e| IoError::protocol("codec", format!("invalid hex data: {}", e)))?;

    Ok(Some(CanFrame { id, data }))
}

/// Encode a frame body: marker, 3 uppercase hex ID digits, 1 hex DLC digit,
/// 2 uppercase hex digits per data byte. No newline.
pub fn encode_line(frame: &CanFrame) -> String {
    let mut line = String::with_capacity(5 + frame.data.len() * 2);
    line.push(FRAME_MARKER);
    line.push_str(&format!("{:03X}", frame.id & MAX_FRAME_ID));
    line.push_str(&format!("{:X}", frame.data.len().min(MAX_DATA_LEN)));
    line.push_str(&hex::encode_upper(&frame.data));
    line
}

/// Encode a frame for transmission, including the END terminator line.
pub fn encode(frame: &CanFrame) -> String {
    format!("{}\n{}\n", encode_line(frame), END_SENTINEL)
}
