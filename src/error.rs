// src/error.rs
//
// Error taxonomy for the monitor core.
//
// Recoverable and fatal conditions are kept in one enum so call sites can
// match on the category: malformed lines are dropped, read failures retried
// with back-off, write failures surfaced to the sender's caller, and
// configuration problems are fatal at connect time.

use std::fmt;

/// Error type shared by the codec, transport, and sender layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IoError {
    /// Malformed protocol line. The line is dropped and the stream continues.
    Protocol { context: String, message: String },
    /// Transport read failure. The reader backs off and retries.
    Read { message: String },
    /// Transport write failure. Surfaced to the caller of the send operation.
    Write { message: String },
    /// A batch send was rejected because another one is in flight.
    Busy { message: String },
    /// Invalid transport parameters. Fatal at connect time.
    Configuration { message: String },
}

impl IoError {
    pub fn protocol(context: impl Into<String>, message: impl fmt::Display) -> Self {
        IoError::Protocol {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn read(message: impl fmt::Display) -> Self {
        IoError::Read {
            message: message.to_string(),
        }
    }

    pub fn write(message: impl fmt::Display) -> Self {
        IoError::Write {
            message: message.to_string(),
        }
    }

    pub fn busy(message: impl fmt::Display) -> Self {
        IoError::Busy {
            message: message.to_string(),
        }
    }

    pub fn configuration(message: impl fmt::Display) -> Self {
        IoError::Configuration {
            message: message.to_string(),
        }
    }

    /// Whether the owning loop may keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IoError::Protocol { .. } | IoError::Read { .. })
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Protocol { context, message } => {
                write!(f, "protocol error ({}): {}", context, message)
            }
            IoError::Read { message } => write!(f, "read error: {}", message),
            IoError::Write { message } => write!(f, "write error: {}", message),
            IoError::Busy { message } => write!(f, "busy: {}", message),
            IoError::Configuration { message } => write!(f, "configuration error: {}", message),
        }
    }
}

impl std::error::Error for IoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(IoError::protocol("codec", "bad hex").is_recoverable());
        assert!(IoError::read("port gone").is_recoverable());
        assert!(!IoError::write("port gone").is_recoverable());
        assert!(!IoError::busy("batch in flight").is_recoverable());
        assert!(!IoError::configuration("bad parity").is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let e = IoError::protocol("codec", "invalid DLC character: 'x'");
        assert_eq!(
            e.to_string(),
            "protocol error (codec): invalid DLC character: 'x'"
        );
    }
}
