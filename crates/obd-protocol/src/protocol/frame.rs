//! Frame and Message model

use serde::Serialize;
use std::fmt;

/// Bus address of a responding ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EcuAddress(pub u32);

impl fmt::Display for EcuAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0xFF {
            write!(f, "{:03X}", self.0)
        } else {
            write!(f, "{:02X}", self.0)
        }
    }
}

/// Position of a frame within its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    /// Complete CAN payload in one frame
    Single,
    /// Opens a multi-frame CAN message and declares its total length
    First { total_len: usize },
    /// Continues a multi-frame CAN message, cyclic index 0-15
    Consecutive { index: u8 },
    /// Non-CAN line, optionally ordered by a sequence byte inside the data
    Legacy,
}

/// One reply unit taken from a single response line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Raw bytes of the line, header and checksum included
    pub raw: Vec<u8>,
    /// Payload carried by this frame
    pub data: Vec<u8>,
    pub source: EcuAddress,
    pub target: u8,
    pub priority: u8,
    pub kind: FrameKind,
}

/// Reassembled reply from one ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub source: EcuAddress,
    /// Concatenated payload, mode/PID echo still present
    pub data: Vec<u8>,
    pub frames: Vec<Frame>,
}

impl Message {
    /// Raw hex of every frame, one line each
    pub fn raw(&self) -> String {
        self.frames
            .iter()
            .map(|f| crate::bytes::bytes_to_hex(&f.raw))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Adapter status lines that carry no frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AdapterSignal {
    NoData,
    Stopped,
    UnableToConnect,
    BusInitError,
    CanError,
    BufferFull,
    BusBusy,
    Searching,
    Error(String),
    Other(String),
}

impl AdapterSignal {
    /// Classify a non-frame line; `None` for lines that look like frame data
    pub fn classify(line: &str) -> Option<Self> {
        let upper = line.trim().to_ascii_uppercase();
        let signal = if upper.contains("NO DATA") {
            AdapterSignal::NoData
        } else if upper.contains("STOPPED") {
            AdapterSignal::Stopped
        } else if upper.contains("UNABLE TO CONNECT") {
            AdapterSignal::UnableToConnect
        } else if upper.contains("BUS INIT") && upper.contains("ERROR") {
            AdapterSignal::BusInitError
        } else if upper.contains("CAN ERROR") {
            AdapterSignal::CanError
        } else if upper.contains("BUFFER FULL") {
            AdapterSignal::BufferFull
        } else if upper.contains("BUS BUSY") {
            AdapterSignal::BusBusy
        } else if upper.starts_with("SEARCHING") {
            AdapterSignal::Searching
        } else if upper.contains("ERROR") || upper == "?" {
            AdapterSignal::Error(line.trim().to_string())
        } else if crate::bytes::is_hex_line(&upper) {
            return None;
        } else {
            AdapterSignal::Other(line.trim().to_string())
        };
        Some(signal)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            AdapterSignal::UnableToConnect
                | AdapterSignal::BusInitError
                | AdapterSignal::CanError
                | AdapterSignal::BufferFull
                | AdapterSignal::BusBusy
                | AdapterSignal::Error(_)
        )
    }
}

impl fmt::Display for AdapterSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterSignal::NoData => f.write_str("NO DATA"),
            AdapterSignal::Stopped => f.write_str("STOPPED"),
            AdapterSignal::UnableToConnect => f.write_str("UNABLE TO CONNECT"),
            AdapterSignal::BusInitError => f.write_str("BUS INIT: ERROR"),
            AdapterSignal::CanError => f.write_str("CAN ERROR"),
            AdapterSignal::BufferFull => f.write_str("BUFFER FULL"),
            AdapterSignal::BusBusy => f.write_str("BUS BUSY"),
            AdapterSignal::Searching => f.write_str("SEARCHING..."),
            AdapterSignal::Error(line) | AdapterSignal::Other(line) => f.write_str(line),
        }
    }
}

/// Outcome of parsing one adapter response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub messages: Vec<Message>,
    pub signals: Vec<AdapterSignal>,
    /// Frames or messages discarded as malformed
    pub dropped: usize,
}

impl ParsedResponse {
    pub fn has_error_signal(&self) -> bool {
        self.signals.iter().any(AdapterSignal::is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_signals() {
        assert_eq!(AdapterSignal::classify("NO DATA"), Some(AdapterSignal::NoData));
        assert_eq!(
            AdapterSignal::classify("UNABLE TO CONNECT"),
            Some(AdapterSignal::UnableToConnect)
        );
        assert_eq!(
            AdapterSignal::classify("BUS INIT: ...ERROR"),
            Some(AdapterSignal::BusInitError)
        );
        assert_eq!(AdapterSignal::classify("SEARCHING..."), Some(AdapterSignal::Searching));
        assert_eq!(AdapterSignal::classify("7E8 03 41 0D 3C"), None);
        assert!(AdapterSignal::classify("CAN ERROR").unwrap().is_error());
        assert!(!AdapterSignal::classify("BUS INIT: ...OK").unwrap().is_error());
    }

    #[test]
    fn test_address_display() {
        assert_eq!(EcuAddress(0x7E8).to_string(), "7E8");
        assert_eq!(EcuAddress(0x10).to_string(), "10");
    }
}
