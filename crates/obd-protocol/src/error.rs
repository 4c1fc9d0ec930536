//! OBD-II Error Types

use thiserror::Error;

/// Errors raised by the serial link underneath the adapter
#[derive(Debug, Error)]
pub enum TransportError {
    /// Port could not be opened
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// Read or write failed on an open port
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted after the port was released
    #[error("Transport is closed")]
    Closed,
}

impl From<tokio_serial::Error> for TransportError {
    fn from(err: tokio_serial::Error) -> Self {
        TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Bad hex, bad length or otherwise undecodable bytes
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Adapter did not identify itself during the handshake
    #[error("OBD adapter not responding: {0}")]
    AdapterUnresponsive(String),

    /// No candidate bus protocol answered
    #[error("Failed to detect a vehicle protocol: {0}")]
    ProtocolDetectionFailed(String),

    /// Query attempted before the bus was reached or after close
    #[error("Not connected to the vehicle bus")]
    NotConnected,

    /// A response arrived but could not be parsed
    #[error("Protocol error for {command}: {detail}")]
    ProtocolError { command: String, detail: String },

    /// Bit-level access past the end of a payload
    #[error("Bit index {index} out of range for {len} bits")]
    IndexOutOfRange { index: usize, len: usize },

    /// Vehicle supply voltage outside the accepted window
    #[error("Vehicle voltage {0:.2} V out of range")]
    VoltageOutOfRange(f64),

    /// Command name or mode/PID not present in the registry
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Protocol id outside 1-9/A
    #[error("Invalid protocol id: {0}")]
    InvalidProtocol(String),

    /// Serial link failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ObdError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        ObdError::MalformedData(detail.into())
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(TransportError::Io(err))
    }
}
