//! OBD-II Protocol Implementation
//!
//! This crate provides async communication with ELM327-compatible OBD-II
//! adapters. It supports ISO 15765-4 (CAN), SAE J1939 and the legacy
//! J1850, ISO 9141-2 and ISO 14230-4 buses.
//!
//! ```no_run
//! use obd_protocol::{registry, ConnectOptions, Connection, SerialTransport};
//!
//! # async fn run() -> Result<(), obd_protocol::ObdError> {
//! let transport = SerialTransport::open("/dev/ttyUSB0", 38400)?;
//! let conn = Connection::open(Box::new(transport), ConnectOptions::default()).await?;
//! for response in conn.query(registry().resolve("RPM")?).await? {
//!     println!("{}", response.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bits;
pub mod bytes;
pub mod command;
mod connection;
pub mod decode;
mod error;
pub mod protocol;
pub mod transport;
pub mod units;

pub use command::{registry, Command, CommandRegistry, ParameterId, ResponseLength, ENGINE_HEADER};
pub use connection::{ConnectOptions, Connection, ConnectionStatus, DecodedResponse};
pub use decode::{DecodeContext, DecodedValue, Dtc};
pub use error::{ObdError, TransportError};
pub use protocol::{EcuAddress, EcuRole, ObdProtocol};
pub use transport::{MockAdapter, SerialTransport, Transport};
pub use units::{Quantity, Unit, UnitsPreference};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// On-board monitoring test results
    pub const TEST_RESULTS: u8 = 0x06;
    /// Pending trouble codes from the current drive cycle
    pub const PENDING_DTC: u8 = 0x07;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Added to the request mode in positive responses
    pub const RESPONSE_OFFSET: u8 = 0x40;
    /// Mode byte of a negative response
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}
