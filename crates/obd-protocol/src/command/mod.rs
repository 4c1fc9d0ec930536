//! Command Registry
//!
//! A [`Command`] describes one diagnostic request: how to ask for it, how
//! many payload bytes to expect, and which decoder turns the reply into a
//! value. The process-wide [`CommandRegistry`] is built once and never
//! mutated afterwards.

mod registry;
mod table;

pub use registry::{registry, CommandRegistry};

use crate::decode::{DecodeContext, DecodeFn, DecodedValue};
use crate::error::ObdError;
use crate::mode;
use std::borrow::Cow;
use std::fmt;

/// CAN request header of the engine ECU, the adapter default
pub const ENGINE_HEADER: &str = "7E0";

/// Parameter id carried after the mode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterId {
    None,
    Byte(u8),
    Word(u16),
}

impl ParameterId {
    pub fn echo(&self) -> Vec<u8> {
        match *self {
            ParameterId::None => Vec::new(),
            ParameterId::Byte(b) => vec![b],
            ParameterId::Word(w) => w.to_be_bytes().to_vec(),
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            ParameterId::None => None,
            ParameterId::Byte(b) => Some(u16::from(b)),
            ParameterId::Word(w) => Some(w),
        }
    }

    fn to_hex(self) -> String {
        match self {
            ParameterId::None => String::new(),
            ParameterId::Byte(b) => format!("{b:02X}"),
            ParameterId::Word(w) => format!("{w:04X}"),
        }
    }
}

/// Expected payload size, echo bytes excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    Fixed(usize),
    Variable,
}

/// Static description of one diagnostic request
#[derive(Debug, Clone)]
pub struct Command {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub mode: u8,
    pub pid: ParameterId,
    pub response: ResponseLength,
    pub decode: DecodeFn,
    /// Valid physical range for numeric results
    pub range: Option<(f64, f64)>,
    /// Answers with a 32-bit supported-PID bitmask
    pub pid_getter: bool,
    /// Eligible for the frame-count suffix in fast mode
    pub fast: bool,
    /// Only defined on CAN buses
    pub can_only: bool,
    /// Request header (`ATSH`); `None` addresses the engine
    pub header: Option<&'static str>,
}

impl Command {
    /// Registry key
    pub fn key(&self) -> (u8, ParameterId) {
        (self.mode, self.pid)
    }

    /// Address this command to another ECU, e.g. `7E1` for the transmission
    pub fn with_header(mut self, header: &'static str) -> Self {
        self.header = Some(header);
        self
    }

    pub fn header(&self) -> &'static str {
        self.header.unwrap_or(ENGINE_HEADER)
    }

    /// Request string sent to the adapter, e.g. `010C`
    pub fn request(&self) -> String {
        format!("{:02X}{}", self.mode, self.pid.to_hex())
    }

    /// Request with the expected frame count appended (single hex digit)
    pub fn request_with_frames(&self, frames: usize) -> String {
        match frames {
            1..=15 => format!("{}{:X}", self.request(), frames),
            _ => self.request(),
        }
    }

    /// Strip the echo bytes from a reassembled message.
    ///
    /// Returns `Ok(None)` when the ECU answered without enough data for this
    /// command, which is reported as no data rather than an error.
    pub fn extract_payload<'a>(
        &self,
        data: &'a [u8],
        is_can: bool,
    ) -> Result<Option<&'a [u8]>, ObdError> {
        let Some((&echo_mode, rest)) = data.split_first() else {
            return Ok(None);
        };
        if echo_mode == mode::NEGATIVE_RESPONSE {
            return Ok(None);
        }
        if echo_mode != self.mode.wrapping_add(mode::RESPONSE_OFFSET) {
            return Err(ObdError::ProtocolError {
                command: self.name.to_string(),
                detail: format!("unexpected mode echo {echo_mode:02X}"),
            });
        }

        let payload = match self.mode {
            mode::TEST_RESULTS if !self.pid_getter => rest,
            mode::READ_DTC | mode::PENDING_DTC if is_can => rest.get(1..).unwrap_or(&[]),
            _ => {
                let echo = self.pid.echo();
                if rest.len() < echo.len() {
                    return Ok(None);
                }
                let (pid, payload) = rest.split_at(echo.len());
                if pid != echo.as_slice() {
                    return Err(ObdError::ProtocolError {
                        command: self.name.to_string(),
                        detail: format!("unexpected PID echo {pid:02X?}"),
                    });
                }
                payload
            }
        };

        match self.response {
            ResponseLength::Fixed(n) if payload.len() < n => Ok(None),
            ResponseLength::Fixed(n) => Ok(Some(&payload[..n])),
            ResponseLength::Variable => Ok(Some(payload)),
        }
    }

    /// Decode one message's data, echo included
    pub fn decode_message(
        &self,
        data: &[u8],
        is_can: bool,
        ctx: &DecodeContext,
    ) -> Result<DecodedValue, ObdError> {
        Ok(match self.extract_payload(data, is_can)? {
            Some(payload) => (self.decode)(payload, ctx),
            None => DecodedValue::NoData,
        })
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.name == other.name
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.request(), self.description)
    }
}
