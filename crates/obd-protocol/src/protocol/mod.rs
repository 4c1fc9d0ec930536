//! OBD-II bus protocols and response parsing
//!
//! The adapter prints each bus frame as one line of hex. A [`Protocol`]
//! turns those lines into [`Frame`]s, groups them by source ECU and
//! reassembles each group into a [`Message`].

mod can;
mod ecu;
mod frame;
mod legacy;

pub use can::CanParser;
pub use ecu::{EcuMap, EcuRole};
pub use frame::{AdapterSignal, EcuAddress, Frame, FrameKind, Message, ParsedResponse};
pub use legacy::{Checksum, LegacyParser};

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Turns adapter lines into frames and frames into messages
pub trait FrameParser: Send + Sync {
    /// Parse one response line
    fn parse_frame(&self, line: &str) -> Result<Frame, ObdError>;

    /// Join every frame received from one ECU into a single message
    fn assemble(&self, source: EcuAddress, frames: Vec<Frame>) -> Result<Message, ObdError>;
}

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
    /// SAE J1939 (29 bit ID, 250 kbaud)
    SaeJ1939,
}

impl ObdProtocol {
    /// Fallback order when the adapter's own search fails
    pub const AUTO_ORDER: [ObdProtocol; 10] = [
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::J1850Pwm,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can29bit250,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::SaeJ1939,
    ];

    /// Single-character id used by `ATSP`, `ATTP` and `ATDPN`
    pub fn elm_id(&self) -> char {
        match self {
            ObdProtocol::Auto => '0',
            ObdProtocol::J1850Pwm => '1',
            ObdProtocol::J1850Vpw => '2',
            ObdProtocol::Iso9141_2 => '3',
            ObdProtocol::Iso14230_4Kwp => '4',
            ObdProtocol::Iso14230_4KwpFast => '5',
            ObdProtocol::Iso15765_4Can11bit500 => '6',
            ObdProtocol::Iso15765_4Can29bit500 => '7',
            ObdProtocol::Iso15765_4Can11bit250 => '8',
            ObdProtocol::Iso15765_4Can29bit250 => '9',
            ObdProtocol::SaeJ1939 => 'A',
        }
    }

    pub fn from_elm_id(id: char) -> Option<Self> {
        let id = id.to_ascii_uppercase();
        std::iter::once(ObdProtocol::Auto)
            .chain(Self::AUTO_ORDER)
            .find(|p| p.elm_id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "Automatic",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 (KWP 5BAUD)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 (KWP FAST)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 (CAN 11/500)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 (CAN 29/500)",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 (CAN 11/250)",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 (CAN 29/250)",
            ObdProtocol::SaeJ1939 => "SAE J1939 (CAN 29/250)",
        }
    }

    /// Get the ELM327 AT command selecting this protocol
    pub fn to_elm_command(&self) -> String {
        format!("ATSP{}", self.elm_id())
    }

    /// Get the ELM327 AT command trying this protocol without storing it
    pub fn try_command(&self) -> String {
        format!("ATTP{}", self.elm_id())
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
                | ObdProtocol::SaeJ1939
        )
    }

    /// Header id width, `None` for legacy buses
    pub fn id_bits(&self) -> Option<u8> {
        match self {
            ObdProtocol::Iso15765_4Can11bit500 | ObdProtocol::Iso15765_4Can11bit250 => Some(11),
            ObdProtocol::Iso15765_4Can29bit500
            | ObdProtocol::Iso15765_4Can29bit250
            | ObdProtocol::SaeJ1939 => Some(29),
            _ => None,
        }
    }
}

impl fmt::Display for ObdProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObdProtocol {
    type Err = ObdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(ObdProtocol::Auto);
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(id), None) => {
                Self::from_elm_id(id).ok_or_else(|| ObdError::InvalidProtocol(s.to_string()))
            }
            _ => Err(ObdError::InvalidProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for ObdProtocol {
    type Error = ObdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObdProtocol> for String {
    fn from(protocol: ObdProtocol) -> Self {
        match protocol {
            ObdProtocol::Auto => "auto".to_string(),
            other => other.elm_id().to_string(),
        }
    }
}

/// A selected bus protocol together with its frame parser
pub struct Protocol {
    kind: ObdProtocol,
    parser: Box<dyn FrameParser>,
}

impl Protocol {
    pub fn new(kind: ObdProtocol) -> Result<Self, ObdError> {
        let parser: Box<dyn FrameParser> = match kind {
            ObdProtocol::Auto => {
                return Err(ObdError::InvalidProtocol(
                    "automatic detection has no parser".to_string(),
                ))
            }
            ObdProtocol::J1850Pwm | ObdProtocol::J1850Vpw => {
                Box::new(LegacyParser::new(Checksum::J1850Crc))
            }
            ObdProtocol::Iso9141_2 | ObdProtocol::Iso14230_4Kwp | ObdProtocol::Iso14230_4KwpFast => {
                Box::new(LegacyParser::new(Checksum::Sum8))
            }
            can => Box::new(CanParser::new(can.id_bits().unwrap_or(11))),
        };
        Ok(Self { kind, parser })
    }

    pub fn kind(&self) -> ObdProtocol {
        self.kind
    }

    pub fn is_can(&self) -> bool {
        self.kind.is_can()
    }

    /// Parse the lines of one adapter response.
    ///
    /// Status lines become [`AdapterSignal`]s. Lines or message groups that
    /// fail to parse are counted in `dropped` and skipped; messages from
    /// other ECUs are kept.
    pub fn parse<S: AsRef<str>>(&self, lines: &[S]) -> ParsedResponse {
        let mut response = ParsedResponse::default();
        let mut groups: Vec<(EcuAddress, Vec<Frame>)> = Vec::new();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            if let Some(signal) = AdapterSignal::classify(line) {
                debug!("Adapter signal: {}", signal);
                response.signals.push(signal);
                continue;
            }
            match self.parser.parse_frame(line) {
                Ok(frame) => match groups.iter_mut().find(|(source, _)| *source == frame.source) {
                    Some((_, frames)) => frames.push(frame),
                    None => groups.push((frame.source, vec![frame])),
                },
                Err(e) => {
                    warn!("Dropping frame: {}", e);
                    response.dropped += 1;
                }
            }
        }

        for (source, frames) in groups {
            match self.parser.assemble(source, frames) {
                Ok(message) => response.messages.push(message),
                Err(e) => {
                    warn!("Dropping message from {}: {}", source, e);
                    response.dropped += 1;
                }
            }
        }
        response
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol").field("kind", &self.kind).finish()
    }
}
