//! Decoder Library
//!
//! Pure functions turning a response payload (mode/PID echo already removed)
//! into a typed [`DecodedValue`]. Decoders never perform I/O and report a
//! short payload as [`DecodedValue::NoData`] instead of failing.

pub mod decoders;
pub mod dtc;
pub mod monitor;
pub mod status;
pub mod tables;

use crate::units::{Quantity, UnitsPreference};
use serde::Serialize;
use std::fmt;

pub use dtc::{Dtc, DtcCategory};
pub use monitor::MonitorTest;
pub use status::{IgnitionType, MonitorStatus, ReadinessTest};

/// Inputs a decoder may consult besides the payload
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeContext {
    pub units: UnitsPreference,
}

/// Function reference held by each command
pub type DecodeFn = fn(&[u8], &DecodeContext) -> DecodedValue;

/// A named boolean, e.g. one O2 sensor position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedFlag {
    pub name: String,
    pub set: bool,
}

/// 32-bit supported-PID bitmask; bit 0 (MSB) is the PID after the getter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PidSupport {
    pub mask: u32,
}

impl PidSupport {
    /// PIDs flagged as supported, relative to the getter's own PID
    pub fn supported(&self, base: u8) -> Vec<u8> {
        (0..32u8)
            .filter(|i| self.mask & (0x8000_0000 >> i) != 0)
            .filter_map(|i| base.checked_add(i + 1))
            .collect()
    }

    /// Whether the next getter in the chain is flagged
    pub fn has_next_block(&self) -> bool {
        self.mask & 1 != 0
    }
}

/// Kind-tagged result of decoding one message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DecodedValue {
    Numeric(Quantity),
    Flag(bool),
    Flags(Vec<NamedFlag>),
    Readiness(MonitorStatus),
    Text(String),
    Texts(Vec<String>),
    Dtcs(Vec<Dtc>),
    PidSupport(PidSupport),
    MonitorResults(Vec<MonitorTest>),
    Raw(Vec<u8>),
    /// Command is defined but carries no decodable value
    Unsupported,
    /// The vehicle did not answer or answered too little
    NoData,
}

impl DecodedValue {
    pub fn is_no_data(&self) -> bool {
        matches!(self, DecodedValue::NoData)
    }

    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            DecodedValue::Numeric(q) => Some(*q),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Numeric(q) => write!(f, "{q}"),
            DecodedValue::Flag(b) => write!(f, "{b}"),
            DecodedValue::Flags(flags) => {
                let parts: Vec<String> = flags
                    .iter()
                    .map(|flag| format!("{}={}", flag.name, flag.set))
                    .collect();
                f.write_str(&parts.join(" "))
            }
            DecodedValue::Readiness(status) => {
                write!(
                    f,
                    "MIL {} / {} DTC(s) / {:?} ignition",
                    if status.mil { "on" } else { "off" },
                    status.dtc_count,
                    status.ignition
                )?;
                for test in &status.tests {
                    write!(
                        f,
                        "\n  {:<36} available={} complete={}",
                        test.name, test.available, test.complete
                    )?;
                }
                Ok(())
            }
            DecodedValue::Text(text) => f.write_str(text),
            DecodedValue::Texts(texts) => f.write_str(&texts.join(" / ")),
            DecodedValue::Dtcs(codes) if codes.is_empty() => f.write_str("no trouble codes"),
            DecodedValue::Dtcs(codes) => {
                let parts: Vec<String> = codes
                    .iter()
                    .map(|dtc| match dtc.group_description() {
                        Some(group) => format!("{dtc} ({group})"),
                        None => dtc.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join("\n"))
            }
            DecodedValue::PidSupport(support) => write!(f, "{:08X}", support.mask),
            DecodedValue::MonitorResults(tests) => {
                let parts: Vec<String> = tests
                    .iter()
                    .map(|t| {
                        format!(
                            "{} {} [{} .. {}] {}",
                            t.name,
                            t.value,
                            t.min,
                            t.max,
                            if t.passed() { "PASS" } else { "FAIL" }
                        )
                    })
                    .collect();
                f.write_str(&parts.join("\n"))
            }
            DecodedValue::Raw(bytes) => f.write_str(&crate::bytes::bytes_to_hex(bytes)),
            DecodedValue::Unsupported => f.write_str("unsupported"),
            DecodedValue::NoData => f.write_str("no data"),
        }
    }
}
