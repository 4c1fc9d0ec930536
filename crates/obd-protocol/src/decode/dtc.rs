//! Diagnostic Trouble Codes

use super::tables::powertrain_group;
use super::{DecodeContext, DecodedValue};
use serde::Serialize;
use std::fmt;

/// System a trouble code belongs to, from the top two bits of its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DtcCategory {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl DtcCategory {
    pub fn letter(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }
}

/// A decoded trouble code such as `P0133`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Dtc {
    pub category: DtcCategory,
    /// Four character code following the category letter
    pub code: String,
}

impl Dtc {
    /// Decode one 2-byte code; `00 00` is padding and yields `None`
    pub fn from_bytes(high: u8, low: u8) -> Option<Self> {
        if high == 0 && low == 0 {
            return None;
        }
        let category = DtcCategory::from_bits(high >> 6);
        let code = format!("{}{:03X}", (high >> 4) & 0b11, (u16::from(high & 0x0F) << 8) | u16::from(low));
        Some(Self { category, code })
    }

    /// The 14-bit code value below the category bits
    pub fn numeric(&self) -> u16 {
        let digit = self.code.as_bytes().first().map(|b| b - b'0').unwrap_or(0);
        let rest = u16::from_str_radix(self.code.get(1..).unwrap_or("0"), 16).unwrap_or(0);
        (u16::from(digit) << 12) | rest
    }

    /// SAE group this code falls into, known for powertrain codes only
    pub fn group_description(&self) -> Option<&'static str> {
        if self.category != DtcCategory::Powertrain {
            return None;
        }
        self.code.get(0..2).and_then(powertrain_group)
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.category.letter(), self.code)
    }
}

/// Parse a payload of consecutive 2-byte codes, dropping padding and any odd trailing byte
pub fn parse_dtcs(payload: &[u8]) -> Vec<Dtc> {
    payload
        .chunks_exact(2)
        .filter_map(|pair| Dtc::from_bytes(pair[0], pair[1]))
        .collect()
}

/// Mode 03/07 trouble code list
pub fn dtc_list(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    DecodedValue::Dtcs(parse_dtcs(payload))
}

/// Freeze frame trigger code (mode 01 PID 02)
pub fn single_dtc(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [high, low, ..] => DecodedValue::Dtcs(Dtc::from_bytes(*high, *low).into_iter().collect()),
        _ => DecodedValue::NoData,
    }
}
