//! Physical Units and Standard Scaling
//!
//! Decoders produce metric [`Quantity`] values; a [`UnitsPreference`] converts
//! them for display. The Units-and-Scaling (UAS) table maps the SAE J1979
//! scaling ids used by on-board monitor results to a conversion.

use crate::bytes::{bytes_to_int, twos_complement};
use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Units a decoded quantity can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Count,
    Ratio,
    Percent,
    Boolean,
    Rpm,
    Kph,
    Mph,
    Volt,
    Millivolt,
    Ampere,
    Milliampere,
    Microampere,
    Second,
    Millisecond,
    Microsecond,
    Minute,
    Ohm,
    Milliohm,
    Kiloohm,
    Celsius,
    Fahrenheit,
    Kilopascal,
    Pascal,
    Psi,
    Degree,
    Hertz,
    Millihertz,
    Kilohertz,
    Kilometer,
    Mile,
    Inch,
    Gram,
    Milligram,
    GramsPerSecond,
    PoundsPerMinute,
    KilogramsPerHour,
    LitersPerHour,
    GallonsPerHour,
    Liter,
    SquareMillimeter,
    PartsPerMillion,
    PascalsPerSecond,
    MillivoltsPerMillisecond,
    MillivoltsPerSecond,
    NewtonMeter,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Count => "count",
            Unit::Ratio => "ratio",
            Unit::Percent => "%",
            Unit::Boolean => "",
            Unit::Rpm => "rpm",
            Unit::Kph => "km/h",
            Unit::Mph => "mph",
            Unit::Volt => "V",
            Unit::Millivolt => "mV",
            Unit::Ampere => "A",
            Unit::Milliampere => "mA",
            Unit::Microampere => "µA",
            Unit::Second => "s",
            Unit::Millisecond => "ms",
            Unit::Microsecond => "µs",
            Unit::Minute => "min",
            Unit::Ohm => "Ω",
            Unit::Milliohm => "mΩ",
            Unit::Kiloohm => "kΩ",
            Unit::Celsius => "°C",
            Unit::Fahrenheit => "°F",
            Unit::Kilopascal => "kPa",
            Unit::Pascal => "Pa",
            Unit::Psi => "psi",
            Unit::Degree => "°",
            Unit::Hertz => "Hz",
            Unit::Millihertz => "mHz",
            Unit::Kilohertz => "kHz",
            Unit::Kilometer => "km",
            Unit::Mile => "mi",
            Unit::Inch => "in",
            Unit::Gram => "g",
            Unit::Milligram => "mg",
            Unit::GramsPerSecond => "g/s",
            Unit::PoundsPerMinute => "lb/min",
            Unit::KilogramsPerHour => "kg/h",
            Unit::LitersPerHour => "L/h",
            Unit::GallonsPerHour => "gal/h",
            Unit::Liter => "L",
            Unit::SquareMillimeter => "mm²",
            Unit::PartsPerMillion => "ppm",
            Unit::PascalsPerSecond => "Pa/s",
            Unit::MillivoltsPerMillisecond => "mV/ms",
            Unit::MillivoltsPerSecond => "mV/s",
            Unit::NewtonMeter => "Nm",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric value with its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = if self.value.fract() == 0.0 {
            format!("{}", self.value)
        } else {
            let fixed = format!("{:.3}", self.value);
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        };
        match self.unit {
            Unit::Boolean => f.write_str(if self.value != 0.0 { "true" } else { "false" }),
            Unit::Percent => write!(f, "{text}%"),
            unit => write!(f, "{text} {unit}"),
        }
    }
}

/// Unit system used when presenting decoded values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitsPreference {
    #[default]
    Metric,
    Imperial,
}

impl UnitsPreference {
    /// Convert a metric quantity into this unit system
    pub fn convert(self, quantity: Quantity) -> Quantity {
        if self == UnitsPreference::Metric {
            return quantity;
        }
        let Quantity { value, unit } = quantity;
        match unit {
            Unit::Celsius => Quantity::new(value * 9.0 / 5.0 + 32.0, Unit::Fahrenheit),
            Unit::Kilopascal => Quantity::new(value * 0.145_037_738, Unit::Psi),
            Unit::Kph => Quantity::new(value * 0.621_371_192, Unit::Mph),
            Unit::Kilometer => Quantity::new(value * 0.621_371_192, Unit::Mile),
            Unit::GramsPerSecond => Quantity::new(value * 0.132_277_357, Unit::PoundsPerMinute),
            Unit::LitersPerHour => Quantity::new(value * 0.264_172_052, Unit::GallonsPerHour),
            _ => quantity,
        }
    }
}

/// One entry of the Units-and-Scaling table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uas {
    /// `int(bytes) * scale + offset`, optionally two's complement
    Linear {
        signed: bool,
        scale: f64,
        unit: Unit,
        offset: f64,
    },
    /// True when any byte is non-zero
    Flag,
}

impl Uas {
    const fn unsigned(scale: f64, unit: Unit) -> Self {
        Uas::Linear {
            signed: false,
            scale,
            unit,
            offset: 0.0,
        }
    }

    const fn signed(scale: f64, unit: Unit) -> Self {
        Uas::Linear {
            signed: true,
            scale,
            unit,
            offset: 0.0,
        }
    }

    /// Look up a scaling id
    pub fn lookup(id: u8) -> Option<Uas> {
        use Unit::*;
        let uas = match id {
            0x01 | 0x24 | 0x2B => Uas::unsigned(1.0, Count),
            0x02 => Uas::unsigned(0.1, Count),
            0x03 => Uas::unsigned(0.01, Count),
            0x04 => Uas::unsigned(0.001, Count),
            0x05 => Uas::unsigned(0.000_030_5, Count),
            0x06 => Uas::unsigned(0.000_305, Count),
            0x07 => Uas::unsigned(0.25, Rpm),
            0x08 => Uas::unsigned(0.01, Kph),
            0x09 => Uas::unsigned(1.0, Kph),
            0x0A => Uas::unsigned(0.122, Millivolt),
            0x0B => Uas::unsigned(0.001, Volt),
            0x0C => Uas::unsigned(0.01, Volt),
            0x0D => Uas::unsigned(0.003_906_25, Milliampere),
            0x0E => Uas::unsigned(0.001, Ampere),
            0x0F => Uas::unsigned(0.01, Ampere),
            0x10 => Uas::unsigned(1.0, Millisecond),
            0x11 => Uas::unsigned(100.0, Millisecond),
            0x12 => Uas::unsigned(1.0, Second),
            0x13 => Uas::unsigned(1.0, Milliohm),
            0x14 => Uas::unsigned(1.0, Ohm),
            0x15 => Uas::unsigned(1.0, Kiloohm),
            0x16 => Uas::Linear {
                signed: false,
                scale: 0.1,
                unit: Celsius,
                offset: -40.0,
            },
            0x17 => Uas::unsigned(0.01, Kilopascal),
            0x18 => Uas::unsigned(0.0117, Kilopascal),
            0x19 => Uas::unsigned(0.079, Kilopascal),
            0x1A => Uas::unsigned(1.0, Kilopascal),
            0x1B => Uas::unsigned(10.0, Kilopascal),
            0x1C => Uas::unsigned(0.01, Degree),
            0x1D => Uas::unsigned(0.5, Degree),
            0x1E => Uas::unsigned(0.000_030_5, Ratio),
            0x1F => Uas::unsigned(0.05, Ratio),
            0x20 => Uas::unsigned(0.003_906_25, Ratio),
            0x21 => Uas::unsigned(1.0, Millihertz),
            0x22 => Uas::unsigned(1.0, Hertz),
            0x23 => Uas::unsigned(1.0, Kilohertz),
            0x25 => Uas::unsigned(1.0, Kilometer),
            0x26 => Uas::unsigned(0.1, MillivoltsPerMillisecond),
            0x27 => Uas::unsigned(0.01, GramsPerSecond),
            0x28 => Uas::unsigned(1.0, GramsPerSecond),
            0x29 => Uas::unsigned(0.25, PascalsPerSecond),
            0x2A => Uas::unsigned(0.001, KilogramsPerHour),
            0x2C | 0x36 => Uas::unsigned(0.01, Gram),
            0x2D => Uas::unsigned(0.01, Milligram),
            0x2E => Uas::Flag,
            0x2F => Uas::unsigned(0.01, Percent),
            0x30 => Uas::unsigned(0.001_526, Percent),
            0x31 => Uas::unsigned(0.001, Liter),
            0x32 => Uas::unsigned(0.000_030_5, Inch),
            0x33 => Uas::unsigned(0.000_244_14, Ratio),
            0x34 => Uas::unsigned(1.0, Minute),
            0x35 => Uas::unsigned(10.0, Millisecond),
            0x37 => Uas::unsigned(0.1, Gram),
            0x38 => Uas::unsigned(1.0, Gram),
            0x39 => Uas::Linear {
                signed: false,
                scale: 0.01,
                unit: Percent,
                offset: -327.68,
            },
            0x3A => Uas::unsigned(0.001, Gram),
            0x3B => Uas::unsigned(0.0001, Gram),
            0x3C => Uas::unsigned(0.1, Microsecond),
            0x3D => Uas::unsigned(0.01, Milliampere),
            0x3E => Uas::unsigned(0.000_061_035_16, SquareMillimeter),
            0x3F => Uas::unsigned(0.01, Liter),
            0x40 => Uas::unsigned(1.0, PartsPerMillion),
            0x41 => Uas::unsigned(0.01, Microampere),

            0x81 => Uas::signed(1.0, Count),
            0x82 => Uas::signed(0.1, Count),
            0x83 => Uas::signed(0.01, Count),
            0x84 => Uas::signed(0.001, Count),
            0x85 => Uas::signed(0.000_030_5, Count),
            0x86 => Uas::signed(0.000_305, Count),
            0x87 => Uas::signed(1.0, PartsPerMillion),
            0x8A => Uas::signed(0.122, Millivolt),
            0x8B => Uas::signed(0.001, Volt),
            0x8C => Uas::signed(0.01, Volt),
            0x8D => Uas::signed(0.003_906_25, Milliampere),
            0x8E => Uas::signed(0.001, Ampere),
            0x90 => Uas::signed(1.0, Millisecond),
            0x96 => Uas::signed(0.1, Celsius),
            0x99 => Uas::signed(0.1, Kilopascal),
            0x9C => Uas::signed(0.01, Degree),
            0x9D => Uas::signed(0.5, Degree),
            0xA8 => Uas::signed(1.0, GramsPerSecond),
            0xA9 => Uas::signed(0.25, PascalsPerSecond),
            0xAD => Uas::signed(0.01, Milligram),
            0xAE => Uas::signed(0.1, Milligram),
            0xAF => Uas::signed(0.01, Percent),
            0xB0 => Uas::signed(0.003_052, Percent),
            0xB1 => Uas::signed(2.0, MillivoltsPerSecond),
            0xFC => Uas::signed(0.01, Kilopascal),
            0xFD => Uas::signed(0.001, Kilopascal),
            0xFE => Uas::signed(0.25, Pascal),
            _ => return None,
        };
        Some(uas)
    }

    /// Apply the scaling to a big-endian byte field
    pub fn apply(&self, bytes: &[u8]) -> Result<Quantity, ObdError> {
        match *self {
            Uas::Flag => {
                let any = bytes.iter().any(|b| *b != 0);
                Ok(Quantity::new(if any { 1.0 } else { 0.0 }, Unit::Boolean))
            }
            Uas::Linear {
                signed,
                scale,
                unit,
                offset,
            } => {
                let raw = bytes_to_int(bytes)?;
                let value = if signed {
                    twos_complement(raw, bytes.len() as u32 * 8) as f64
                } else {
                    raw as f64
                };
                Ok(Quantity::new(value * scale + offset, unit))
            }
        }
    }
}
