//! Monitor readiness status (mode 01 PIDs 01 and 41)
//!
//! Layout, MSB-first:
//!
//! ```text
//!  byte A: [MIL][ DTC count (7 bits) ]
//!  byte B: [x][comp~][fuel~][misf~][ignition][comp][fuel][misf]
//!  byte C: per-engine monitors available
//!  byte D: per-engine monitors incomplete
//! ```

use super::tables::{BASE_TESTS, COMPRESSION_TESTS, SPARK_TESTS};
use super::{DecodeContext, DecodedValue};
use crate::bits::BitArray;
use crate::error::ObdError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnitionType {
    Spark,
    Compression,
}

/// Availability and completion of one readiness monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessTest {
    pub name: &'static str,
    pub available: bool,
    pub complete: bool,
}

/// Decoded monitor status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Malfunction indicator lamp
    pub mil: bool,
    pub dtc_count: u8,
    pub ignition: IgnitionType,
    pub tests: Vec<ReadinessTest>,
}

impl MonitorStatus {
    pub fn test(&self, name: &str) -> Option<&ReadinessTest> {
        self.tests.iter().find(|t| t.name == name)
    }

    fn from_bits(bits: BitArray<'_>) -> Result<Self, ObdError> {
        let compression = bits.get(12)?;
        let mut tests = Vec::with_capacity(11);

        for (i, name) in BASE_TESTS.iter().rev().enumerate() {
            tests.push(ReadinessTest {
                name,
                available: bits.get(13 + i)?,
                complete: !bits.get(9 + i)?,
            });
        }

        let engine_tests = if compression {
            &COMPRESSION_TESTS
        } else {
            &SPARK_TESTS
        };
        for (i, name) in engine_tests.iter().rev().enumerate() {
            if let Some(name) = name {
                tests.push(ReadinessTest {
                    name,
                    available: bits.get(16 + i)?,
                    complete: !bits.get(24 + i)?,
                });
            }
        }

        Ok(Self {
            mil: bits.get(0)?,
            dtc_count: bits.value(1, 8)? as u8,
            ignition: if compression {
                IgnitionType::Compression
            } else {
                IgnitionType::Spark
            },
            tests,
        })
    }
}

pub fn status(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    let Some(bytes) = payload.get(..4) else {
        return DecodedValue::NoData;
    };
    match MonitorStatus::from_bits(BitArray::new(bytes)) {
        Ok(status) => DecodedValue::Readiness(status),
        Err(_) => DecodedValue::NoData,
    }
}
