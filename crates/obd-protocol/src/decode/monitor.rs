//! On-board monitor test results (mode 06)

use super::tables::test_id;
use super::{DecodeContext, DecodedValue};
use crate::units::{Quantity, Uas};
use serde::Serialize;
use tracing::debug;

/// Size of one `[MID, TID, UAS, value(2), min(2), max(2)]` record
const RECORD_LEN: usize = 9;

/// One monitor test result with its limits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorTest {
    pub mid: u8,
    pub tid: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub value: Quantity,
    pub min: Quantity,
    pub max: Quantity,
}

impl MonitorTest {
    pub fn passed(&self) -> bool {
        self.min.value <= self.value.value && self.value.value <= self.max.value
    }

    fn parse(record: &[u8], ctx: &DecodeContext) -> Option<Self> {
        let [mid, tid, uas_id, ..] = *record else {
            return None;
        };
        let (name, description) = test_id(tid).unwrap_or(("Unknown", "Unknown"));
        let Some(uas) = Uas::lookup(uas_id) else {
            debug!("Unknown units-and-scaling id {:02X} in monitor record", uas_id);
            return None;
        };
        let convert = |field: &[u8]| uas.apply(field).ok().map(|q| ctx.units.convert(q));
        Some(Self {
            mid,
            tid,
            name,
            description,
            value: convert(record.get(3..5)?)?,
            min: convert(record.get(5..7)?)?,
            max: convert(record.get(7..9)?)?,
        })
    }
}

/// Payload keeps the MID byte; records are read in blocks of nine bytes
pub fn monitor(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    if payload.len() % RECORD_LEN != 0 {
        debug!(
            "Monitor payload of {} bytes is not a multiple of {}, truncating",
            payload.len(),
            RECORD_LEN
        );
    }
    let tests: Vec<MonitorTest> = payload
        .chunks_exact(RECORD_LEN)
        .filter_map(|record| MonitorTest::parse(record, ctx))
        .collect();
    DecodedValue::MonitorResults(tests)
}
