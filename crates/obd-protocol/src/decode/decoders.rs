//! Standard mode 01/09 decoders
//!
//! Each function receives the payload with the mode and PID echo removed.

use super::tables::{AIR_STATUS, FUEL_STATUS, FUEL_TYPES, OBD_COMPLIANCE};
use super::{DecodeContext, DecodedValue, NamedFlag, PidSupport};
use crate::bits::BitArray;
use crate::bytes::{bytes_to_hex, bytes_to_int, twos_complement};
use crate::units::{Quantity, Uas, Unit};
use tracing::debug;

fn numeric(ctx: &DecodeContext, value: f64, unit: Unit) -> DecodedValue {
    DecodedValue::Numeric(ctx.units.convert(Quantity::new(value, unit)))
}

fn int_of(bytes: &[u8]) -> Option<f64> {
    bytes_to_int(bytes).ok().map(|v| v as f64)
}

/// Decode through a Units-and-Scaling id
pub fn decode_uas(id: u8, payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    let Some(uas) = Uas::lookup(id) else {
        return DecodedValue::NoData;
    };
    match uas.apply(payload) {
        Ok(q) => DecodedValue::Numeric(ctx.units.convert(q)),
        Err(_) => DecodedValue::NoData,
    }
}

pub fn rpm(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x07, payload, ctx)
}

pub fn speed(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x09, payload, ctx)
}

pub fn seconds(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x12, payload, ctx)
}

pub fn minutes(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x34, payload, ctx)
}

pub fn distance(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x25, payload, ctx)
}

pub fn maf(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x27, payload, ctx)
}

/// Fuel rail pressure relative to manifold vacuum
pub fn rail_pressure_vac(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x19, payload, ctx)
}

pub fn rail_pressure_direct(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x1B, payload, ctx)
}

pub fn catalyst_temp(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x16, payload, ctx)
}

/// Control module voltage, `(A*256+B)/1000`
pub fn module_voltage(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x0B, payload, ctx)
}

pub fn equiv_ratio(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    decode_uas(0x1E, payload, ctx)
}

pub fn count(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v, Unit::Count),
        None => DecodedValue::NoData,
    }
}

pub fn percent(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, (f64::from(*a) * 100.0 / 255.0).clamp(0.0, 100.0), Unit::Percent),
        _ => DecodedValue::NoData,
    }
}

/// -100 to 99.2 %, used by fuel trims
pub fn percent_centered(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, (f64::from(*a) - 128.0) * 100.0 / 128.0, Unit::Percent),
        _ => DecodedValue::NoData,
    }
}

/// -40 to 215 °C
pub fn temp(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v - 40.0, Unit::Celsius),
        None => DecodedValue::NoData,
    }
}

/// Wide-range O2 current, -128 to 128 mA
pub fn current_centered(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload.get(2..4).and_then(int_of) {
        Some(v) => numeric(ctx, v / 256.0 - 128.0, Unit::Milliampere),
        None => DecodedValue::NoData,
    }
}

/// Narrow-band O2 voltage, 0 to 1.275 V
pub fn sensor_voltage(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, f64::from(*a) / 200.0, Unit::Volt),
        _ => DecodedValue::NoData,
    }
}

/// Wide-range O2 voltage, 0 to 8 V
pub fn sensor_voltage_big(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload.get(2..4).and_then(int_of) {
        Some(v) => numeric(ctx, v * 8.0 / 65535.0, Unit::Volt),
        None => DecodedValue::NoData,
    }
}

/// Gauge fuel pressure, 3 kPa per count
pub fn fuel_pressure(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, f64::from(*a) * 3.0, Unit::Kilopascal),
        _ => DecodedValue::NoData,
    }
}

pub fn pressure(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, f64::from(*a), Unit::Kilopascal),
        _ => DecodedValue::NoData,
    }
}

/// Evap vapor pressure from two signed bytes, -8192 to 8192 Pa
pub fn evap_pressure(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, b, ..] => {
            let a = twos_complement(u64::from(*a), 8) as f64;
            let b = twos_complement(u64::from(*b), 8) as f64;
            numeric(ctx, (a * 256.0 + b) / 4.0, Unit::Pascal)
        }
        _ => DecodedValue::NoData,
    }
}

/// 0 to 327.675 kPa
pub fn abs_evap_pressure(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v / 200.0, Unit::Kilopascal),
        None => DecodedValue::NoData,
    }
}

pub fn evap_pressure_alt(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v - 32767.0, Unit::Pascal),
        None => DecodedValue::NoData,
    }
}

/// Degrees before TDC, -64 to 63.5
pub fn timing_advance(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, (f64::from(*a) - 128.0) / 2.0, Unit::Degree),
        _ => DecodedValue::NoData,
    }
}

pub fn inject_timing(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, (v - 26880.0) / 128.0, Unit::Degree),
        None => DecodedValue::NoData,
    }
}

pub fn max_maf(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, f64::from(*a) * 10.0, Unit::GramsPerSecond),
        _ => DecodedValue::NoData,
    }
}

pub fn fuel_rate(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v * 0.05, Unit::LitersPerHour),
        None => DecodedValue::NoData,
    }
}

/// Absolute load, 0 to 25700 %
pub fn absolute_load(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v * 100.0 / 255.0, Unit::Percent),
        None => DecodedValue::NoData,
    }
}

/// Percent torque, -125 to 130 %
pub fn torque_percent(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => numeric(ctx, f64::from(*a) - 125.0, Unit::Percent),
        _ => DecodedValue::NoData,
    }
}

pub fn reference_torque(payload: &[u8], ctx: &DecodeContext) -> DecodedValue {
    match int_of(payload) {
        Some(v) => numeric(ctx, v, Unit::NewtonMeter),
        None => DecodedValue::NoData,
    }
}

fn sensor_flags(payload: &[u8], banks: usize, per_bank: usize) -> DecodedValue {
    let Some(byte) = payload.first() else {
        return DecodedValue::NoData;
    };
    let bits = BitArray::new(std::slice::from_ref(byte));
    let flags = bits
        .iter()
        .take(banks * per_bank)
        .enumerate()
        .map(|(i, set)| NamedFlag {
            name: format!("B{}S{}", i / per_bank + 1, i % per_bank + 1),
            set,
        })
        .collect();
    DecodedValue::Flags(flags)
}

/// O2 sensor locations, two banks of four
pub fn o2_sensors(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    sensor_flags(payload, 2, 4)
}

/// O2 sensor locations, four banks of two
pub fn o2_sensors_alt(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    sensor_flags(payload, 4, 2)
}

/// Power take-off status, high bit of A
pub fn aux_input_status(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, ..] => DecodedValue::Flag(a >> 7 & 1 == 1),
        _ => DecodedValue::NoData,
    }
}

/// Exactly one bit must be set; the table is indexed from the low bit
fn one_hot_index(byte: u8) -> Option<usize> {
    if byte.count_ones() == 1 {
        Some(byte.trailing_zeros() as usize)
    } else {
        None
    }
}

pub fn fuel_status(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    let lookup = |byte: Option<&u8>| -> String {
        let Some(byte) = byte else {
            return String::new();
        };
        match one_hot_index(*byte) {
            Some(i) if i < FUEL_STATUS.len() => FUEL_STATUS[i].to_string(),
            Some(_) => {
                debug!("Invalid fuel status {:02X} (high bits set)", byte);
                String::new()
            }
            None => {
                debug!("Invalid fuel status {:02X} (multiple/no bits set)", byte);
                String::new()
            }
        }
    };
    let first = lookup(payload.first());
    let second = lookup(payload.get(1));
    if first.is_empty() && second.is_empty() {
        DecodedValue::NoData
    } else {
        DecodedValue::Texts(vec![first, second])
    }
}

pub fn air_status(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload.first().and_then(|b| one_hot_index(*b)) {
        Some(i) if i < AIR_STATUS.len() => DecodedValue::Text(AIR_STATUS[i].to_string()),
        _ => {
            debug!("Invalid secondary air status {:02X?}", payload);
            DecodedValue::NoData
        }
    }
}

pub fn obd_compliance(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload.first().and_then(|i| OBD_COMPLIANCE.get(usize::from(*i))) {
        Some(text) => DecodedValue::Text(text.to_string()),
        None => DecodedValue::NoData,
    }
}

pub fn fuel_type(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload.first().and_then(|i| FUEL_TYPES.get(usize::from(*i))) {
        Some(text) => DecodedValue::Text(text.to_string()),
        None => DecodedValue::NoData,
    }
}

pub fn pid_support(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match payload {
        [a, b, c, d, ..] => DecodedValue::PidSupport(PidSupport {
            mask: u32::from_be_bytes([*a, *b, *c, *d]),
        }),
        _ => DecodedValue::NoData,
    }
}

fn is_padding(b: &u8) -> bool {
    matches!(b, 0x00..=0x02) || b.is_ascii_whitespace()
}

/// Strip the padding and message-count bytes around an encoded string
fn trim_encoded(payload: &[u8], min_len: usize) -> Option<&[u8]> {
    if payload.len() < min_len {
        debug!("Encoded string of {} bytes is too short", payload.len());
        return None;
    }
    let start = payload.iter().position(|b| !is_padding(b))?;
    let end = payload.iter().rposition(|b| !is_padding(b))?;
    Some(&payload[start..=end])
}

fn encoded_string(payload: &[u8], min_len: usize) -> DecodedValue {
    match trim_encoded(payload, min_len) {
        Some(text) => DecodedValue::Text(String::from_utf8_lossy(text).into_owned()),
        None => DecodedValue::NoData,
    }
}

pub fn vin(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    encoded_string(payload, 17)
}

pub fn calibration_id(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    encoded_string(payload, 16)
}

pub fn ecu_name(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    encoded_string(payload, 20)
}

/// Calibration verification number, rendered as hex
pub fn cvn(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    match trim_encoded(payload, 4) {
        Some(bytes) => DecodedValue::Text(bytes_to_hex(bytes)),
        None => DecodedValue::NoData,
    }
}

pub fn raw(payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    DecodedValue::Raw(payload.to_vec())
}

/// Positive response to a command that returns nothing (e.g. clearing codes)
pub fn acknowledged(_payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    DecodedValue::Flag(true)
}

/// Defined command without a decodable value
pub fn unsupported(_payload: &[u8], _ctx: &DecodeContext) -> DecodedValue {
    DecodedValue::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitsPreference;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    fn value(decoded: DecodedValue) -> f64 {
        decoded.as_quantity().map(|q| q.value).unwrap_or(f64::NAN)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_temperature() {
        assert_close(value(temp(&[40], &ctx())), 0.0);
        assert_close(value(temp(&[0], &ctx())), -40.0);
        assert_close(value(temp(&[0x5F], &ctx())), 55.0);
        assert_eq!(temp(&[], &ctx()), DecodedValue::NoData);
    }

    #[test]
    fn test_temperature_imperial() {
        let imperial = DecodeContext {
            units: UnitsPreference::Imperial,
        };
        let q = temp(&[40], &imperial).as_quantity().unwrap();
        assert_eq!(q.unit, Unit::Fahrenheit);
        assert!((q.value - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_rpm_and_speed() {
        assert_close(value(rpm(&[0x1A, 0xF8], &ctx())), 1726.0);
        assert_close(value(speed(&[0x3C], &ctx())), 60.0);
    }

    #[test]
    fn test_percent_bounds_and_monotonic() {
        assert_close(value(percent(&[0xFF], &ctx())), 100.0);
        assert_close(value(percent(&[0x00], &ctx())), 0.0);
        let mut last = -1.0;
        for a in 0..=255u8 {
            let v = value(percent(&[a], &ctx()));
            assert!(v > last);
            last = v;
        }
    }

    #[test]
    fn test_fuel_trim() {
        assert_close(value(percent_centered(&[0x80], &ctx())), 0.0);
        assert_close(value(percent_centered(&[0x90], &ctx())), 12.5);
        assert_close(value(percent_centered(&[0x00], &ctx())), -100.0);
    }

    #[test]
    fn test_pressures() {
        assert_close(value(fuel_pressure(&[0x32], &ctx())), 150.0);
        assert_close(value(pressure(&[0x64], &ctx())), 100.0);
        assert_close(value(evap_pressure(&[0xFF, 0xFC], &ctx())), -65.0);
        assert_close(value(abs_evap_pressure(&[0x00, 0xC8], &ctx())), 1.0);
        assert_close(value(evap_pressure_alt(&[0x7F, 0xFF], &ctx())), 0.0);
    }

    #[test]
    fn test_voltages() {
        assert_close(value(sensor_voltage(&[0x80, 0xFF], &ctx())), 0.64);
        assert_close(value(module_voltage(&[0x31, 0x38], &ctx())), 12.6);
        assert_close(value(sensor_voltage_big(&[0x80, 0x00, 0xFF, 0xFF], &ctx())), 8.0);
        assert_close(value(current_centered(&[0x80, 0x00, 0x80, 0x00], &ctx())), 0.0);
        assert_eq!(current_centered(&[0x80, 0x00], &ctx()), DecodedValue::NoData);
    }

    #[test]
    fn test_misc_numeric() {
        assert_close(value(timing_advance(&[0x90], &ctx())), 8.0);
        assert_close(value(inject_timing(&[0x69, 0x00], &ctx())), 0.0);
        assert_close(value(max_maf(&[0x05], &ctx())), 50.0);
        assert_close(value(fuel_rate(&[0x00, 0x64], &ctx())), 5.0);
        assert_close(value(distance(&[0x00, 0x64], &ctx())), 100.0);
        assert_close(value(torque_percent(&[0x7D], &ctx())), 0.0);
    }

    #[test]
    fn test_fuel_status() {
        let decoded = fuel_status(&[0x02, 0x00], &ctx());
        assert_eq!(
            decoded,
            DecodedValue::Texts(vec![FUEL_STATUS[1].to_string(), String::new()])
        );
        assert_eq!(fuel_status(&[0x03, 0x00], &ctx()), DecodedValue::NoData);
        assert_eq!(fuel_status(&[0x80, 0x00], &ctx()), DecodedValue::NoData);
    }

    #[test]
    fn test_air_status_and_tables() {
        assert_eq!(air_status(&[0x04], &ctx()), DecodedValue::Text(AIR_STATUS[2].to_string()));
        assert_eq!(air_status(&[0x05], &ctx()), DecodedValue::NoData);
        assert_eq!(
            obd_compliance(&[0x06], &ctx()),
            DecodedValue::Text("EOBD (Europe)".to_string())
        );
        assert_eq!(fuel_type(&[0x01], &ctx()), DecodedValue::Text("Gasoline".to_string()));
        assert_eq!(fuel_type(&[0xF0], &ctx()), DecodedValue::NoData);
    }

    #[test]
    fn test_o2_sensor_layouts() {
        let DecodedValue::Flags(flags) = o2_sensors(&[0b1000_0001], &ctx()) else {
            panic!("expected flags");
        };
        assert_eq!(flags.len(), 8);
        assert_eq!(flags[0].name, "B1S1");
        assert!(flags[0].set);
        assert_eq!(flags[7].name, "B2S4");
        assert!(flags[7].set);

        let DecodedValue::Flags(alt) = o2_sensors_alt(&[0b0010_0000], &ctx()) else {
            panic!("expected flags");
        };
        assert_eq!(alt[2].name, "B2S1");
        assert!(alt[2].set);
    }

    #[test]
    fn test_encoded_strings() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(b"1G1JC5444R7252367");
        assert_eq!(
            vin(&payload, &ctx()),
            DecodedValue::Text("1G1JC5444R7252367".to_string())
        );
        assert_eq!(vin(b"SHORT", &ctx()), DecodedValue::NoData);
        assert_eq!(
            cvn(&[0x01, 0x17, 0x91, 0xBC, 0x82], &ctx()),
            DecodedValue::Text("1791BC82".to_string())
        );
    }

    #[test]
    fn test_pid_support_and_aux() {
        assert_eq!(
            pid_support(&[0xBE, 0x3F, 0xB8, 0x13], &ctx()),
            DecodedValue::PidSupport(PidSupport { mask: 0xBE3F_B813 })
        );
        assert_eq!(pid_support(&[0xBE], &ctx()), DecodedValue::NoData);
        assert_eq!(aux_input_status(&[0x80], &ctx()), DecodedValue::Flag(true));
    }
}
