//! Standard OBD-II command catalogue

use super::{Command, ParameterId, ResponseLength};
use crate::decode::decoders as d;
use crate::decode::{dtc, monitor, status, DecodeFn};
use crate::mode;
use std::borrow::Cow;

type Range = Option<(f64, f64)>;

const PERCENT: Range = Some((0.0, 100.0));
const TRIM: Range = Some((-100.0, 99.2));
const TEMP: Range = Some((-40.0, 215.0));
const O2_VOLTS: Range = Some((0.0, 1.275));
const WR_VOLTS: Range = Some((0.0, 8.0));
const WR_CURRENT: Range = Some((-128.0, 128.0));
const CAT_TEMP: Range = Some((-40.0, 6513.5));
const DISTANCE: Range = Some((0.0, 65535.0));
const TORQUE: Range = Some((-125.0, 130.0));

/// Mode 01 rows: PID, name, description, payload bytes, decoder, range
#[rustfmt::skip]
const MODE1: &[(u8, &str, &str, usize, DecodeFn, Range)] = &[
    (0x00, "PIDS_A", "Supported PIDs [01-20]", 4, d::pid_support, None),
    (0x01, "STATUS", "Status since DTCs cleared", 4, status::status, None),
    (0x02, "FREEZE_DTC", "DTC that triggered the freeze frame", 2, dtc::single_dtc, None),
    (0x03, "FUEL_STATUS", "Fuel System Status", 2, d::fuel_status, None),
    (0x04, "ENGINE_LOAD", "Calculated Engine Load", 1, d::percent, PERCENT),
    (0x05, "COOLANT_TEMP", "Engine Coolant Temperature", 1, d::temp, TEMP),
    (0x06, "SHORT_FUEL_TRIM_1", "Short Term Fuel Trim - Bank 1", 1, d::percent_centered, TRIM),
    (0x07, "LONG_FUEL_TRIM_1", "Long Term Fuel Trim - Bank 1", 1, d::percent_centered, TRIM),
    (0x08, "SHORT_FUEL_TRIM_2", "Short Term Fuel Trim - Bank 2", 1, d::percent_centered, TRIM),
    (0x09, "LONG_FUEL_TRIM_2", "Long Term Fuel Trim - Bank 2", 1, d::percent_centered, TRIM),
    (0x0A, "FUEL_PRESSURE", "Fuel Pressure", 1, d::fuel_pressure, Some((0.0, 765.0))),
    (0x0B, "INTAKE_PRESSURE", "Intake Manifold Pressure", 1, d::pressure, Some((0.0, 255.0))),
    (0x0C, "RPM", "Engine RPM", 2, d::rpm, Some((0.0, 16383.75))),
    (0x0D, "SPEED", "Vehicle Speed", 1, d::speed, Some((0.0, 255.0))),
    (0x0E, "TIMING_ADVANCE", "Timing Advance", 1, d::timing_advance, Some((-64.0, 63.5))),
    (0x0F, "INTAKE_TEMP", "Intake Air Temp", 1, d::temp, TEMP),
    (0x10, "MAF", "Air Flow Rate (MAF)", 2, d::maf, Some((0.0, 655.35))),
    (0x11, "THROTTLE_POS", "Throttle Position", 1, d::percent, PERCENT),
    (0x12, "AIR_STATUS", "Secondary Air Status", 1, d::air_status, None),
    (0x13, "O2_SENSORS", "O2 Sensors Present", 1, d::o2_sensors, None),
    (0x14, "O2_B1S1", "O2: Bank 1 - Sensor 1 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x15, "O2_B1S2", "O2: Bank 1 - Sensor 2 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x16, "O2_B1S3", "O2: Bank 1 - Sensor 3 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x17, "O2_B1S4", "O2: Bank 1 - Sensor 4 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x18, "O2_B2S1", "O2: Bank 2 - Sensor 1 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x19, "O2_B2S2", "O2: Bank 2 - Sensor 2 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x1A, "O2_B2S3", "O2: Bank 2 - Sensor 3 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x1B, "O2_B2S4", "O2: Bank 2 - Sensor 4 Voltage", 2, d::sensor_voltage, O2_VOLTS),
    (0x1C, "OBD_COMPLIANCE", "OBD Standards Compliance", 1, d::obd_compliance, None),
    (0x1D, "O2_SENSORS_ALT", "O2 Sensors Present (alternate)", 1, d::o2_sensors_alt, None),
    (0x1E, "AUX_INPUT_STATUS", "Auxiliary input status (power take off)", 1, d::aux_input_status, None),
    (0x1F, "RUN_TIME", "Engine Run Time", 2, d::seconds, Some((0.0, 65535.0))),
    (0x20, "PIDS_B", "Supported PIDs [21-40]", 4, d::pid_support, None),
    (0x21, "DISTANCE_W_MIL", "Distance Traveled with MIL on", 2, d::distance, DISTANCE),
    (0x22, "FUEL_RAIL_PRESSURE_VAC", "Fuel Rail Pressure (relative to vacuum)", 2, d::rail_pressure_vac, Some((0.0, 5177.265))),
    (0x23, "FUEL_RAIL_PRESSURE_DIRECT", "Fuel Rail Pressure (direct inject)", 2, d::rail_pressure_direct, Some((0.0, 655_350.0))),
    (0x24, "O2_S1_WR_VOLTAGE", "02 Sensor 1 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x25, "O2_S2_WR_VOLTAGE", "02 Sensor 2 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x26, "O2_S3_WR_VOLTAGE", "02 Sensor 3 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x27, "O2_S4_WR_VOLTAGE", "02 Sensor 4 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x28, "O2_S5_WR_VOLTAGE", "02 Sensor 5 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x29, "O2_S6_WR_VOLTAGE", "02 Sensor 6 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x2A, "O2_S7_WR_VOLTAGE", "02 Sensor 7 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x2B, "O2_S8_WR_VOLTAGE", "02 Sensor 8 WR Lambda Voltage", 4, d::sensor_voltage_big, WR_VOLTS),
    (0x2C, "COMMANDED_EGR", "Commanded EGR", 1, d::percent, PERCENT),
    (0x2D, "EGR_ERROR", "EGR Error", 1, d::percent_centered, TRIM),
    (0x2E, "EVAPORATIVE_PURGE", "Commanded Evaporative Purge", 1, d::percent, PERCENT),
    (0x2F, "FUEL_LEVEL", "Fuel Level Input", 1, d::percent, PERCENT),
    (0x30, "WARMUPS_SINCE_DTC_CLEAR", "Number of warm-ups since codes cleared", 1, d::count, Some((0.0, 255.0))),
    (0x31, "DISTANCE_SINCE_DTC_CLEAR", "Distance traveled since codes cleared", 2, d::distance, DISTANCE),
    (0x32, "EVAP_VAPOR_PRESSURE", "Evaporative system vapor pressure", 2, d::evap_pressure, Some((-8192.0, 8192.0))),
    (0x33, "BAROMETRIC_PRESSURE", "Barometric Pressure", 1, d::pressure, Some((0.0, 255.0))),
    (0x34, "O2_S1_WR_CURRENT", "02 Sensor 1 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x35, "O2_S2_WR_CURRENT", "02 Sensor 2 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x36, "O2_S3_WR_CURRENT", "02 Sensor 3 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x37, "O2_S4_WR_CURRENT", "02 Sensor 4 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x38, "O2_S5_WR_CURRENT", "02 Sensor 5 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x39, "O2_S6_WR_CURRENT", "02 Sensor 6 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x3A, "O2_S7_WR_CURRENT", "02 Sensor 7 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x3B, "O2_S8_WR_CURRENT", "02 Sensor 8 WR Lambda Current", 4, d::current_centered, WR_CURRENT),
    (0x3C, "CATALYST_TEMP_B1S1", "Catalyst Temperature: Bank 1 - Sensor 1", 2, d::catalyst_temp, CAT_TEMP),
    (0x3D, "CATALYST_TEMP_B2S1", "Catalyst Temperature: Bank 2 - Sensor 1", 2, d::catalyst_temp, CAT_TEMP),
    (0x3E, "CATALYST_TEMP_B1S2", "Catalyst Temperature: Bank 1 - Sensor 2", 2, d::catalyst_temp, CAT_TEMP),
    (0x3F, "CATALYST_TEMP_B2S2", "Catalyst Temperature: Bank 2 - Sensor 2", 2, d::catalyst_temp, CAT_TEMP),
    (0x40, "PIDS_C", "Supported PIDs [41-60]", 4, d::pid_support, None),
    (0x41, "STATUS_DRIVE_CYCLE", "Monitor status this drive cycle", 4, status::status, None),
    (0x42, "CONTROL_MODULE_VOLTAGE", "Control module voltage", 2, d::module_voltage, Some((0.0, 65.535))),
    (0x43, "ABSOLUTE_LOAD", "Absolute load value", 2, d::absolute_load, Some((0.0, 25700.0))),
    (0x44, "COMMANDED_EQUIV_RATIO", "Commanded equivalence ratio", 2, d::equiv_ratio, Some((0.0, 2.0))),
    (0x45, "RELATIVE_THROTTLE_POS", "Relative throttle position", 1, d::percent, PERCENT),
    (0x46, "AMBIANT_AIR_TEMP", "Ambient air temperature", 1, d::temp, TEMP),
    (0x47, "THROTTLE_POS_B", "Absolute throttle position B", 1, d::percent, PERCENT),
    (0x48, "THROTTLE_POS_C", "Absolute throttle position C", 1, d::percent, PERCENT),
    (0x49, "ACCELERATOR_POS_D", "Accelerator pedal position D", 1, d::percent, PERCENT),
    (0x4A, "ACCELERATOR_POS_E", "Accelerator pedal position E", 1, d::percent, PERCENT),
    (0x4B, "ACCELERATOR_POS_F", "Accelerator pedal position F", 1, d::percent, PERCENT),
    (0x4C, "THROTTLE_ACTUATOR", "Commanded throttle actuator", 1, d::percent, PERCENT),
    (0x4D, "RUN_TIME_MIL", "Time run with MIL on", 2, d::minutes, Some((0.0, 65535.0))),
    (0x4E, "TIME_SINCE_DTC_CLEARED", "Time since trouble codes cleared", 2, d::minutes, Some((0.0, 65535.0))),
    (0x4F, "MAX_VALUES", "Various Max values", 4, d::unsupported, None),
    (0x50, "MAX_MAF", "Maximum value for mass air flow sensor", 4, d::max_maf, Some((0.0, 2550.0))),
    (0x51, "FUEL_TYPE", "Fuel Type", 1, d::fuel_type, None),
    (0x52, "ETHANOL_PERCENT", "Ethanol Fuel Percent", 1, d::percent, PERCENT),
    (0x53, "EVAP_VAPOR_PRESSURE_ABS", "Absolute Evap system Vapor Pressure", 2, d::abs_evap_pressure, Some((0.0, 327.675))),
    (0x54, "EVAP_VAPOR_PRESSURE_ALT", "Evap system vapor pressure", 2, d::evap_pressure_alt, Some((-32767.0, 32768.0))),
    (0x55, "SHORT_O2_TRIM_B1", "Short term secondary O2 trim - Bank 1", 2, d::percent_centered, TRIM),
    (0x56, "LONG_O2_TRIM_B1", "Long term secondary O2 trim - Bank 1", 2, d::percent_centered, TRIM),
    (0x57, "SHORT_O2_TRIM_B2", "Short term secondary O2 trim - Bank 2", 2, d::percent_centered, TRIM),
    (0x58, "LONG_O2_TRIM_B2", "Long term secondary O2 trim - Bank 2", 2, d::percent_centered, TRIM),
    (0x59, "FUEL_RAIL_PRESSURE_ABS", "Fuel rail pressure (absolute)", 2, d::rail_pressure_direct, Some((0.0, 655_350.0))),
    (0x5A, "RELATIVE_ACCEL_POS", "Relative accelerator pedal position", 1, d::percent, PERCENT),
    (0x5B, "HYBRID_BATTERY_REMAINING", "Hybrid battery pack remaining life", 1, d::percent, PERCENT),
    (0x5C, "OIL_TEMP", "Engine oil temperature", 1, d::temp, TEMP),
    (0x5D, "FUEL_INJECT_TIMING", "Fuel injection timing", 2, d::inject_timing, Some((-210.0, 301.992))),
    (0x5E, "FUEL_RATE", "Engine fuel rate", 2, d::fuel_rate, Some((0.0, 3276.75))),
    (0x5F, "EMISSION_REQ", "Designed emission requirements", 1, d::unsupported, None),
    (0x60, "PIDS_D", "Supported PIDs [61-80]", 4, d::pid_support, None),
    (0x61, "DRIVER_DEMAND_TORQUE", "Driver's demand engine - percent torque", 1, d::torque_percent, TORQUE),
    (0x62, "ACTUAL_ENGINE_TORQUE", "Actual engine - percent torque", 1, d::torque_percent, TORQUE),
    (0x63, "ENGINE_REFERENCE_TORQUE", "Engine reference torque", 2, d::reference_torque, Some((0.0, 65535.0))),
];

/// Mode 06 monitor ids: MID, name, description
#[rustfmt::skip]
const MODE6: &[(u8, &str, &str)] = &[
    (0x01, "MONITOR_O2_B1S1", "O2 Sensor Monitor Bank 1 - Sensor 1"),
    (0x02, "MONITOR_O2_B1S2", "O2 Sensor Monitor Bank 1 - Sensor 2"),
    (0x03, "MONITOR_O2_B1S3", "O2 Sensor Monitor Bank 1 - Sensor 3"),
    (0x04, "MONITOR_O2_B1S4", "O2 Sensor Monitor Bank 1 - Sensor 4"),
    (0x05, "MONITOR_O2_B2S1", "O2 Sensor Monitor Bank 2 - Sensor 1"),
    (0x06, "MONITOR_O2_B2S2", "O2 Sensor Monitor Bank 2 - Sensor 2"),
    (0x07, "MONITOR_O2_B2S3", "O2 Sensor Monitor Bank 2 - Sensor 3"),
    (0x08, "MONITOR_O2_B2S4", "O2 Sensor Monitor Bank 2 - Sensor 4"),
    (0x09, "MONITOR_O2_B3S1", "O2 Sensor Monitor Bank 3 - Sensor 1"),
    (0x0A, "MONITOR_O2_B3S2", "O2 Sensor Monitor Bank 3 - Sensor 2"),
    (0x0B, "MONITOR_O2_B3S3", "O2 Sensor Monitor Bank 3 - Sensor 3"),
    (0x0C, "MONITOR_O2_B3S4", "O2 Sensor Monitor Bank 3 - Sensor 4"),
    (0x0D, "MONITOR_O2_B4S1", "O2 Sensor Monitor Bank 4 - Sensor 1"),
    (0x0E, "MONITOR_O2_B4S2", "O2 Sensor Monitor Bank 4 - Sensor 2"),
    (0x0F, "MONITOR_O2_B4S3", "O2 Sensor Monitor Bank 4 - Sensor 3"),
    (0x10, "MONITOR_O2_B4S4", "O2 Sensor Monitor Bank 4 - Sensor 4"),
    (0x21, "MONITOR_CATALYST_B1", "Catalyst Monitor Bank 1"),
    (0x22, "MONITOR_CATALYST_B2", "Catalyst Monitor Bank 2"),
    (0x23, "MONITOR_CATALYST_B3", "Catalyst Monitor Bank 3"),
    (0x24, "MONITOR_CATALYST_B4", "Catalyst Monitor Bank 4"),
    (0x31, "MONITOR_EGR_B1", "EGR Monitor Bank 1"),
    (0x32, "MONITOR_EGR_B2", "EGR Monitor Bank 2"),
    (0x33, "MONITOR_EGR_B3", "EGR Monitor Bank 3"),
    (0x34, "MONITOR_EGR_B4", "EGR Monitor Bank 4"),
    (0x35, "MONITOR_VVT_B1", "VVT Monitor Bank 1"),
    (0x36, "MONITOR_VVT_B2", "VVT Monitor Bank 2"),
    (0x37, "MONITOR_VVT_B3", "VVT Monitor Bank 3"),
    (0x38, "MONITOR_VVT_B4", "VVT Monitor Bank 4"),
    (0x39, "MONITOR_EVAP_150", "EVAP Monitor (Cap Off / 0.150\")"),
    (0x3A, "MONITOR_EVAP_090", "EVAP Monitor (0.090\")"),
    (0x3B, "MONITOR_EVAP_040", "EVAP Monitor (0.040\")"),
    (0x3C, "MONITOR_EVAP_020", "EVAP Monitor (0.020\")"),
    (0x3D, "MONITOR_PURGE_FLOW", "Purge Flow Monitor"),
    (0x41, "MONITOR_O2_HEATER_B1S1", "O2 Sensor Heater Monitor Bank 1 - Sensor 1"),
    (0x42, "MONITOR_O2_HEATER_B1S2", "O2 Sensor Heater Monitor Bank 1 - Sensor 2"),
    (0x43, "MONITOR_O2_HEATER_B1S3", "O2 Sensor Heater Monitor Bank 1 - Sensor 3"),
    (0x44, "MONITOR_O2_HEATER_B1S4", "O2 Sensor Heater Monitor Bank 1 - Sensor 4"),
    (0x45, "MONITOR_O2_HEATER_B2S1", "O2 Sensor Heater Monitor Bank 2 - Sensor 1"),
    (0x46, "MONITOR_O2_HEATER_B2S2", "O2 Sensor Heater Monitor Bank 2 - Sensor 2"),
    (0x47, "MONITOR_O2_HEATER_B2S3", "O2 Sensor Heater Monitor Bank 2 - Sensor 3"),
    (0x48, "MONITOR_O2_HEATER_B2S4", "O2 Sensor Heater Monitor Bank 2 - Sensor 4"),
    (0x49, "MONITOR_O2_HEATER_B3S1", "O2 Sensor Heater Monitor Bank 3 - Sensor 1"),
    (0x4A, "MONITOR_O2_HEATER_B3S2", "O2 Sensor Heater Monitor Bank 3 - Sensor 2"),
    (0x4B, "MONITOR_O2_HEATER_B3S3", "O2 Sensor Heater Monitor Bank 3 - Sensor 3"),
    (0x4C, "MONITOR_O2_HEATER_B3S4", "O2 Sensor Heater Monitor Bank 3 - Sensor 4"),
    (0x4D, "MONITOR_O2_HEATER_B4S1", "O2 Sensor Heater Monitor Bank 4 - Sensor 1"),
    (0x4E, "MONITOR_O2_HEATER_B4S2", "O2 Sensor Heater Monitor Bank 4 - Sensor 2"),
    (0x4F, "MONITOR_O2_HEATER_B4S3", "O2 Sensor Heater Monitor Bank 4 - Sensor 3"),
    (0x50, "MONITOR_O2_HEATER_B4S4", "O2 Sensor Heater Monitor Bank 4 - Sensor 4"),
    (0x61, "MONITOR_HEATED_CATALYST_B1", "Heated Catalyst Monitor Bank 1"),
    (0x62, "MONITOR_HEATED_CATALYST_B2", "Heated Catalyst Monitor Bank 2"),
    (0x63, "MONITOR_HEATED_CATALYST_B3", "Heated Catalyst Monitor Bank 3"),
    (0x64, "MONITOR_HEATED_CATALYST_B4", "Heated Catalyst Monitor Bank 4"),
    (0x71, "MONITOR_SECONDARY_AIR_1", "Secondary Air Monitor 1"),
    (0x72, "MONITOR_SECONDARY_AIR_2", "Secondary Air Monitor 2"),
    (0x73, "MONITOR_SECONDARY_AIR_3", "Secondary Air Monitor 3"),
    (0x74, "MONITOR_SECONDARY_AIR_4", "Secondary Air Monitor 4"),
    (0x81, "MONITOR_FUEL_SYSTEM_B1", "Fuel System Monitor Bank 1"),
    (0x82, "MONITOR_FUEL_SYSTEM_B2", "Fuel System Monitor Bank 2"),
    (0x83, "MONITOR_FUEL_SYSTEM_B3", "Fuel System Monitor Bank 3"),
    (0x84, "MONITOR_FUEL_SYSTEM_B4", "Fuel System Monitor Bank 4"),
    (0x85, "MONITOR_BOOST_PRESSURE_B1", "Boost Pressure Control Monitor Bank 1"),
    (0x86, "MONITOR_BOOST_PRESSURE_B2", "Boost Pressure Control Monitor Bank 1"),
    (0x90, "MONITOR_NOX_ABSORBER_B1", "NOx Absorber Monitor Bank 1"),
    (0x91, "MONITOR_NOX_ABSORBER_B2", "NOx Absorber Monitor Bank 2"),
    (0x98, "MONITOR_NOX_CATALYST_B1", "NOx Catalyst Monitor Bank 1"),
    (0x99, "MONITOR_NOX_CATALYST_B2", "NOx Catalyst Monitor Bank 2"),
    (0xA1, "MONITOR_MISFIRE_GENERAL", "Misfire Monitor General Data"),
    (0xA2, "MONITOR_MISFIRE_CYLINDER_1", "Misfire Cylinder 1 Data"),
    (0xA3, "MONITOR_MISFIRE_CYLINDER_2", "Misfire Cylinder 2 Data"),
    (0xA4, "MONITOR_MISFIRE_CYLINDER_3", "Misfire Cylinder 3 Data"),
    (0xA5, "MONITOR_MISFIRE_CYLINDER_4", "Misfire Cylinder 4 Data"),
    (0xA6, "MONITOR_MISFIRE_CYLINDER_5", "Misfire Cylinder 5 Data"),
    (0xA7, "MONITOR_MISFIRE_CYLINDER_6", "Misfire Cylinder 6 Data"),
    (0xA8, "MONITOR_MISFIRE_CYLINDER_7", "Misfire Cylinder 7 Data"),
    (0xA9, "MONITOR_MISFIRE_CYLINDER_8", "Misfire Cylinder 8 Data"),
    (0xAA, "MONITOR_MISFIRE_CYLINDER_9", "Misfire Cylinder 9 Data"),
    (0xAB, "MONITOR_MISFIRE_CYLINDER_10", "Misfire Cylinder 10 Data"),
    (0xAC, "MONITOR_MISFIRE_CYLINDER_11", "Misfire Cylinder 11 Data"),
    (0xAD, "MONITOR_MISFIRE_CYLINDER_12", "Misfire Cylinder 12 Data"),
    (0xB0, "MONITOR_PM_FILTER_B1", "PM Filter Monitor Bank 1"),
    (0xB1, "MONITOR_PM_FILTER_B2", "PM Filter Monitor Bank 2"),
];

/// Mode 09 rows: PID, name, description, payload bytes (`None` = variable), decoder
#[rustfmt::skip]
const MODE9: &[(u8, &str, &str, Option<usize>, DecodeFn)] = &[
    (0x00, "PIDS_9A", "Supported PIDs [01-20]", Some(4), d::pid_support),
    (0x01, "VIN_MESSAGE_COUNT", "VIN Message Count", Some(1), d::count),
    (0x02, "VIN", "Vehicle Identification Number", None, d::vin),
    (0x03, "CALIBRATION_ID_MESSAGE_COUNT", "Calibration ID message count for PID 04", Some(1), d::count),
    (0x04, "CALIBRATION_ID", "Calibration ID", None, d::calibration_id),
    (0x05, "CVN_MESSAGE_COUNT", "CVN Message Count for PID 06", Some(1), d::count),
    (0x06, "CVN", "Calibration Verification Numbers", None, d::cvn),
    (0x07, "PERF_TRACKING_MESSAGE_COUNT", "In-use performance tracking message count", Some(1), d::count),
    (0x08, "PERF_TRACKING_SPARK", "In-use performance tracking (spark ignition)", None, d::raw),
    (0x09, "ECU_NAME_MESSAGE_COUNT", "ECU Name Message Count for PID 0A", Some(1), d::count),
    (0x0A, "ECU_NAME", "ECU Name", None, d::ecu_name),
    (0x0B, "PERF_TRACKING_COMPRESSION", "In-use performance tracking (compression ignition)", None, d::raw),
];

fn is_getter_pid(pid: u8) -> bool {
    pid % 0x20 == 0
}

fn mode1() -> impl Iterator<Item = Command> {
    MODE1.iter().map(|&(pid, name, description, bytes, decode, range)| Command {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        mode: mode::CURRENT_DATA,
        pid: ParameterId::Byte(pid),
        response: ResponseLength::Fixed(bytes),
        decode,
        range,
        pid_getter: is_getter_pid(pid),
        fast: !is_getter_pid(pid),
        can_only: false,
        header: None,
    })
}

/// Freeze frame mirrors of every mode 01 command
fn mode2() -> impl Iterator<Item = Command> {
    mode1().map(|cmd| Command {
        name: Cow::Owned(format!("DTC_{}", cmd.name)),
        mode: mode::FREEZE_FRAME,
        ..cmd
    })
}

fn mode6() -> impl Iterator<Item = Command> {
    const GETTERS: [(&str, &str); 6] = [
        ("MIDS_A", "Supported MIDs [01-20]"),
        ("MIDS_B", "Supported MIDs [21-40]"),
        ("MIDS_C", "Supported MIDs [41-60]"),
        ("MIDS_D", "Supported MIDs [61-80]"),
        ("MIDS_E", "Supported MIDs [81-A0]"),
        ("MIDS_F", "Supported MIDs [A1-C0]"),
    ];
    let getters = GETTERS.into_iter().enumerate().map(|(i, (name, description))| Command {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        mode: mode::TEST_RESULTS,
        pid: ParameterId::Byte(i as u8 * 0x20),
        response: ResponseLength::Fixed(4),
        decode: d::pid_support,
        range: None,
        pid_getter: true,
        fast: false,
        can_only: true,
        header: None,
    });
    let monitors = MODE6.iter().map(|&(mid, name, description)| Command {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        mode: mode::TEST_RESULTS,
        pid: ParameterId::Byte(mid),
        response: ResponseLength::Variable,
        decode: monitor::monitor,
        range: None,
        pid_getter: false,
        fast: false,
        can_only: true,
        header: None,
    });
    getters.chain(monitors)
}

fn mode9() -> impl Iterator<Item = Command> {
    MODE9.iter().map(|&(pid, name, description, bytes, decode)| Command {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        mode: mode::VEHICLE_INFO,
        pid: ParameterId::Byte(pid),
        response: bytes.map_or(ResponseLength::Variable, ResponseLength::Fixed),
        decode,
        range: None,
        pid_getter: pid == 0x00,
        fast: false,
        can_only: false,
        header: None,
    })
}

fn dtc_command(name: &'static str, description: &'static str, mode: u8, decode: DecodeFn) -> Command {
    Command {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        mode,
        pid: ParameterId::None,
        response: if mode == crate::mode::CLEAR_DTC {
            ResponseLength::Fixed(0)
        } else {
            ResponseLength::Variable
        },
        decode,
        range: None,
        pid_getter: false,
        fast: false,
        can_only: false,
        header: None,
    }
}

/// Every standard command, grouped by mode
pub(super) fn build() -> Vec<Command> {
    let mut commands: Vec<Command> = mode1().collect();
    commands.extend(mode2());
    commands.push(dtc_command("GET_DTC", "Get DTCs", mode::READ_DTC, dtc::dtc_list));
    commands.push(dtc_command(
        "CLEAR_DTC",
        "Clear DTCs and Freeze data",
        mode::CLEAR_DTC,
        d::acknowledged,
    ));
    commands.extend(mode6());
    commands.push(dtc_command(
        "GET_CURRENT_DTC",
        "Get DTCs from the current/last driving cycle",
        mode::PENDING_DTC,
        dtc::dtc_list,
    ));
    commands.extend(mode9());
    commands
}
