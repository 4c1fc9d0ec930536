//! Fixed lookup tables used by the status and text decoders

/// Monitor test ids reported in mode 06 results: (name, description)
pub fn test_id(tid: u8) -> Option<(&'static str, &'static str)> {
    let entry = match tid {
        0x01 => ("RTL_THRESHOLD_VOLTAGE", "Rich to lean sensor threshold voltage"),
        0x02 => ("LTR_THRESHOLD_VOLTAGE", "Lean to rich sensor threshold voltage"),
        0x03 => ("LOW_VOLTAGE_SWITCH_TIME", "Low sensor voltage for switch time calculation"),
        0x04 => ("HIGH_VOLTAGE_SWITCH_TIME", "High sensor voltage for switch time calculation"),
        0x05 => ("RTL_SWITCH_TIME", "Rich to lean sensor switch time"),
        0x06 => ("LTR_SWITCH_TIME", "Lean to rich sensor switch time"),
        0x07 => ("MIN_VOLTAGE", "Minimum sensor voltage for test cycle"),
        0x08 => ("MAX_VOLTAGE", "Maximum sensor voltage for test cycle"),
        0x09 => ("TRANSITION_TIME", "Time between sensor transitions"),
        0x0A => ("SENSOR_PERIOD", "Sensor period"),
        0x0B => ("MISFIRE_AVERAGE", "Average misfire counts for last ten driving cycles"),
        0x0C => ("MISFIRE_COUNT", "Misfire counts for last/current driving cycles"),
        _ => return None,
    };
    Some(entry)
}

/// Readiness monitors present on every vehicle, in bit order
pub const BASE_TESTS: [&str; 3] = [
    "MISFIRE_MONITORING",
    "FUEL_SYSTEM_MONITORING",
    "COMPONENT_MONITORING",
];

/// Spark ignition monitors; `None` marks reserved bits
pub const SPARK_TESTS: [Option<&str>; 8] = [
    Some("CATALYST_MONITORING"),
    Some("HEATED_CATALYST_MONITORING"),
    Some("EVAPORATIVE_SYSTEM_MONITORING"),
    Some("SECONDARY_AIR_SYSTEM_MONITORING"),
    None,
    Some("OXYGEN_SENSOR_MONITORING"),
    Some("OXYGEN_SENSOR_HEATER_MONITORING"),
    Some("EGR_VVT_SYSTEM_MONITORING"),
];

/// Compression ignition monitors; `None` marks reserved bits
pub const COMPRESSION_TESTS: [Option<&str>; 8] = [
    Some("NMHC_CATALYST_MONITORING"),
    Some("NOX_SCR_AFTERTREATMENT_MONITORING"),
    None,
    Some("BOOST_PRESSURE_MONITORING"),
    None,
    Some("EXHAUST_GAS_SENSOR_MONITORING"),
    Some("PM_FILTER_MONITORING"),
    Some("EGR_VVT_SYSTEM_MONITORING"),
];

pub const FUEL_STATUS: [&str; 5] = [
    "Open loop due to insufficient engine temperature",
    "Closed loop, using oxygen sensor feedback to determine fuel mix",
    "Open loop due to engine load OR fuel cut due to deceleration",
    "Open loop due to system failure",
    "Closed loop, using at least one oxygen sensor but there is a fault in the feedback system",
];

pub const AIR_STATUS: [&str; 4] = [
    "Upstream",
    "Downstream of catalytic converter",
    "From the outside atmosphere or off",
    "Pump commanded on for diagnostics",
];

pub const OBD_COMPLIANCE: [&str; 34] = [
    "Undefined",
    "OBD-II as defined by the CARB",
    "OBD as defined by the EPA",
    "OBD and OBD-II",
    "OBD-I",
    "Not OBD compliant",
    "EOBD (Europe)",
    "EOBD and OBD-II",
    "EOBD and OBD",
    "EOBD, OBD and OBD II",
    "JOBD (Japan)",
    "JOBD and OBD II",
    "JOBD and EOBD",
    "JOBD, EOBD, and OBD II",
    "Reserved",
    "Reserved",
    "Reserved",
    "Engine Manufacturer Diagnostics (EMD)",
    "Engine Manufacturer Diagnostics Enhanced (EMD+)",
    "Heavy Duty On-Board Diagnostics (Child/Partial) (HD OBD-C)",
    "Heavy Duty On-Board Diagnostics (HD OBD)",
    "World Wide Harmonized OBD (WWH OBD)",
    "Reserved",
    "Heavy Duty Euro OBD Stage I without NOx control (HD EOBD-I)",
    "Heavy Duty Euro OBD Stage I with NOx control (HD EOBD-I N)",
    "Heavy Duty Euro OBD Stage II without NOx control (HD EOBD-II)",
    "Heavy Duty Euro OBD Stage II with NOx control (HD EOBD-II N)",
    "Reserved",
    "Brazil OBD Phase 1 (OBDBr-1)",
    "Brazil OBD Phase 2 (OBDBr-2)",
    "Korean OBD (KOBD)",
    "India OBD I (IOBD I)",
    "India OBD II (IOBD II)",
    "Heavy Duty Euro OBD Stage VI (HD EOBD-IV)",
];

pub const FUEL_TYPES: [&str; 24] = [
    "Not available",
    "Gasoline",
    "Methanol",
    "Ethanol",
    "Diesel",
    "LPG",
    "CNG",
    "Propane",
    "Electric",
    "Bifuel running Gasoline",
    "Bifuel running Methanol",
    "Bifuel running Ethanol",
    "Bifuel running LPG",
    "Bifuel running CNG",
    "Bifuel running Propane",
    "Bifuel running Electricity",
    "Bifuel running electric and combustion engine",
    "Hybrid gasoline",
    "Hybrid Ethanol",
    "Hybrid Diesel",
    "Hybrid Electric",
    "Hybrid running electric and combustion engine",
    "Hybrid Regenerative",
    "Bifuel running diesel",
];

/// SAE group description for a powertrain code, keyed by its first two digits
pub fn powertrain_group(prefix: &str) -> Option<&'static str> {
    let description = match prefix {
        "00" => "Fuel and Air Metering and Auxiliary Emission Controls",
        "01" | "02" | "12" => "Fuel and Air Metering",
        "03" | "13" => "Ignition System or Misfire",
        "04" | "14" => "Auxiliary Emission Controls",
        "05" | "15" => "Vehicle Speed, Idle Control, and Auxiliary Inputs",
        "06" | "16" => "Computer and Auxiliary Outputs",
        "07" | "08" | "09" | "17" | "18" | "19" => "Transmission",
        "0A" => "Hybrid Propulsion",
        "10" => "Manufacturer Controlled Fuel and Air Metering and Auxiliary Emission Controls",
        "11" => "Manufacturer Controlled Fuel and Air Metering",
        _ => return None,
    };
    Some(description)
}
