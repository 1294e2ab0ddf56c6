//! PV_SERIES register maps (EG4 18kPV; also used by FlexBOSS21 and SNA).
//!
//! Addresses follow the 18kPV Modbus protocol document, cross-checked against
//! live readings. Known deviations from the paper protocol are noted inline.

use super::{
    EnergyRegisterMap, RegisterCategory as Cat, RegisterDef, RegisterScale as Scale,
    RuntimeRegisterMap,
};

pub static RUNTIME_MAP: RuntimeRegisterMap = RuntimeRegisterMap {
    family: "PV_SERIES",

    status: RegisterDef::word("status", 0, Scale::Unit, Cat::Status),
    pv1_voltage: RegisterDef::word("pv1_voltage", 1, Scale::Div10, Cat::Runtime),
    pv2_voltage: RegisterDef::word("pv2_voltage", 2, Scale::Div10, Cat::Runtime),
    pv3_voltage: Some(RegisterDef::word("pv3_voltage", 3, Scale::Div10, Cat::Runtime)),
    battery_voltage: RegisterDef::word("battery_voltage", 4, Scale::Div10, Cat::Runtime),
    soc_soh_packed: RegisterDef::word("soc_soh_packed", 5, Scale::Unit, Cat::Runtime),
    internal_fault: RegisterDef::word("internal_fault", 6, Scale::Unit, Cat::Fault),
    pv1_power: RegisterDef::word("pv1_power", 7, Scale::Unit, Cat::Runtime),
    pv2_power: RegisterDef::word("pv2_power", 8, Scale::Unit, Cat::Runtime),
    pv3_power: Some(RegisterDef::word("pv3_power", 9, Scale::Unit, Cat::Runtime)),
    battery_charge_power: RegisterDef::word("battery_charge_power", 10, Scale::Unit, Cat::Runtime),
    battery_discharge_power: RegisterDef::word(
        "battery_discharge_power",
        11,
        Scale::Unit,
        Cat::Runtime,
    ),
    grid_voltage_r: RegisterDef::word("grid_voltage_r", 12, Scale::Div10, Cat::Runtime),
    grid_voltage_s: RegisterDef::word("grid_voltage_s", 13, Scale::Div10, Cat::Runtime),
    grid_voltage_t: RegisterDef::word("grid_voltage_t", 14, Scale::Div10, Cat::Runtime),
    grid_frequency: RegisterDef::word("grid_frequency", 15, Scale::Div100, Cat::Runtime),
    inverter_power: RegisterDef::word("inverter_power", 16, Scale::Unit, Cat::Runtime),
    rectifier_power: RegisterDef::word("rectifier_power", 17, Scale::Unit, Cat::Runtime),
    inverter_current_rms: RegisterDef::word("inverter_current_rms", 18, Scale::Div100, Cat::Runtime),
    power_factor: RegisterDef::word("power_factor", 19, Scale::Div1000, Cat::Runtime),
    eps_voltage_r: RegisterDef::word("eps_voltage_r", 20, Scale::Div10, Cat::Runtime),
    eps_voltage_s: RegisterDef::word("eps_voltage_s", 21, Scale::Div10, Cat::Runtime),
    eps_voltage_t: RegisterDef::word("eps_voltage_t", 22, Scale::Div10, Cat::Runtime),
    eps_frequency: RegisterDef::word("eps_frequency", 23, Scale::Div100, Cat::Runtime),
    eps_power: RegisterDef::word("eps_power", 24, Scale::Unit, Cat::Runtime),
    eps_apparent_power: RegisterDef::word("eps_apparent_power", 25, Scale::Unit, Cat::Runtime),
    power_to_grid: RegisterDef::word("power_to_grid", 26, Scale::Unit, Cat::Runtime),
    load_power: RegisterDef::word("load_power", 27, Scale::Unit, Cat::Runtime),
    bus_voltage_1: RegisterDef::word("bus_voltage_1", 38, Scale::Div10, Cat::Runtime),
    bus_voltage_2: RegisterDef::word("bus_voltage_2", 39, Scale::Div10, Cat::Runtime),
    fault_code: RegisterDef::dword("fault_code", 60, Scale::Unit, Cat::Fault),
    warning_code: RegisterDef::dword("warning_code", 62, Scale::Unit, Cat::Fault),
    internal_temperature: RegisterDef::word_signed(
        "internal_temperature",
        64,
        Scale::Unit,
        Cat::Temperature,
    ),
    radiator_temperature_1: RegisterDef::word_signed(
        "radiator_temperature_1",
        65,
        Scale::Unit,
        Cat::Temperature,
    ),
    radiator_temperature_2: RegisterDef::word_signed(
        "radiator_temperature_2",
        66,
        Scale::Unit,
        Cat::Temperature,
    ),
    battery_temperature: RegisterDef::word_signed(
        "battery_temperature",
        67,
        Scale::Unit,
        Cat::Temperature,
    ),
    bms_charge_current_limit: RegisterDef::word(
        "bms_charge_current_limit",
        81,
        Scale::Div100,
        Cat::Bms,
    ),
    bms_discharge_current_limit: RegisterDef::word(
        "bms_discharge_current_limit",
        82,
        Scale::Div100,
        Cat::Bms,
    ),
    bms_charge_voltage_ref: RegisterDef::word("bms_charge_voltage_ref", 83, Scale::Div10, Cat::Bms),
    bms_discharge_cutoff_voltage: RegisterDef::word(
        "bms_discharge_cutoff_voltage",
        84,
        Scale::Div10,
        Cat::Bms,
    ),
    battery_status_inv: RegisterDef::word("battery_status_inv", 95, Scale::Unit, Cat::Bms),
    battery_count: RegisterDef::word("battery_count", 96, Scale::Unit, Cat::Bms),
    battery_capacity_ah: RegisterDef::word("battery_capacity_ah", 97, Scale::Unit, Cat::Bms),
    // Protocol doc says ÷100; live correlation against the cloud values
    // confirmed ÷10 on 18kPV and FlexBOSS firmware.
    battery_current: RegisterDef::word_signed("battery_current", 98, Scale::Div10, Cat::Bms),
    bms_fault_code: RegisterDef::word("bms_fault_code", 99, Scale::Unit, Cat::Bms),
    bms_warning_code: RegisterDef::word("bms_warning_code", 100, Scale::Unit, Cat::Bms),
    max_cell_voltage: RegisterDef::word("max_cell_voltage", 101, Scale::Div1000, Cat::Bms),
    min_cell_voltage: RegisterDef::word("min_cell_voltage", 102, Scale::Div1000, Cat::Bms),
    max_cell_temperature: RegisterDef::word_signed(
        "max_cell_temperature",
        103,
        Scale::Div10,
        Cat::Bms,
    ),
    min_cell_temperature: RegisterDef::word_signed(
        "min_cell_temperature",
        104,
        Scale::Div10,
        Cat::Bms,
    ),
    bms_cycle_count: RegisterDef::word("bms_cycle_count", 106, Scale::Unit, Cat::Bms),
    battery_voltage_sample: RegisterDef::word("battery_voltage_sample", 107, Scale::Div10, Cat::Bms),
    parallel_config: Some(RegisterDef::word("parallel_config", 113, Scale::Unit, Cat::Parallel)),
    grid_power: RegisterDef::word("grid_power", 114, Scale::Unit, Cat::Runtime),
    generator_voltage: Some(RegisterDef::word(
        "generator_voltage",
        121,
        Scale::Div10,
        Cat::Generator,
    )),
    generator_frequency: Some(RegisterDef::word(
        "generator_frequency",
        122,
        Scale::Div100,
        Cat::Generator,
    )),
    generator_power: Some(RegisterDef::word("generator_power", 123, Scale::Unit, Cat::Generator)),
    eps_l1_voltage: Some(RegisterDef::word("eps_l1_voltage", 127, Scale::Div10, Cat::Runtime)),
    eps_l2_voltage: Some(RegisterDef::word("eps_l2_voltage", 128, Scale::Div10, Cat::Runtime)),
    eps_l1_power: Some(RegisterDef::word("eps_l1_power", 129, Scale::Unit, Cat::Runtime)),
    eps_l2_power: Some(RegisterDef::word("eps_l2_power", 130, Scale::Unit, Cat::Runtime)),
    output_power: Some(RegisterDef::word("output_power", 170, Scale::Unit, Cat::Runtime)),
};

pub static ENERGY_MAP: EnergyRegisterMap = EnergyRegisterMap {
    family: "PV_SERIES",

    pv1_energy_today: RegisterDef::word("pv1_energy_today", 28, Scale::Div10, Cat::EnergyDaily),
    pv2_energy_today: RegisterDef::word("pv2_energy_today", 29, Scale::Div10, Cat::EnergyDaily),
    pv3_energy_today: Some(RegisterDef::word(
        "pv3_energy_today",
        30,
        Scale::Div10,
        Cat::EnergyDaily,
    )),
    inverter_energy_today: RegisterDef::word(
        "inverter_energy_today",
        31,
        Scale::Div10,
        Cat::EnergyDaily,
    ),
    ac_charge_energy_today: RegisterDef::word(
        "ac_charge_energy_today",
        32,
        Scale::Div10,
        Cat::EnergyDaily,
    ),
    charge_energy_today: RegisterDef::word("charge_energy_today", 33, Scale::Div10, Cat::EnergyDaily),
    discharge_energy_today: RegisterDef::word(
        "discharge_energy_today",
        34,
        Scale::Div10,
        Cat::EnergyDaily,
    ),
    eps_energy_today: RegisterDef::word("eps_energy_today", 35, Scale::Div10, Cat::EnergyDaily),
    export_energy_today: RegisterDef::word(
        "export_energy_today",
        36,
        Scale::Div10,
        Cat::EnergyDaily,
    ),
    import_energy_today: RegisterDef::word(
        "import_energy_today",
        37,
        Scale::Div10,
        Cat::EnergyDaily,
    ),

    pv1_energy_total: RegisterDef::dword("pv1_energy_total", 40, Scale::Div10, Cat::EnergyLifetime),
    pv2_energy_total: RegisterDef::dword("pv2_energy_total", 42, Scale::Div10, Cat::EnergyLifetime),
    pv3_energy_total: Some(RegisterDef::dword(
        "pv3_energy_total",
        44,
        Scale::Div10,
        Cat::EnergyLifetime,
    )),
    inverter_energy_total: RegisterDef::dword(
        "inverter_energy_total",
        46,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),
    ac_charge_energy_total: RegisterDef::dword(
        "ac_charge_energy_total",
        48,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),
    charge_energy_total: RegisterDef::dword(
        "charge_energy_total",
        50,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),
    discharge_energy_total: RegisterDef::dword(
        "discharge_energy_total",
        52,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),
    eps_energy_total: RegisterDef::dword("eps_energy_total", 54, Scale::Div10, Cat::EnergyLifetime),
    export_energy_total: RegisterDef::dword(
        "export_energy_total",
        56,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),
    import_energy_total: RegisterDef::dword(
        "import_energy_total",
        58,
        Scale::Div10,
        Cat::EnergyLifetime,
    ),

    generator_energy_today: Some(RegisterDef::word(
        "generator_energy_today",
        124,
        Scale::Div10,
        Cat::EnergyDaily,
    )),
    generator_energy_total: Some(RegisterDef::dword(
        "generator_energy_total",
        125,
        Scale::Div10,
        Cat::EnergyLifetime,
    )),
};
