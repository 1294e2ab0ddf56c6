//! GridBOSS/MID register map.
//!
//! The grid-interface device reports per-leg (L1/L2 split-phase) metering for
//! the grid, UPS, generator and smart-load ports on a layout unrelated to the
//! inverter maps. Input registers 0–131, read in five windows.

use super::{RegisterCategory as Cat, RegisterDef, RegisterGroup, RegisterScale as Scale};

/// Read windows for `read_midbox_runtime`, issued in declared order.
pub const MIDBOX_REGISTER_GROUPS: [RegisterGroup; 5] = [
    RegisterGroup::new("metering", 0, 40),
    RegisterGroup::new("smart_load4_energy_today", 40, 28),
    RegisterGroup::new("energy_totals", 68, 40),
    RegisterGroup::new("port_status_ac_couple", 108, 12),
    RegisterGroup::new("frequencies", 128, 4),
];

/// GridBOSS runtime map. Voltages ÷10, currents ÷100, powers in watts (grid
/// and hybrid legs signed: import/charge positive), frequencies ÷100,
/// energies ÷10 kWh with 32-bit lifetime counters.
#[derive(Debug)]
pub struct GridBossRegisterMap {
    pub status: RegisterDef,

    pub grid_l1_voltage: RegisterDef,
    pub grid_l2_voltage: RegisterDef,
    pub ups_l1_voltage: RegisterDef,
    pub ups_l2_voltage: RegisterDef,
    pub generator_l1_voltage: RegisterDef,
    pub generator_l2_voltage: RegisterDef,

    pub grid_l1_current: RegisterDef,
    pub grid_l2_current: RegisterDef,
    pub load_l1_current: RegisterDef,
    pub load_l2_current: RegisterDef,
    pub generator_l1_current: RegisterDef,
    pub generator_l2_current: RegisterDef,
    pub ups_l1_current: RegisterDef,
    pub ups_l2_current: RegisterDef,

    pub grid_l1_power: RegisterDef,
    pub grid_l2_power: RegisterDef,
    pub load_l1_power: RegisterDef,
    pub load_l2_power: RegisterDef,
    pub generator_l1_power: RegisterDef,
    pub generator_l2_power: RegisterDef,
    pub ups_l1_power: RegisterDef,
    pub ups_l2_power: RegisterDef,
    pub hybrid_l1_power: RegisterDef,
    pub hybrid_l2_power: RegisterDef,

    pub smart_load1_l1_power: RegisterDef,
    pub smart_load1_l2_power: RegisterDef,
    pub smart_load2_l1_power: RegisterDef,
    pub smart_load2_l2_power: RegisterDef,
    pub smart_load3_l1_power: RegisterDef,
    pub smart_load3_l2_power: RegisterDef,
    pub smart_load4_l1_power: RegisterDef,
    pub smart_load4_l2_power: RegisterDef,

    pub ups_energy_today_l1: RegisterDef,
    pub ups_energy_today_l2: RegisterDef,
    pub to_grid_energy_today_l1: RegisterDef,
    pub to_grid_energy_today_l2: RegisterDef,
    pub to_user_energy_today_l1: RegisterDef,
    pub to_user_energy_today_l2: RegisterDef,
    pub smart_load1_energy_today_l1: RegisterDef,
    pub smart_load1_energy_today_l2: RegisterDef,
    pub smart_load2_energy_today_l1: RegisterDef,
    pub smart_load2_energy_today_l2: RegisterDef,
    pub smart_load3_energy_today_l1: RegisterDef,
    pub smart_load3_energy_today_l2: RegisterDef,
    pub smart_load4_energy_today_l1: RegisterDef,
    pub smart_load4_energy_today_l2: RegisterDef,
    pub ac_couple_energy_today_l1: RegisterDef,
    pub ac_couple_energy_today_l2: RegisterDef,

    pub ups_energy_total_l1: RegisterDef,
    pub ups_energy_total_l2: RegisterDef,
    pub to_grid_energy_total_l1: RegisterDef,
    pub to_grid_energy_total_l2: RegisterDef,
    pub to_user_energy_total_l1: RegisterDef,
    pub to_user_energy_total_l2: RegisterDef,
    pub smart_load1_energy_total_l1: RegisterDef,
    pub smart_load1_energy_total_l2: RegisterDef,
    pub smart_load2_energy_total_l1: RegisterDef,
    pub smart_load2_energy_total_l2: RegisterDef,
    pub smart_load3_energy_total_l1: RegisterDef,
    pub smart_load3_energy_total_l2: RegisterDef,
    pub smart_load4_energy_total_l1: RegisterDef,
    pub smart_load4_energy_total_l2: RegisterDef,

    pub smart_port1_status: RegisterDef,
    pub smart_port2_status: RegisterDef,
    pub smart_port3_status: RegisterDef,
    pub smart_port4_status: RegisterDef,
    pub ac_couple_energy_total_l1: RegisterDef,
    pub ac_couple_energy_total_l2: RegisterDef,

    pub phase_lock_frequency: RegisterDef,
    pub grid_frequency: RegisterDef,
    pub generator_frequency: RegisterDef,
}

pub static RUNTIME_MAP: GridBossRegisterMap = GridBossRegisterMap {
    status: RegisterDef::word("status", 0, Scale::Unit, Cat::Status),

    grid_l1_voltage: RegisterDef::word("grid_l1_voltage", 1, Scale::Div10, Cat::GridInterfaceRuntime),
    grid_l2_voltage: RegisterDef::word("grid_l2_voltage", 2, Scale::Div10, Cat::GridInterfaceRuntime),
    ups_l1_voltage: RegisterDef::word("ups_l1_voltage", 3, Scale::Div10, Cat::GridInterfaceRuntime),
    ups_l2_voltage: RegisterDef::word("ups_l2_voltage", 4, Scale::Div10, Cat::GridInterfaceRuntime),
    generator_l1_voltage: RegisterDef::word(
        "generator_l1_voltage",
        5,
        Scale::Div10,
        Cat::GridInterfaceRuntime,
    ),
    generator_l2_voltage: RegisterDef::word(
        "generator_l2_voltage",
        6,
        Scale::Div10,
        Cat::GridInterfaceRuntime,
    ),

    grid_l1_current: RegisterDef::word("grid_l1_current", 7, Scale::Div100, Cat::GridInterfaceRuntime),
    grid_l2_current: RegisterDef::word("grid_l2_current", 8, Scale::Div100, Cat::GridInterfaceRuntime),
    load_l1_current: RegisterDef::word("load_l1_current", 9, Scale::Div100, Cat::GridInterfaceRuntime),
    load_l2_current: RegisterDef::word(
        "load_l2_current",
        10,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
    generator_l1_current: RegisterDef::word(
        "generator_l1_current",
        11,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
    generator_l2_current: RegisterDef::word(
        "generator_l2_current",
        12,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
    ups_l1_current: RegisterDef::word("ups_l1_current", 13, Scale::Div100, Cat::GridInterfaceRuntime),
    ups_l2_current: RegisterDef::word("ups_l2_current", 14, Scale::Div100, Cat::GridInterfaceRuntime),

    grid_l1_power: RegisterDef::word_signed(
        "grid_l1_power",
        15,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    grid_l2_power: RegisterDef::word_signed(
        "grid_l2_power",
        16,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    load_l1_power: RegisterDef::word("load_l1_power", 17, Scale::Unit, Cat::GridInterfaceRuntime),
    load_l2_power: RegisterDef::word("load_l2_power", 18, Scale::Unit, Cat::GridInterfaceRuntime),
    generator_l1_power: RegisterDef::word(
        "generator_l1_power",
        19,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    generator_l2_power: RegisterDef::word(
        "generator_l2_power",
        20,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    ups_l1_power: RegisterDef::word("ups_l1_power", 21, Scale::Unit, Cat::GridInterfaceRuntime),
    ups_l2_power: RegisterDef::word("ups_l2_power", 22, Scale::Unit, Cat::GridInterfaceRuntime),
    hybrid_l1_power: RegisterDef::word_signed(
        "hybrid_l1_power",
        23,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    hybrid_l2_power: RegisterDef::word_signed(
        "hybrid_l2_power",
        24,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),

    smart_load1_l1_power: RegisterDef::word(
        "smart_load1_l1_power",
        25,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load1_l2_power: RegisterDef::word(
        "smart_load1_l2_power",
        26,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load2_l1_power: RegisterDef::word(
        "smart_load2_l1_power",
        27,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load2_l2_power: RegisterDef::word(
        "smart_load2_l2_power",
        28,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load3_l1_power: RegisterDef::word(
        "smart_load3_l1_power",
        29,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load3_l2_power: RegisterDef::word(
        "smart_load3_l2_power",
        30,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load4_l1_power: RegisterDef::word(
        "smart_load4_l1_power",
        40,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_load4_l2_power: RegisterDef::word(
        "smart_load4_l2_power",
        41,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),

    ups_energy_today_l1: RegisterDef::word(
        "ups_energy_today_l1",
        42,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    ups_energy_today_l2: RegisterDef::word(
        "ups_energy_today_l2",
        43,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_grid_energy_today_l1: RegisterDef::word(
        "to_grid_energy_today_l1",
        44,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_grid_energy_today_l2: RegisterDef::word(
        "to_grid_energy_today_l2",
        45,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_user_energy_today_l1: RegisterDef::word(
        "to_user_energy_today_l1",
        46,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_user_energy_today_l2: RegisterDef::word(
        "to_user_energy_today_l2",
        47,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load1_energy_today_l1: RegisterDef::word(
        "smart_load1_energy_today_l1",
        48,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load1_energy_today_l2: RegisterDef::word(
        "smart_load1_energy_today_l2",
        49,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load2_energy_today_l1: RegisterDef::word(
        "smart_load2_energy_today_l1",
        50,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load2_energy_today_l2: RegisterDef::word(
        "smart_load2_energy_today_l2",
        51,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load3_energy_today_l1: RegisterDef::word(
        "smart_load3_energy_today_l1",
        52,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load3_energy_today_l2: RegisterDef::word(
        "smart_load3_energy_today_l2",
        53,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load4_energy_today_l1: RegisterDef::word(
        "smart_load4_energy_today_l1",
        54,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load4_energy_today_l2: RegisterDef::word(
        "smart_load4_energy_today_l2",
        55,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    ac_couple_energy_today_l1: RegisterDef::word(
        "ac_couple_energy_today_l1",
        56,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    ac_couple_energy_today_l2: RegisterDef::word(
        "ac_couple_energy_today_l2",
        57,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),

    ups_energy_total_l1: RegisterDef::dword(
        "ups_energy_total_l1",
        68,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    ups_energy_total_l2: RegisterDef::dword(
        "ups_energy_total_l2",
        70,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_grid_energy_total_l1: RegisterDef::dword(
        "to_grid_energy_total_l1",
        72,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_grid_energy_total_l2: RegisterDef::dword(
        "to_grid_energy_total_l2",
        74,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_user_energy_total_l1: RegisterDef::dword(
        "to_user_energy_total_l1",
        76,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    to_user_energy_total_l2: RegisterDef::dword(
        "to_user_energy_total_l2",
        78,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load1_energy_total_l1: RegisterDef::dword(
        "smart_load1_energy_total_l1",
        80,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load1_energy_total_l2: RegisterDef::dword(
        "smart_load1_energy_total_l2",
        82,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load2_energy_total_l1: RegisterDef::dword(
        "smart_load2_energy_total_l1",
        84,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load2_energy_total_l2: RegisterDef::dword(
        "smart_load2_energy_total_l2",
        86,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load3_energy_total_l1: RegisterDef::dword(
        "smart_load3_energy_total_l1",
        88,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load3_energy_total_l2: RegisterDef::dword(
        "smart_load3_energy_total_l2",
        90,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load4_energy_total_l1: RegisterDef::dword(
        "smart_load4_energy_total_l1",
        92,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    smart_load4_energy_total_l2: RegisterDef::dword(
        "smart_load4_energy_total_l2",
        94,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),

    smart_port1_status: RegisterDef::word(
        "smart_port1_status",
        108,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_port2_status: RegisterDef::word(
        "smart_port2_status",
        109,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_port3_status: RegisterDef::word(
        "smart_port3_status",
        110,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    smart_port4_status: RegisterDef::word(
        "smart_port4_status",
        111,
        Scale::Unit,
        Cat::GridInterfaceRuntime,
    ),
    ac_couple_energy_total_l1: RegisterDef::dword(
        "ac_couple_energy_total_l1",
        112,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),
    ac_couple_energy_total_l2: RegisterDef::dword(
        "ac_couple_energy_total_l2",
        114,
        Scale::Div10,
        Cat::GridInterfaceEnergy,
    ),

    phase_lock_frequency: RegisterDef::word(
        "phase_lock_frequency",
        128,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
    grid_frequency: RegisterDef::word(
        "grid_frequency",
        129,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
    generator_frequency: RegisterDef::word(
        "generator_frequency",
        130,
        Scale::Div100,
        Cat::GridInterfaceRuntime,
    ),
};
