//! Declarative register maps for the supported device families.
//!
//! Each logical field is described by one [`RegisterDef`] entry: address, bit
//! width, signedness, scale and optional byte/bit packing. The decoders in
//! [`crate::data`] contain no per-field logic beyond walking these tables;
//! the three packing specialisations (SOC/SOH byte split, parallel-config
//! bit fields, multi-register ASCII strings) are handled explicitly.

use std::collections::HashMap;

pub mod gridboss;
pub mod lxp_eu;
pub mod pv_series;

/// Inverter model family, selecting the register map used for decoding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InverterFamily {
    /// EG4 18kPV and related North American hybrid models.
    PvSeries,
    /// FlexBOSS21 (shares the PV_SERIES register layout).
    Flexboss,
    /// LXP-EU 12K and similar European models.
    LxpEu,
    /// SNA series off-grid models (PV_SERIES layout until mapped separately).
    Sna,
    /// GridBOSS/MID grid-interface device (separate register layout).
    GridBossMid,
}

impl InverterFamily {
    /// Runtime register map for this family.
    ///
    /// GridBOSS devices are decoded through [`gridboss::RUNTIME_MAP`] by
    /// `read_midbox_runtime`; their inverter-style map falls back to
    /// PV_SERIES so identity reads keep working.
    pub fn runtime_map(self) -> &'static RuntimeRegisterMap {
        match self {
            InverterFamily::LxpEu => &lxp_eu::RUNTIME_MAP,
            _ => &pv_series::RUNTIME_MAP,
        }
    }

    /// Energy register map for this family.
    pub fn energy_map(self) -> &'static EnergyRegisterMap {
        match self {
            InverterFamily::LxpEu => &lxp_eu::ENERGY_MAP,
            _ => &pv_series::ENERGY_MAP,
        }
    }

    /// Whether this family is a grid-interface (MID) device rather than an
    /// inverter.
    pub fn is_grid_interface(self) -> bool {
        matches!(self, InverterFamily::GridBossMid)
    }
}

/// Physical scaling applied to a raw register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterScale {
    /// Value is already in engineering units (watts, Ah, counts).
    Unit,
    Div10,
    Div100,
    Div1000,
}

impl RegisterScale {
    /// Apply the scale to a raw value. Implemented as division so decade
    /// scales stay exact in floating point (5100 ÷ 10 is exactly 510.0).
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            RegisterScale::Unit => raw,
            RegisterScale::Div10 => raw / 10.0,
            RegisterScale::Div100 => raw / 100.0,
            RegisterScale::Div1000 => raw / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    /// Single 16-bit word.
    Word,
    /// 32-bit value: low word at the register address, high word at +1.
    DoubleWord,
}

/// Sub-word packing for registers that carry more than one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    LowByte,
    HighByte,
    BitMask(u16),
}

/// Register category, governing which read groups a high-level operation
/// must fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterCategory {
    Runtime,
    EnergyDaily,
    EnergyLifetime,
    Bms,
    Temperature,
    Status,
    Fault,
    Generator,
    Parallel,
    GridInterfaceRuntime,
    GridInterfaceEnergy,
}

/// One logical field: everything needed to extract its value from a raw
/// address→word map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub address: u16,
    pub width: RegisterWidth,
    pub sign: Signedness,
    pub scale: RegisterScale,
    pub category: RegisterCategory,
    pub packing: Option<Packing>,
}

impl RegisterDef {
    pub const fn word(
        name: &'static str,
        address: u16,
        scale: RegisterScale,
        category: RegisterCategory,
    ) -> Self {
        Self {
            name,
            address,
            width: RegisterWidth::Word,
            sign: Signedness::Unsigned,
            scale,
            category,
            packing: None,
        }
    }

    pub const fn word_signed(
        name: &'static str,
        address: u16,
        scale: RegisterScale,
        category: RegisterCategory,
    ) -> Self {
        Self {
            name,
            address,
            width: RegisterWidth::Word,
            sign: Signedness::Signed,
            scale,
            category,
            packing: None,
        }
    }

    pub const fn dword(
        name: &'static str,
        address: u16,
        scale: RegisterScale,
        category: RegisterCategory,
    ) -> Self {
        Self {
            name,
            address,
            width: RegisterWidth::DoubleWord,
            sign: Signedness::Unsigned,
            scale,
            category,
            packing: None,
        }
    }

    pub const fn low_byte(name: &'static str, address: u16, category: RegisterCategory) -> Self {
        Self {
            name,
            address,
            width: RegisterWidth::Word,
            sign: Signedness::Unsigned,
            scale: RegisterScale::Unit,
            category,
            packing: Some(Packing::LowByte),
        }
    }

    pub const fn high_byte(name: &'static str, address: u16, category: RegisterCategory) -> Self {
        Self {
            name,
            address,
            width: RegisterWidth::Word,
            sign: Signedness::Unsigned,
            scale: RegisterScale::Unit,
            category,
            packing: Some(Packing::HighByte),
        }
    }

    /// Raw integer value after packing, width merge and sign conversion.
    /// Scale is NOT applied. Returns `None` whenever a required word is
    /// absent from the map.
    pub fn raw(&self, regs: &RawRegisters) -> Option<i64> {
        match self.width {
            RegisterWidth::Word => {
                let word = regs.get(self.address)?;
                let packed = match self.packing {
                    Some(Packing::LowByte) => (word & 0x00FF) as i64,
                    Some(Packing::HighByte) => ((word >> 8) & 0x00FF) as i64,
                    Some(Packing::BitMask(mask)) => {
                        (word & mask) as i64 >> mask.trailing_zeros()
                    }
                    None => match self.sign {
                        Signedness::Signed => word as i16 as i64,
                        Signedness::Unsigned => word as i64,
                    },
                };
                Some(packed)
            }
            RegisterWidth::DoubleWord => {
                let low = regs.get(self.address)?;
                let high = regs.get(self.address.wrapping_add(1))?;
                let merged = ((high as u32) << 16) | low as u32;
                Some(match self.sign {
                    Signedness::Signed => merged as i32 as i64,
                    Signedness::Unsigned => merged as i64,
                })
            }
        }
    }

    /// Scaled engineering value.
    pub fn value(&self, regs: &RawRegisters) -> Option<f64> {
        Some(self.scale.apply(self.raw(regs)? as f64))
    }

    /// Raw value as an integer, for fields whose scale is already ×1
    /// (powers in watts, counts, codes).
    pub fn integer(&self, regs: &RawRegisters) -> Option<i64> {
        debug_assert!(matches!(self.scale, RegisterScale::Unit));
        self.raw(regs)
    }
}

/// Transient address→word map produced by one read. Unordered; absent
/// addresses decode to `None` downstream.
#[derive(Debug, Default, Clone)]
pub struct RawRegisters {
    words: HashMap<u16, u16>,
}

impl RawRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        self.words.get(&address).copied()
    }

    pub fn insert(&mut self, address: u16, value: u16) {
        self.words.insert(address, value);
    }

    /// Absorb a contiguous block returned by a register read.
    pub fn absorb_block(&mut self, start: u16, values: &[u16]) {
        for (offset, &value) in values.iter().enumerate() {
            self.words.insert(start.wrapping_add(offset as u16), value);
        }
    }

    pub fn merge(&mut self, other: RawRegisters) {
        self.words.extend(other.words);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl FromIterator<(u16, u16)> for RawRegisters {
    fn from_iter<T: IntoIterator<Item = (u16, u16)>>(iter: T) -> Self {
        Self {
            words: iter.into_iter().collect(),
        }
    }
}

/// A contiguous window of input registers fetched with one FC4 request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterGroup {
    pub name: &'static str,
    pub start: u16,
    pub count: u16,
}

impl RegisterGroup {
    pub const fn new(name: &'static str, start: u16, count: u16) -> Self {
        Self { name, start, count }
    }
}

/// Input register groups for inverter families, sized to the conservative
/// 40-register per-request limit. Groups are read in declared order.
pub const INPUT_REGISTER_GROUPS: [RegisterGroup; 6] = [
    RegisterGroup::new("power_energy", 0, 32),
    RegisterGroup::new("status_energy", 32, 32),
    RegisterGroup::new("temperatures", 64, 16),
    RegisterGroup::new("bms_data", 80, 33),
    RegisterGroup::new("extended_data", 113, 18),
    RegisterGroup::new("output_power", 170, 2),
];

/// Groups needed by `read_energy`: daily counters live in the first two,
/// BMS passthrough supplies the battery-side statistics.
pub const ENERGY_PRIMARY_GROUPS: [&str; 2] = ["power_energy", "status_energy"];
pub const ENERGY_SUPPLEMENTARY_GROUP: &str = "bms_data";

/// Conservative per-request register ceiling for local transports. Below the
/// Modbus 125-word protocol limit so one request always fits a framed dongle
/// MTU.
pub const MAX_REGISTERS_PER_READ: u16 = 40;

/// Input register carrying the packed parallel-system configuration.
pub const INPUT_PARALLEL_CONFIG_ADDRESS: u16 = 113;

// Identity windows (holding registers, FC3).
pub const HOLD_FIRMWARE_ADDRESS: u16 = 7;
pub const HOLD_FIRMWARE_WORDS: u16 = 4;
pub const HOLD_DEVICE_TYPE_ADDRESS: u16 = 19;
pub const HOLD_SERIAL_ADDRESS: u16 = 115;
pub const HOLD_SERIAL_WORDS: u16 = 5;

// Individual battery module blocks (input registers).
pub const BATTERY_MODULE_BASE_ADDRESS: u16 = 5000;
pub const BATTERY_MODULE_WORDS: u16 = 30;
pub const BATTERY_MODULE_MAX_COUNT: u16 = 10;
/// Module block status header value reported by connected modules.
pub const BATTERY_MODULE_CONNECTED: u16 = 0xC003;

/// Bank voltage at or below this threshold means "no battery present".
pub const NO_BATTERY_VOLTAGE_THRESHOLD: f64 = 5.0;

/// Runtime register map: one entry per canonical runtime field. Fields that
/// only exist on some families are `Option`.
#[derive(Debug)]
pub struct RuntimeRegisterMap {
    pub family: &'static str,

    pub status: RegisterDef,
    pub pv1_voltage: RegisterDef,
    pub pv2_voltage: RegisterDef,
    pub pv3_voltage: Option<RegisterDef>,
    pub battery_voltage: RegisterDef,
    pub soc_soh_packed: RegisterDef,
    pub internal_fault: RegisterDef,
    pub pv1_power: RegisterDef,
    pub pv2_power: RegisterDef,
    pub pv3_power: Option<RegisterDef>,
    pub battery_charge_power: RegisterDef,
    pub battery_discharge_power: RegisterDef,
    pub grid_voltage_r: RegisterDef,
    pub grid_voltage_s: RegisterDef,
    pub grid_voltage_t: RegisterDef,
    pub grid_frequency: RegisterDef,
    pub inverter_power: RegisterDef,
    pub rectifier_power: RegisterDef,
    pub inverter_current_rms: RegisterDef,
    pub power_factor: RegisterDef,
    pub eps_voltage_r: RegisterDef,
    pub eps_voltage_s: RegisterDef,
    pub eps_voltage_t: RegisterDef,
    pub eps_frequency: RegisterDef,
    pub eps_power: RegisterDef,
    pub eps_apparent_power: RegisterDef,
    pub power_to_grid: RegisterDef,
    pub load_power: RegisterDef,
    pub bus_voltage_1: RegisterDef,
    pub bus_voltage_2: RegisterDef,
    pub fault_code: RegisterDef,
    pub warning_code: RegisterDef,
    pub internal_temperature: RegisterDef,
    pub radiator_temperature_1: RegisterDef,
    pub radiator_temperature_2: RegisterDef,
    pub battery_temperature: RegisterDef,
    pub bms_charge_current_limit: RegisterDef,
    pub bms_discharge_current_limit: RegisterDef,
    pub bms_charge_voltage_ref: RegisterDef,
    pub bms_discharge_cutoff_voltage: RegisterDef,
    pub battery_status_inv: RegisterDef,
    pub battery_count: RegisterDef,
    pub battery_capacity_ah: RegisterDef,
    pub battery_current: RegisterDef,
    pub bms_fault_code: RegisterDef,
    pub bms_warning_code: RegisterDef,
    pub max_cell_voltage: RegisterDef,
    pub min_cell_voltage: RegisterDef,
    pub max_cell_temperature: RegisterDef,
    pub min_cell_temperature: RegisterDef,
    pub bms_cycle_count: RegisterDef,
    pub battery_voltage_sample: RegisterDef,
    pub parallel_config: Option<RegisterDef>,
    pub grid_power: RegisterDef,
    pub generator_voltage: Option<RegisterDef>,
    pub generator_frequency: Option<RegisterDef>,
    pub generator_power: Option<RegisterDef>,
    pub eps_l1_voltage: Option<RegisterDef>,
    pub eps_l2_voltage: Option<RegisterDef>,
    pub eps_l1_power: Option<RegisterDef>,
    pub eps_l2_power: Option<RegisterDef>,
    pub output_power: Option<RegisterDef>,
}

/// Energy register map: daily counters are single words, lifetime counters
/// are 32-bit low/high word pairs. All values scale ÷10 to kWh.
#[derive(Debug)]
pub struct EnergyRegisterMap {
    pub family: &'static str,

    pub pv1_energy_today: RegisterDef,
    pub pv2_energy_today: RegisterDef,
    pub pv3_energy_today: Option<RegisterDef>,
    pub inverter_energy_today: RegisterDef,
    pub ac_charge_energy_today: RegisterDef,
    pub charge_energy_today: RegisterDef,
    pub discharge_energy_today: RegisterDef,
    pub eps_energy_today: RegisterDef,
    pub export_energy_today: RegisterDef,
    pub import_energy_today: RegisterDef,

    pub pv1_energy_total: RegisterDef,
    pub pv2_energy_total: RegisterDef,
    pub pv3_energy_total: Option<RegisterDef>,
    pub inverter_energy_total: RegisterDef,
    pub ac_charge_energy_total: RegisterDef,
    pub charge_energy_total: RegisterDef,
    pub discharge_energy_total: RegisterDef,
    pub eps_energy_total: RegisterDef,
    pub export_energy_total: RegisterDef,
    pub import_energy_total: RegisterDef,

    pub generator_energy_today: Option<RegisterDef>,
    pub generator_energy_total: Option<RegisterDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs(pairs: &[(u16, u16)]) -> RawRegisters {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_word_decode_unsigned() {
        let def = RegisterDef::word("grid_voltage_r", 12, RegisterScale::Div10, RegisterCategory::Runtime);
        let r = regs(&[(12, 2410)]);
        assert_eq!(def.value(&r), Some(241.0));
    }

    #[test]
    fn test_word_decode_signed() {
        let def = RegisterDef::word_signed(
            "battery_current",
            98,
            RegisterScale::Div10,
            RegisterCategory::Bms,
        );
        let r = regs(&[(98, 0xFFFE)]);
        // 0xFFFE is -2 signed, ÷10 => -0.2
        let value = def.value(&r).unwrap();
        assert!((value - (-0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_register_is_none() {
        let def = RegisterDef::word("pv1_voltage", 1, RegisterScale::Div10, RegisterCategory::Runtime);
        assert_eq!(def.value(&RawRegisters::new()), None);
    }

    #[test]
    fn test_dword_requires_both_words() {
        let def = RegisterDef::dword(
            "pv1_energy_total",
            40,
            RegisterScale::Div10,
            RegisterCategory::EnergyLifetime,
        );
        let only_low = regs(&[(40, 500)]);
        assert_eq!(def.value(&only_low), None);

        let only_high = regs(&[(41, 1)]);
        assert_eq!(def.value(&only_high), None);

        let both = regs(&[(40, 500), (41, 1)]);
        // (1 << 16 | 500) ÷ 10
        assert_eq!(def.value(&both), Some(6603.6));
    }

    #[test]
    fn test_byte_packing() {
        let soc = RegisterDef::low_byte("battery_soc", 5, RegisterCategory::Runtime);
        let soh = RegisterDef::high_byte("battery_soh", 5, RegisterCategory::Runtime);
        let r = regs(&[(5, 0x6455)]);
        assert_eq!(soc.raw(&r), Some(0x55)); // 85
        assert_eq!(soh.raw(&r), Some(0x64)); // 100
    }

    #[test]
    fn test_bitmask_packing() {
        let def = RegisterDef {
            name: "parallel_units",
            address: 113,
            width: RegisterWidth::Word,
            sign: Signedness::Unsigned,
            scale: RegisterScale::Unit,
            category: RegisterCategory::Parallel,
            packing: Some(Packing::BitMask(0xFF00)),
        };
        let r = regs(&[(113, 0x0305)]);
        assert_eq!(def.raw(&r), Some(3));
    }

    #[test]
    fn test_absorb_block() {
        let mut r = RawRegisters::new();
        r.absorb_block(64, &[45, 40, 41, 22]);
        assert_eq!(r.get(64), Some(45));
        assert_eq!(r.get(67), Some(22));
        assert_eq!(r.get(68), None);
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn test_input_register_groups_cover_runtime_range() {
        // The first five groups tile 0..131 without gaps.
        let mut next = 0u16;
        for group in &INPUT_REGISTER_GROUPS[..5] {
            assert_eq!(group.start, next);
            assert!(group.count <= MAX_REGISTERS_PER_READ);
            next = group.start + group.count;
        }
        assert_eq!(next, 131);
        assert_eq!(INPUT_REGISTER_GROUPS[5].start, 170);
    }

    #[test]
    fn test_family_map_selection() {
        assert_eq!(InverterFamily::PvSeries.runtime_map().family, "PV_SERIES");
        assert_eq!(InverterFamily::Flexboss.runtime_map().family, "PV_SERIES");
        assert_eq!(InverterFamily::Sna.runtime_map().family, "PV_SERIES");
        assert_eq!(InverterFamily::LxpEu.runtime_map().family, "LXP_EU");
        assert!(InverterFamily::GridBossMid.is_grid_interface());
        assert!(!InverterFamily::PvSeries.is_grid_interface());
    }

    #[test]
    fn test_family_display() {
        assert_eq!(InverterFamily::PvSeries.to_string(), "PV_SERIES");
        assert_eq!(InverterFamily::GridBossMid.to_string(), "GRID_BOSS_MID");
    }
}
