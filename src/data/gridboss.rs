//! GridBOSS/MID runtime record and decoder.

use serde::{Deserialize, Serialize};

use crate::data::safe_sum;
use crate::registers::gridboss::GridBossRegisterMap;
use crate::registers::RawRegisters;

/// Runtime telemetry for a GridBOSS/MID grid-interface device: per-leg
/// grid/UPS/generator/smart-load metering on the split-phase service.
/// Aggregate accessors sum the legs, returning `None` only when neither leg
/// reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidboxRuntimeData {
    pub status: Option<u16>,

    pub grid_l1_voltage: Option<f64>,
    pub grid_l2_voltage: Option<f64>,
    pub ups_l1_voltage: Option<f64>,
    pub ups_l2_voltage: Option<f64>,
    pub generator_l1_voltage: Option<f64>,
    pub generator_l2_voltage: Option<f64>,

    pub grid_l1_current: Option<f64>,
    pub grid_l2_current: Option<f64>,
    pub load_l1_current: Option<f64>,
    pub load_l2_current: Option<f64>,
    pub generator_l1_current: Option<f64>,
    pub generator_l2_current: Option<f64>,
    pub ups_l1_current: Option<f64>,
    pub ups_l2_current: Option<f64>,

    /// Grid leg power, signed: import positive, export negative.
    pub grid_l1_power: Option<i64>,
    pub grid_l2_power: Option<i64>,
    pub load_l1_power: Option<i64>,
    pub load_l2_power: Option<i64>,
    pub generator_l1_power: Option<i64>,
    pub generator_l2_power: Option<i64>,
    pub ups_l1_power: Option<i64>,
    pub ups_l2_power: Option<i64>,
    /// Hybrid (inverter port) leg power, signed.
    pub hybrid_l1_power: Option<i64>,
    pub hybrid_l2_power: Option<i64>,

    pub smart_load1_l1_power: Option<i64>,
    pub smart_load1_l2_power: Option<i64>,
    pub smart_load2_l1_power: Option<i64>,
    pub smart_load2_l2_power: Option<i64>,
    pub smart_load3_l1_power: Option<i64>,
    pub smart_load3_l2_power: Option<i64>,
    pub smart_load4_l1_power: Option<i64>,
    pub smart_load4_l2_power: Option<i64>,

    /// Smart port operating modes (0 = unused, 1 = smart load, 2 = AC couple).
    pub smart_port1_status: Option<u16>,
    pub smart_port2_status: Option<u16>,
    pub smart_port3_status: Option<u16>,
    pub smart_port4_status: Option<u16>,

    pub ups_energy_today_l1: Option<f64>,
    pub ups_energy_today_l2: Option<f64>,
    pub to_grid_energy_today_l1: Option<f64>,
    pub to_grid_energy_today_l2: Option<f64>,
    pub to_user_energy_today_l1: Option<f64>,
    pub to_user_energy_today_l2: Option<f64>,
    pub smart_load1_energy_today_l1: Option<f64>,
    pub smart_load1_energy_today_l2: Option<f64>,
    pub smart_load2_energy_today_l1: Option<f64>,
    pub smart_load2_energy_today_l2: Option<f64>,
    pub smart_load3_energy_today_l1: Option<f64>,
    pub smart_load3_energy_today_l2: Option<f64>,
    pub smart_load4_energy_today_l1: Option<f64>,
    pub smart_load4_energy_today_l2: Option<f64>,
    pub ac_couple_energy_today_l1: Option<f64>,
    pub ac_couple_energy_today_l2: Option<f64>,

    pub ups_energy_total_l1: Option<f64>,
    pub ups_energy_total_l2: Option<f64>,
    pub to_grid_energy_total_l1: Option<f64>,
    pub to_grid_energy_total_l2: Option<f64>,
    pub to_user_energy_total_l1: Option<f64>,
    pub to_user_energy_total_l2: Option<f64>,
    pub smart_load1_energy_total_l1: Option<f64>,
    pub smart_load1_energy_total_l2: Option<f64>,
    pub smart_load2_energy_total_l1: Option<f64>,
    pub smart_load2_energy_total_l2: Option<f64>,
    pub smart_load3_energy_total_l1: Option<f64>,
    pub smart_load3_energy_total_l2: Option<f64>,
    pub smart_load4_energy_total_l1: Option<f64>,
    pub smart_load4_energy_total_l2: Option<f64>,
    pub ac_couple_energy_total_l1: Option<f64>,
    pub ac_couple_energy_total_l2: Option<f64>,

    pub phase_lock_frequency: Option<f64>,
    pub grid_frequency: Option<f64>,
    pub generator_frequency: Option<f64>,
}

impl MidboxRuntimeData {
    pub fn from_registers(regs: &RawRegisters, map: &GridBossRegisterMap) -> Self {
        Self {
            status: regs.get(map.status.address),

            grid_l1_voltage: map.grid_l1_voltage.value(regs),
            grid_l2_voltage: map.grid_l2_voltage.value(regs),
            ups_l1_voltage: map.ups_l1_voltage.value(regs),
            ups_l2_voltage: map.ups_l2_voltage.value(regs),
            generator_l1_voltage: map.generator_l1_voltage.value(regs),
            generator_l2_voltage: map.generator_l2_voltage.value(regs),

            grid_l1_current: map.grid_l1_current.value(regs),
            grid_l2_current: map.grid_l2_current.value(regs),
            load_l1_current: map.load_l1_current.value(regs),
            load_l2_current: map.load_l2_current.value(regs),
            generator_l1_current: map.generator_l1_current.value(regs),
            generator_l2_current: map.generator_l2_current.value(regs),
            ups_l1_current: map.ups_l1_current.value(regs),
            ups_l2_current: map.ups_l2_current.value(regs),

            grid_l1_power: map.grid_l1_power.raw(regs),
            grid_l2_power: map.grid_l2_power.raw(regs),
            load_l1_power: map.load_l1_power.integer(regs),
            load_l2_power: map.load_l2_power.integer(regs),
            generator_l1_power: map.generator_l1_power.integer(regs),
            generator_l2_power: map.generator_l2_power.integer(regs),
            ups_l1_power: map.ups_l1_power.integer(regs),
            ups_l2_power: map.ups_l2_power.integer(regs),
            hybrid_l1_power: map.hybrid_l1_power.raw(regs),
            hybrid_l2_power: map.hybrid_l2_power.raw(regs),

            smart_load1_l1_power: map.smart_load1_l1_power.integer(regs),
            smart_load1_l2_power: map.smart_load1_l2_power.integer(regs),
            smart_load2_l1_power: map.smart_load2_l1_power.integer(regs),
            smart_load2_l2_power: map.smart_load2_l2_power.integer(regs),
            smart_load3_l1_power: map.smart_load3_l1_power.integer(regs),
            smart_load3_l2_power: map.smart_load3_l2_power.integer(regs),
            smart_load4_l1_power: map.smart_load4_l1_power.integer(regs),
            smart_load4_l2_power: map.smart_load4_l2_power.integer(regs),

            smart_port1_status: regs.get(map.smart_port1_status.address),
            smart_port2_status: regs.get(map.smart_port2_status.address),
            smart_port3_status: regs.get(map.smart_port3_status.address),
            smart_port4_status: regs.get(map.smart_port4_status.address),

            ups_energy_today_l1: map.ups_energy_today_l1.value(regs),
            ups_energy_today_l2: map.ups_energy_today_l2.value(regs),
            to_grid_energy_today_l1: map.to_grid_energy_today_l1.value(regs),
            to_grid_energy_today_l2: map.to_grid_energy_today_l2.value(regs),
            to_user_energy_today_l1: map.to_user_energy_today_l1.value(regs),
            to_user_energy_today_l2: map.to_user_energy_today_l2.value(regs),
            smart_load1_energy_today_l1: map.smart_load1_energy_today_l1.value(regs),
            smart_load1_energy_today_l2: map.smart_load1_energy_today_l2.value(regs),
            smart_load2_energy_today_l1: map.smart_load2_energy_today_l1.value(regs),
            smart_load2_energy_today_l2: map.smart_load2_energy_today_l2.value(regs),
            smart_load3_energy_today_l1: map.smart_load3_energy_today_l1.value(regs),
            smart_load3_energy_today_l2: map.smart_load3_energy_today_l2.value(regs),
            smart_load4_energy_today_l1: map.smart_load4_energy_today_l1.value(regs),
            smart_load4_energy_today_l2: map.smart_load4_energy_today_l2.value(regs),
            ac_couple_energy_today_l1: map.ac_couple_energy_today_l1.value(regs),
            ac_couple_energy_today_l2: map.ac_couple_energy_today_l2.value(regs),

            ups_energy_total_l1: map.ups_energy_total_l1.value(regs),
            ups_energy_total_l2: map.ups_energy_total_l2.value(regs),
            to_grid_energy_total_l1: map.to_grid_energy_total_l1.value(regs),
            to_grid_energy_total_l2: map.to_grid_energy_total_l2.value(regs),
            to_user_energy_total_l1: map.to_user_energy_total_l1.value(regs),
            to_user_energy_total_l2: map.to_user_energy_total_l2.value(regs),
            smart_load1_energy_total_l1: map.smart_load1_energy_total_l1.value(regs),
            smart_load1_energy_total_l2: map.smart_load1_energy_total_l2.value(regs),
            smart_load2_energy_total_l1: map.smart_load2_energy_total_l1.value(regs),
            smart_load2_energy_total_l2: map.smart_load2_energy_total_l2.value(regs),
            smart_load3_energy_total_l1: map.smart_load3_energy_total_l1.value(regs),
            smart_load3_energy_total_l2: map.smart_load3_energy_total_l2.value(regs),
            smart_load4_energy_total_l1: map.smart_load4_energy_total_l1.value(regs),
            smart_load4_energy_total_l2: map.smart_load4_energy_total_l2.value(regs),
            ac_couple_energy_total_l1: map.ac_couple_energy_total_l1.value(regs),
            ac_couple_energy_total_l2: map.ac_couple_energy_total_l2.value(regs),

            phase_lock_frequency: map.phase_lock_frequency.value(regs),
            grid_frequency: map.grid_frequency.value(regs),
            generator_frequency: map.generator_frequency.value(regs),
        }
    }

    pub fn grid_power(&self) -> Option<i64> {
        safe_sum(&[self.grid_l1_power, self.grid_l2_power])
    }

    pub fn load_power(&self) -> Option<i64> {
        safe_sum(&[self.load_l1_power, self.load_l2_power])
    }

    pub fn generator_power(&self) -> Option<i64> {
        safe_sum(&[self.generator_l1_power, self.generator_l2_power])
    }

    pub fn ups_power(&self) -> Option<i64> {
        safe_sum(&[self.ups_l1_power, self.ups_l2_power])
    }

    pub fn hybrid_power(&self) -> Option<i64> {
        safe_sum(&[self.hybrid_l1_power, self.hybrid_l2_power])
    }

    pub fn smart_load1_power(&self) -> Option<i64> {
        safe_sum(&[self.smart_load1_l1_power, self.smart_load1_l2_power])
    }

    pub fn smart_load2_power(&self) -> Option<i64> {
        safe_sum(&[self.smart_load2_l1_power, self.smart_load2_l2_power])
    }

    pub fn smart_load3_power(&self) -> Option<i64> {
        safe_sum(&[self.smart_load3_l1_power, self.smart_load3_l2_power])
    }

    pub fn smart_load4_power(&self) -> Option<i64> {
        safe_sum(&[self.smart_load4_l1_power, self.smart_load4_l2_power])
    }

    /// Off-grid when the UPS side carries load while the grid legs are dead.
    pub fn is_off_grid(&self) -> bool {
        let grid_dead = matches!(self.grid_l1_voltage, Some(v) if v < 80.0)
            && matches!(self.grid_l2_voltage, Some(v) if v < 80.0);
        grid_dead && self.ups_power().unwrap_or(0) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::gridboss::RUNTIME_MAP;

    fn regs(pairs: &[(u16, u16)]) -> RawRegisters {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_per_leg_decode() {
        let raw = regs(&[
            (1, 1203),
            (2, 1198),
            (7, 1250),
            (15, 0xFC18), // -1000 W (exporting)
            (16, 800),
            (17, 450),
            (18, 620),
            (129, 6001),
        ]);
        let data = MidboxRuntimeData::from_registers(&raw, &RUNTIME_MAP);
        assert_eq!(data.grid_l1_voltage, Some(120.3));
        assert_eq!(data.grid_l2_voltage, Some(119.8));
        assert_eq!(data.grid_l1_current, Some(12.5));
        assert_eq!(data.grid_l1_power, Some(-1000));
        assert_eq!(data.grid_l2_power, Some(800));
        assert_eq!(data.grid_power(), Some(-200));
        assert_eq!(data.load_power(), Some(1070));
        assert_eq!(data.grid_frequency, Some(60.01));
    }

    #[test]
    fn test_aggregate_none_only_when_both_legs_missing() {
        let raw = regs(&[(21, 300)]);
        let data = MidboxRuntimeData::from_registers(&raw, &RUNTIME_MAP);
        assert_eq!(data.ups_power(), Some(300));
        assert_eq!(data.generator_power(), None);
    }

    #[test]
    fn test_lifetime_energy_pairs() {
        let raw = regs(&[(68, 52000), (69, 1), (70, 100), (71, 0)]);
        let data = MidboxRuntimeData::from_registers(&raw, &RUNTIME_MAP);
        assert_eq!(data.ups_energy_total_l1, Some(11753.6));
        assert_eq!(data.ups_energy_total_l2, Some(10.0));
    }

    #[test]
    fn test_off_grid_detection() {
        let on_grid = regs(&[(1, 1200), (2, 1200), (21, 500), (22, 500)]);
        assert!(!MidboxRuntimeData::from_registers(&on_grid, &RUNTIME_MAP).is_off_grid());

        let off_grid = regs(&[(1, 0), (2, 0), (21, 500), (22, 500)]);
        assert!(MidboxRuntimeData::from_registers(&off_grid, &RUNTIME_MAP).is_off_grid());
    }
}
