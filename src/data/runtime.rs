//! Inverter runtime record and its register decoder.

use serde::{Deserialize, Serialize};

use crate::data::{safe_sum, split_soc_soh};
use crate::registers::{RawRegisters, RuntimeRegisterMap};

/// Role of an inverter inside a parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelRole {
    Master,
    Slave,
    Unknown,
}

/// Phase assignment of a paralleled inverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelPhase {
    R,
    S,
    T,
}

/// Decoded parallel-system configuration word (register 113 on PV_SERIES):
/// role in bits 0–1, phase in bits 2–3, unit count in bits 8–15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub role: ParallelRole,
    pub phase: Option<ParallelPhase>,
    pub unit_count: u8,
}

impl ParallelConfig {
    pub fn from_word(word: u16) -> Self {
        let role = match word & 0x0003 {
            1 => ParallelRole::Master,
            2 => ParallelRole::Slave,
            _ => ParallelRole::Unknown,
        };
        let phase = match (word >> 2) & 0x0003 {
            1 => Some(ParallelPhase::R),
            2 => Some(ParallelPhase::S),
            3 => Some(ParallelPhase::T),
            _ => None,
        };
        let unit_count = ((word >> 8) & 0x00FF) as u8;
        Self {
            role,
            phase,
            unit_count,
        }
    }
}

/// Runtime telemetry decoded from one batch of input-register reads.
///
/// Every field is `Option`: a register missing from the read (chunk failed,
/// family doesn't map it) decodes to `None`, which is distinct from a zero
/// reading. Voltages are volts, currents amps, powers integer watts,
/// frequencies Hz, temperatures °C.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InverterRuntimeData {
    pub status: Option<u16>,

    pub pv1_voltage: Option<f64>,
    pub pv2_voltage: Option<f64>,
    pub pv3_voltage: Option<f64>,
    pub pv1_power: Option<i64>,
    pub pv2_power: Option<i64>,
    pub pv3_power: Option<i64>,

    pub battery_voltage: Option<f64>,
    pub battery_soc: Option<u8>,
    pub battery_soh: Option<u8>,
    pub battery_charge_power: Option<i64>,
    pub battery_discharge_power: Option<i64>,
    pub battery_current: Option<f64>,
    pub battery_temperature: Option<i64>,

    pub grid_voltage_r: Option<f64>,
    pub grid_voltage_s: Option<f64>,
    pub grid_voltage_t: Option<f64>,
    pub grid_frequency: Option<f64>,
    pub grid_power: Option<i64>,

    pub inverter_power: Option<i64>,
    pub rectifier_power: Option<i64>,
    pub inverter_current_rms: Option<f64>,
    pub power_factor: Option<f64>,

    pub eps_voltage_r: Option<f64>,
    pub eps_voltage_s: Option<f64>,
    pub eps_voltage_t: Option<f64>,
    pub eps_frequency: Option<f64>,
    pub eps_power: Option<i64>,
    pub eps_apparent_power: Option<i64>,
    pub eps_l1_voltage: Option<f64>,
    pub eps_l2_voltage: Option<f64>,

    pub power_to_grid: Option<i64>,
    pub load_power: Option<i64>,

    pub bus_voltage_1: Option<f64>,
    pub bus_voltage_2: Option<f64>,

    pub internal_fault: Option<u16>,
    pub fault_code: Option<u32>,
    pub warning_code: Option<u32>,

    pub internal_temperature: Option<i64>,
    pub radiator_temperature_1: Option<i64>,
    pub radiator_temperature_2: Option<i64>,

    pub bms_charge_current_limit: Option<f64>,
    pub bms_discharge_current_limit: Option<f64>,

    pub generator_voltage: Option<f64>,
    pub generator_frequency: Option<f64>,
    pub generator_power: Option<i64>,

    pub parallel: Option<ParallelConfig>,

    pub output_power: Option<i64>,
}

impl InverterRuntimeData {
    /// Decode a runtime record from raw input registers using the family's
    /// register map. Pure and total: no I/O, absent registers become `None`.
    pub fn from_registers(regs: &RawRegisters, map: &RuntimeRegisterMap) -> Self {
        let status = regs.get(map.status.address);
        let (battery_soc, battery_soh) = match regs.get(map.soc_soh_packed.address) {
            Some(word) => {
                let (soc, soh) = split_soc_soh(word);
                (Some(soc), Some(soh))
            }
            None => (None, None),
        };

        let opt_value =
            |def: &Option<crate::registers::RegisterDef>| def.as_ref().and_then(|d| d.value(regs));
        let opt_int =
            |def: &Option<crate::registers::RegisterDef>| def.as_ref().and_then(|d| d.integer(regs));

        Self {
            status,

            pv1_voltage: map.pv1_voltage.value(regs),
            pv2_voltage: map.pv2_voltage.value(regs),
            pv3_voltage: opt_value(&map.pv3_voltage),
            pv1_power: map.pv1_power.integer(regs),
            pv2_power: map.pv2_power.integer(regs),
            pv3_power: opt_int(&map.pv3_power),

            battery_voltage: map.battery_voltage.value(regs),
            battery_soc,
            battery_soh,
            battery_charge_power: map.battery_charge_power.integer(regs),
            battery_discharge_power: map.battery_discharge_power.integer(regs),
            battery_current: map.battery_current.value(regs),
            battery_temperature: map.battery_temperature.integer(regs),

            grid_voltage_r: map.grid_voltage_r.value(regs),
            grid_voltage_s: map.grid_voltage_s.value(regs),
            grid_voltage_t: map.grid_voltage_t.value(regs),
            grid_frequency: map.grid_frequency.value(regs),
            grid_power: map.grid_power.integer(regs),

            inverter_power: map.inverter_power.integer(regs),
            rectifier_power: map.rectifier_power.integer(regs),
            inverter_current_rms: map.inverter_current_rms.value(regs),
            power_factor: map.power_factor.raw(regs).map(|raw| {
                // 0..1000 maps to 0.000..1.000; 1000..2000 folds negative.
                if raw <= 1000 {
                    raw as f64 / 1000.0
                } else {
                    (2000 - raw) as f64 / 1000.0
                }
            }),

            eps_voltage_r: map.eps_voltage_r.value(regs),
            eps_voltage_s: map.eps_voltage_s.value(regs),
            eps_voltage_t: map.eps_voltage_t.value(regs),
            eps_frequency: map.eps_frequency.value(regs),
            eps_power: map.eps_power.integer(regs),
            eps_apparent_power: map.eps_apparent_power.integer(regs),
            eps_l1_voltage: opt_value(&map.eps_l1_voltage),
            eps_l2_voltage: opt_value(&map.eps_l2_voltage),

            power_to_grid: map.power_to_grid.integer(regs),
            load_power: map.load_power.integer(regs),

            bus_voltage_1: map.bus_voltage_1.value(regs),
            bus_voltage_2: map.bus_voltage_2.value(regs),

            internal_fault: regs.get(map.internal_fault.address),
            fault_code: map.fault_code.raw(regs).map(|v| v as u32),
            warning_code: map.warning_code.raw(regs).map(|v| v as u32),

            internal_temperature: map.internal_temperature.integer(regs),
            radiator_temperature_1: map.radiator_temperature_1.integer(regs),
            radiator_temperature_2: map.radiator_temperature_2.integer(regs),

            bms_charge_current_limit: map.bms_charge_current_limit.value(regs),
            bms_discharge_current_limit: map.bms_discharge_current_limit.value(regs),

            generator_voltage: opt_value(&map.generator_voltage),
            generator_frequency: opt_value(&map.generator_frequency),
            generator_power: opt_int(&map.generator_power),

            parallel: map
                .parallel_config
                .as_ref()
                .and_then(|d| regs.get(d.address))
                .map(ParallelConfig::from_word),

            output_power: opt_int(&map.output_power),
        }
    }

    /// Total PV power across all strings. `None` only when no string reported.
    pub fn pv_total_power(&self) -> Option<i64> {
        safe_sum(&[self.pv1_power, self.pv2_power, self.pv3_power])
    }

    /// Net battery power: positive = charging, negative = discharging.
    /// `None` when either side of the flow is unknown.
    pub fn battery_power(&self) -> Option<i64> {
        match (self.battery_charge_power, self.battery_discharge_power) {
            (Some(charge), Some(discharge)) => Some(charge - discharge),
            _ => None,
        }
    }

    /// Household consumption from the energy balance:
    /// pv + battery_discharge − battery_charge + grid_import − grid_export,
    /// clamped at zero. `None` when no contributing reading is available.
    pub fn consumption_power(&self) -> Option<i64> {
        let inputs = [
            self.pv_total_power(),
            self.battery_discharge_power,
            self.battery_charge_power,
            self.load_power,
            self.power_to_grid,
        ];
        if inputs.iter().all(Option::is_none) {
            return None;
        }
        let pv = self.pv_total_power().unwrap_or(0);
        let battery = self.battery_discharge_power.unwrap_or(0) - self.battery_charge_power.unwrap_or(0);
        let grid_in = self.load_power.unwrap_or(0);
        let grid_out = self.power_to_grid.unwrap_or(0);
        Some((pv + battery + grid_in - grid_out).max(0))
    }

    /// AC-coupled power. Local register maps have no dedicated AC-couple
    /// register; the generator port carries the coupled flow when no physical
    /// generator is connected, so this reads the generator-power register.
    /// [`Self::generator_power`] stays exposed separately.
    pub fn ac_couple_power(&self) -> Option<i64> {
        self.generator_power
    }

    /// EPS L1 share of the total EPS power.
    pub fn eps_power_l1(&self) -> Option<i64> {
        self.eps_leg_power(Leg::L1)
    }

    /// EPS L2 share of the total EPS power.
    pub fn eps_power_l2(&self) -> Option<i64> {
        self.eps_leg_power(Leg::L2)
    }

    /// Per-leg EPS split. With both leg voltages present and positive the
    /// total divides proportionally by voltage; with exactly one live leg
    /// that leg carries the whole total and the other reports zero; with no
    /// voltage data the split is even.
    fn eps_leg_power(&self, leg: Leg) -> Option<i64> {
        let total = self.eps_power?;
        let v1 = self.eps_l1_voltage.filter(|v| *v > 0.0);
        let v2 = self.eps_l2_voltage.filter(|v| *v > 0.0);
        Some(match (v1, v2) {
            (Some(v1), Some(v2)) => {
                let ratio = match leg {
                    Leg::L1 => v1 / (v1 + v2),
                    Leg::L2 => v2 / (v1 + v2),
                };
                (total as f64 * ratio).round() as i64
            }
            (Some(_), None) => match leg {
                Leg::L1 => total,
                Leg::L2 => 0,
            },
            (None, Some(_)) => match leg {
                Leg::L1 => 0,
                Leg::L2 => total,
            },
            (None, None) => total / 2,
        })
    }
}

#[derive(Clone, Copy)]
enum Leg {
    L1,
    L2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::pv_series;

    fn regs(pairs: &[(u16, u16)]) -> RawRegisters {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_runtime_round_trip_pv_series() {
        let raw = regs(&[
            (1, 5100),
            (4, 530),
            (5, 0x6455),
            (7, 1000),
            (8, 1500),
            (12, 2410),
            (15, 5998),
            (16, 2300),
            (27, 1500),
        ]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);

        assert_eq!(data.pv1_voltage, Some(510.0));
        assert_eq!(data.battery_voltage, Some(53.0));
        assert_eq!(data.battery_soc, Some(85));
        assert_eq!(data.battery_soh, Some(100));
        assert_eq!(data.pv1_power, Some(1000));
        assert_eq!(data.pv2_power, Some(1500));
        assert_eq!(data.grid_voltage_r, Some(241.0));
        assert_eq!(data.grid_frequency, Some(59.98));
        assert_eq!(data.inverter_power, Some(2300));
        assert_eq!(data.load_power, Some(1500));

        // Everything not present in the read stays None.
        assert_eq!(data.pv2_voltage, None);
        assert_eq!(data.pv3_power, None);
        assert_eq!(data.battery_charge_power, None);
        assert_eq!(data.eps_power, None);
        assert_eq!(data.generator_power, None);
        assert_eq!(data.fault_code, None);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let raw = regs(&[(1, 5100), (4, 530), (5, 0x6455), (16, 2300)]);
        let a = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        let b = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(a, b);
    }

    #[test]
    fn test_battery_power_sign() {
        let charging = regs(&[(10, 500), (11, 0)]);
        let data = InverterRuntimeData::from_registers(&charging, &pv_series::RUNTIME_MAP);
        assert_eq!(data.battery_power(), Some(500));

        let discharging = regs(&[(10, 0), (11, 1200)]);
        let data = InverterRuntimeData::from_registers(&discharging, &pv_series::RUNTIME_MAP);
        assert_eq!(data.battery_power(), Some(-1200));

        let partial = regs(&[(10, 500)]);
        let data = InverterRuntimeData::from_registers(&partial, &pv_series::RUNTIME_MAP);
        assert_eq!(data.battery_power(), None);
    }

    #[test]
    fn test_consumption_power_balance() {
        // pv=2500, discharge=0, charge=500, import=1030, export=0
        let raw = regs(&[(7, 2500), (10, 500), (11, 0), (26, 0), (27, 1030)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.consumption_power(), Some(2500 - 500 + 1030));
    }

    #[test]
    fn test_consumption_power_clamped() {
        // Export exceeding generation briefly: never negative.
        let raw = regs(&[(7, 100), (10, 0), (11, 0), (26, 500), (27, 0)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.consumption_power(), Some(0));
    }

    #[test]
    fn test_eps_split_proportional() {
        let raw = regs(&[(24, 3000), (127, 1200), (128, 1800)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        // v1=120, v2=180 => 40% / 60%
        assert_eq!(data.eps_power_l1(), Some(1200));
        assert_eq!(data.eps_power_l2(), Some(1800));
    }

    #[test]
    fn test_eps_split_single_live_leg() {
        let raw = regs(&[(24, 3000), (127, 1200), (128, 0)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.eps_power_l1(), Some(3000));
        assert_eq!(data.eps_power_l2(), Some(0));
    }

    #[test]
    fn test_eps_split_no_voltage_data() {
        let raw = regs(&[(24, 3000)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.eps_power_l1(), Some(1500));
        assert_eq!(data.eps_power_l2(), Some(1500));
    }

    #[test]
    fn test_eps_split_without_total() {
        let raw = regs(&[(127, 1200), (128, 1800)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.eps_power_l1(), None);
        assert_eq!(data.eps_power_l2(), None);
    }

    #[test]
    fn test_ac_couple_reads_generator_register() {
        let raw = regs(&[(123, 850)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.generator_power, Some(850));
        assert_eq!(data.ac_couple_power(), Some(850));
    }

    #[test]
    fn test_parallel_config_decode() {
        // Master, phase R, 3 units: 0x0305
        let raw = regs(&[(113, 0x0305)]);
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        let parallel = data.parallel.unwrap();
        assert_eq!(parallel.role, ParallelRole::Master);
        assert_eq!(parallel.phase, Some(ParallelPhase::R));
        assert_eq!(parallel.unit_count, 3);

        // Slave, phase S
        assert_eq!(
            ParallelConfig::from_word(0x020A),
            ParallelConfig {
                role: ParallelRole::Slave,
                phase: Some(ParallelPhase::S),
                unit_count: 2,
            }
        );
    }

    #[test]
    fn test_power_factor_fold() {
        let leading = regs(&[(19, 990)]);
        let data = InverterRuntimeData::from_registers(&leading, &pv_series::RUNTIME_MAP);
        assert_eq!(data.power_factor, Some(0.99));

        let lagging = regs(&[(19, 1100)]);
        let data = InverterRuntimeData::from_registers(&lagging, &pv_series::RUNTIME_MAP);
        assert_eq!(data.power_factor, Some(0.9));
    }

    #[test]
    fn test_negative_temperature() {
        let raw = regs(&[(67, 0xFFF6)]); // -10°C
        let data = InverterRuntimeData::from_registers(&raw, &pv_series::RUNTIME_MAP);
        assert_eq!(data.battery_temperature, Some(-10));
    }
}
