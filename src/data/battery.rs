//! Battery bank and per-module records.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{decode_ascii, split_soc_soh};
use crate::registers::{
    RawRegisters, RuntimeRegisterMap, BATTERY_MODULE_BASE_ADDRESS, BATTERY_MODULE_MAX_COUNT,
    BATTERY_MODULE_WORDS, NO_BATTERY_VOLTAGE_THRESHOLD,
};

/// One physical battery module from the extended register range.
///
/// Module `k` occupies 30 input registers starting at `5000 + 30·k`. A block
/// whose status header is zero is an empty slot and decodes to no module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryModuleData {
    /// Zero-based module index (position on the battery bus).
    pub index: u16,
    pub status: Option<u16>,
    pub capacity_ah: Option<i64>,
    pub charge_voltage_ref: Option<f64>,
    pub charge_current_limit: Option<f64>,
    pub discharge_current_limit: Option<f64>,
    pub discharge_cutoff_voltage: Option<f64>,
    /// Module voltage, ÷100 scale (finer than the bank's ÷10).
    pub voltage: Option<f64>,
    /// Signed module current, ÷10; negative while discharging.
    pub current: Option<f64>,
    pub soc: Option<u8>,
    pub soh: Option<u8>,
    pub cycle_count: Option<i64>,
    pub max_cell_temperature: Option<f64>,
    pub min_cell_temperature: Option<f64>,
    /// Cell voltages in millivolts, as reported.
    pub max_cell_voltage_mv: Option<i64>,
    pub min_cell_voltage_mv: Option<i64>,
    /// Firmware as "major.minor" from the packed version word.
    pub firmware_version: Option<String>,
    /// 14-character module serial from seven ASCII register pairs.
    pub serial: Option<String>,
}

impl BatteryModuleData {
    /// Decode one module block. Returns `None` when the status header is
    /// missing or zero (disconnected slot).
    pub fn from_block(regs: &RawRegisters, index: u16) -> Option<Self> {
        let base = BATTERY_MODULE_BASE_ADDRESS + index * BATTERY_MODULE_WORDS;
        let status = regs.get(base)?;
        if status == 0 {
            return None;
        }

        let word = |offset: u16| regs.get(base + offset);
        let scaled = |offset: u16, divisor: f64| word(offset).map(|w| f64::from(w) / divisor);
        let signed_scaled =
            |offset: u16, divisor: f64| word(offset).map(|w| f64::from(w as i16) / divisor);

        let (soc, soh) = match word(8) {
            Some(w) => {
                let (soc, soh) = split_soc_soh(w);
                (Some(soc), Some(soh))
            }
            None => (None, None),
        };

        Some(Self {
            index,
            status: Some(status),
            capacity_ah: word(1).map(i64::from),
            charge_voltage_ref: scaled(2, 10.0),
            charge_current_limit: scaled(3, 100.0),
            discharge_current_limit: scaled(4, 100.0),
            discharge_cutoff_voltage: scaled(5, 10.0),
            voltage: scaled(6, 100.0),
            current: signed_scaled(7, 10.0),
            soc,
            soh,
            cycle_count: word(9).map(i64::from),
            max_cell_temperature: signed_scaled(10, 10.0),
            min_cell_temperature: signed_scaled(11, 10.0),
            max_cell_voltage_mv: word(12).map(i64::from),
            min_cell_voltage_mv: word(13).map(i64::from),
            firmware_version: word(16).map(|w| format!("{}.{}", (w >> 8) & 0xFF, w & 0xFF)),
            serial: decode_ascii(regs, base + 17, 7),
        })
    }
}

/// Aggregate battery bank state plus any individually-read modules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryBankData {
    /// Bank voltage, ÷10 scale.
    pub voltage: Option<f64>,
    /// Signed bank current; negative while discharging.
    pub current: Option<f64>,
    pub soc: Option<u8>,
    pub soh: Option<u8>,
    pub capacity_ah: Option<i64>,
    pub temperature: Option<i64>,
    pub charge_power: Option<i64>,
    pub discharge_power: Option<i64>,
    pub charge_current_limit: Option<f64>,
    pub discharge_current_limit: Option<f64>,
    pub charge_voltage_ref: Option<f64>,
    pub discharge_cutoff_voltage: Option<f64>,
    pub max_cell_voltage: Option<f64>,
    pub min_cell_voltage: Option<f64>,
    pub max_cell_temperature: Option<f64>,
    pub min_cell_temperature: Option<f64>,
    pub cycle_count: Option<i64>,
    /// Modules reported on the battery bus (register 96).
    pub battery_count: Option<i64>,
    pub status: Option<u16>,
    /// Individually-decoded modules; empty when the extended range was not
    /// read or no slot was populated.
    pub modules: Vec<BatteryModuleData>,
}

impl BatteryBankData {
    /// Decode the bank from runtime registers, optionally enriched with the
    /// extended per-module range.
    ///
    /// Returns `None` when the bank voltage register is absent or reads at or
    /// below the no-battery threshold (inverter without storage attached) —
    /// distinct from a read failure, which surfaces as an error upstream.
    pub fn from_registers(
        regs: &RawRegisters,
        map: &RuntimeRegisterMap,
        individual: Option<&RawRegisters>,
    ) -> Option<Self> {
        let voltage = map.battery_voltage.value(regs)?;
        if voltage <= NO_BATTERY_VOLTAGE_THRESHOLD {
            debug!(voltage, "bank voltage below threshold, no battery present");
            return None;
        }

        let (soc, soh) = match regs.get(map.soc_soh_packed.address) {
            Some(word) => {
                let (soc, soh) = split_soc_soh(word);
                (Some(soc), Some(soh))
            }
            None => (None, None),
        };

        let mut modules = Vec::new();
        if let Some(extended) = individual {
            for index in 0..BATTERY_MODULE_MAX_COUNT {
                if let Some(module) = BatteryModuleData::from_block(extended, index) {
                    modules.push(module);
                }
            }
        }

        Some(Self {
            voltage: Some(voltage),
            current: map.battery_current.value(regs),
            soc,
            soh,
            capacity_ah: map.battery_capacity_ah.integer(regs),
            temperature: map.battery_temperature.integer(regs),
            charge_power: map.battery_charge_power.integer(regs),
            discharge_power: map.battery_discharge_power.integer(regs),
            charge_current_limit: map.bms_charge_current_limit.value(regs),
            discharge_current_limit: map.bms_discharge_current_limit.value(regs),
            charge_voltage_ref: map.bms_charge_voltage_ref.value(regs),
            discharge_cutoff_voltage: map.bms_discharge_cutoff_voltage.value(regs),
            max_cell_voltage: map.max_cell_voltage.value(regs),
            min_cell_voltage: map.min_cell_voltage.value(regs),
            max_cell_temperature: map.max_cell_temperature.value(regs),
            min_cell_temperature: map.min_cell_temperature.value(regs),
            cycle_count: map.bms_cycle_count.integer(regs),
            battery_count: map.battery_count.integer(regs),
            status: regs.get(map.battery_status_inv.address),
            modules,
        })
    }

    /// Net bank power: positive = charging.
    pub fn power(&self) -> Option<i64> {
        match (self.charge_power, self.discharge_power) {
            (Some(charge), Some(discharge)) => Some(charge - discharge),
            _ => None,
        }
    }
}
