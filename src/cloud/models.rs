//! Serde models for the monitor API's JSON responses.
//!
//! Field names match the wire (camelCase vendor names). Cloud responses
//! store most analog values as raw integers with the same implicit scaling
//! the registers use; the `to_*` conversions apply that scaling so the cloud
//! transport hands out the same record types the local transports decode.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::data::{
    BatteryBankData, BatteryModuleData, InverterEnergyData, InverterRuntimeData, MidboxRuntimeData,
};
use crate::registers::NO_BATTERY_VOLTAGE_THRESHOLD;

fn div10(value: Option<i64>) -> Option<f64> {
    value.map(|v| v as f64 / 10.0)
}

fn div100(value: Option<i64>) -> Option<f64> {
    value.map(|v| v as f64 / 100.0)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub plants: Vec<PlantSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantSummary {
    pub plant_id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantListResponse {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub rows: Vec<Plant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub plant_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub daylight_saving_time: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub rows: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub serial_num: String,
    #[serde(default)]
    pub device_type_code: Option<u16>,
    #[serde(default)]
    pub plant_id: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fw_code: Option<String>,
    #[serde(default)]
    pub lost: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelGroupsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub parallel_groups: Vec<ParallelGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelGroup {
    #[serde(default)]
    pub parallel_group: String,
    #[serde(default)]
    pub master_sn: Option<String>,
    #[serde(default)]
    pub inverters: Vec<DeviceSummary>,
}

/// Inverter runtime as the cloud reports it: raw integers with register
/// scaling still applied (vBat is decivolts, fac is centihertz, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterRuntime {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub serial_num: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub lost: Option<bool>,
    #[serde(default)]
    pub fw_code: Option<String>,
    #[serde(default)]
    pub server_time: Option<String>,

    #[serde(default)]
    pub vpv1: Option<i64>,
    #[serde(default)]
    pub vpv2: Option<i64>,
    #[serde(default)]
    pub vpv3: Option<i64>,
    #[serde(default)]
    pub ppv: Option<i64>,
    #[serde(default)]
    pub ppv1: Option<i64>,
    #[serde(default)]
    pub ppv2: Option<i64>,
    #[serde(default)]
    pub ppv3: Option<i64>,

    #[serde(default)]
    pub v_bat: Option<i64>,
    #[serde(default)]
    pub soc: Option<u8>,
    #[serde(default)]
    pub soh: Option<u8>,
    #[serde(default)]
    pub p_charge: Option<i64>,
    #[serde(default)]
    pub p_dis_charge: Option<i64>,
    #[serde(default)]
    pub bat_power: Option<i64>,
    #[serde(default)]
    pub t_bat: Option<i64>,
    #[serde(default)]
    pub max_chg_curr: Option<i64>,
    #[serde(default)]
    pub max_dischg_curr: Option<i64>,

    #[serde(default)]
    pub vacr: Option<i64>,
    #[serde(default)]
    pub vacs: Option<i64>,
    #[serde(default)]
    pub vact: Option<i64>,
    #[serde(default)]
    pub fac: Option<i64>,
    #[serde(default)]
    pub pinv: Option<i64>,
    #[serde(default)]
    pub prec: Option<i64>,
    #[serde(default)]
    pub pf: Option<String>,

    #[serde(default)]
    pub vepsr: Option<i64>,
    #[serde(default)]
    pub vepss: Option<i64>,
    #[serde(default)]
    pub vepst: Option<i64>,
    #[serde(default)]
    pub feps: Option<i64>,
    #[serde(default)]
    pub peps: Option<i64>,
    #[serde(default)]
    pub seps: Option<i64>,
    #[serde(default, rename = "pEpsL1N")]
    pub p_eps_l1n: Option<i64>,
    #[serde(default, rename = "pEpsL2N")]
    pub p_eps_l2n: Option<i64>,

    #[serde(default)]
    pub p_to_grid: Option<i64>,
    #[serde(default)]
    pub p_to_user: Option<i64>,
    #[serde(default)]
    pub consumption_power: Option<i64>,

    #[serde(default)]
    pub gen_volt: Option<i64>,
    #[serde(default)]
    pub gen_freq: Option<i64>,
    #[serde(default)]
    pub gen_power: Option<i64>,
    #[serde(default)]
    pub ac_couple_power: Option<i64>,

    #[serde(default)]
    pub tinner: Option<i64>,
    #[serde(default)]
    pub tradiator1: Option<i64>,
    #[serde(default)]
    pub tradiator2: Option<i64>,

    #[serde(default)]
    pub v_bus1: Option<i64>,
    #[serde(default)]
    pub v_bus2: Option<i64>,
}

impl InverterRuntime {
    /// Server timestamp, when present ("2024-01-15 10:30:00" format).
    pub fn server_timestamp(&self) -> Option<NaiveDateTime> {
        self.server_time
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok())
    }

    /// Convert to the transport-agnostic runtime record, applying the same
    /// scaling the register decoder applies.
    pub fn to_data(&self) -> InverterRuntimeData {
        InverterRuntimeData {
            status: self.status,

            pv1_voltage: div10(self.vpv1),
            pv2_voltage: div10(self.vpv2),
            pv3_voltage: div10(self.vpv3),
            pv1_power: self.ppv1,
            pv2_power: self.ppv2,
            pv3_power: self.ppv3,

            battery_voltage: div10(self.v_bat),
            battery_soc: self.soc,
            battery_soh: self.soh,
            battery_charge_power: self.p_charge,
            battery_discharge_power: self.p_dis_charge,
            battery_current: None,
            battery_temperature: self.t_bat,

            grid_voltage_r: div10(self.vacr),
            grid_voltage_s: div10(self.vacs),
            grid_voltage_t: div10(self.vact),
            grid_frequency: div100(self.fac),
            grid_power: self.prec,

            inverter_power: self.pinv,
            rectifier_power: self.prec,
            inverter_current_rms: None,
            power_factor: self.pf.as_deref().and_then(|pf| pf.parse().ok()),

            eps_voltage_r: div10(self.vepsr),
            eps_voltage_s: div10(self.vepss),
            eps_voltage_t: div10(self.vepst),
            eps_frequency: div100(self.feps),
            eps_power: self.peps,
            eps_apparent_power: self.seps,
            eps_l1_voltage: None,
            eps_l2_voltage: None,

            power_to_grid: self.p_to_grid,
            load_power: self.p_to_user,

            bus_voltage_1: div10(self.v_bus1),
            bus_voltage_2: div10(self.v_bus2),

            internal_fault: None,
            fault_code: None,
            warning_code: None,

            internal_temperature: self.tinner,
            radiator_temperature_1: self.tradiator1,
            radiator_temperature_2: self.tradiator2,

            bms_charge_current_limit: div100(self.max_chg_curr),
            bms_discharge_current_limit: div100(self.max_dischg_curr),

            generator_voltage: div10(self.gen_volt),
            generator_frequency: div100(self.gen_freq),
            generator_power: self.gen_power,

            parallel: None,

            output_power: None,
        }
    }
}

/// Inverter energy statistics; daily and lifetime counters in 0.1 kWh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterEnergy {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub serial_num: String,
    #[serde(default)]
    pub soc: Option<u8>,

    #[serde(default)]
    pub epv1_day: Option<i64>,
    #[serde(default)]
    pub epv2_day: Option<i64>,
    #[serde(default)]
    pub epv3_day: Option<i64>,
    #[serde(default)]
    pub einv_day: Option<i64>,
    #[serde(default)]
    pub erec_day: Option<i64>,
    #[serde(default)]
    pub echg_day: Option<i64>,
    #[serde(default)]
    pub edischg_day: Option<i64>,
    #[serde(default)]
    pub eeps_day: Option<i64>,
    #[serde(default)]
    pub etogrid_day: Option<i64>,
    #[serde(default)]
    pub etouser_day: Option<i64>,
    #[serde(default)]
    pub egen_day: Option<i64>,

    #[serde(default)]
    pub epv1_all: Option<i64>,
    #[serde(default)]
    pub epv2_all: Option<i64>,
    #[serde(default)]
    pub epv3_all: Option<i64>,
    #[serde(default)]
    pub einv_all: Option<i64>,
    #[serde(default)]
    pub erec_all: Option<i64>,
    #[serde(default)]
    pub echg_all: Option<i64>,
    #[serde(default)]
    pub edischg_all: Option<i64>,
    #[serde(default)]
    pub eeps_all: Option<i64>,
    #[serde(default)]
    pub etogrid_all: Option<i64>,
    #[serde(default)]
    pub etouser_all: Option<i64>,
    #[serde(default)]
    pub egen_all: Option<i64>,
}

impl InverterEnergy {
    pub fn to_data(&self) -> InverterEnergyData {
        InverterEnergyData {
            pv1_energy_today: div10(self.epv1_day),
            pv2_energy_today: div10(self.epv2_day),
            pv3_energy_today: div10(self.epv3_day),
            inverter_energy_today: div10(self.einv_day),
            ac_charge_energy_today: div10(self.erec_day),
            charge_energy_today: div10(self.echg_day),
            discharge_energy_today: div10(self.edischg_day),
            eps_energy_today: div10(self.eeps_day),
            export_energy_today: div10(self.etogrid_day),
            import_energy_today: div10(self.etouser_day),

            pv1_energy_total: div10(self.epv1_all),
            pv2_energy_total: div10(self.epv2_all),
            pv3_energy_total: div10(self.epv3_all),
            inverter_energy_total: div10(self.einv_all),
            ac_charge_energy_total: div10(self.erec_all),
            charge_energy_total: div10(self.echg_all),
            discharge_energy_total: div10(self.edischg_all),
            eps_energy_total: div10(self.eeps_all),
            export_energy_total: div10(self.etogrid_all),
            import_energy_total: div10(self.etouser_all),

            generator_energy_today: div10(self.egen_day),
            generator_energy_total: div10(self.egen_all),

            battery_soc: self.soc,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryInfoResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub serial_num: String,
    #[serde(default)]
    pub soc: Option<u8>,
    #[serde(default)]
    pub soh: Option<u8>,
    #[serde(default)]
    pub v_bat: Option<i64>,
    #[serde(default)]
    pub current: Option<i64>,
    #[serde(default)]
    pub bat_parallel_num: Option<i64>,
    #[serde(default)]
    pub bat_capacity: Option<i64>,
    #[serde(default)]
    pub battery_array: Vec<BatteryUnit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryUnit {
    #[serde(default)]
    pub battery_sn: Option<String>,
    #[serde(default)]
    pub bat_index: Option<u16>,
    /// Centivolts.
    #[serde(default)]
    pub total_voltage: Option<i64>,
    /// Deciamps, signed.
    #[serde(default)]
    pub current: Option<i64>,
    #[serde(default)]
    pub soc: Option<u8>,
    #[serde(default)]
    pub soh: Option<u8>,
    #[serde(default)]
    pub cycle_cnt: Option<i64>,
    #[serde(default)]
    pub bat_max_cell_temp: Option<i64>,
    #[serde(default)]
    pub bat_min_cell_temp: Option<i64>,
    #[serde(default)]
    pub bat_max_cell_voltage: Option<i64>,
    #[serde(default)]
    pub bat_min_cell_voltage: Option<i64>,
    #[serde(default)]
    pub fw_version: Option<String>,
}

impl BatteryInfoResponse {
    /// Convert to the bank record, or `None` when the reported voltage says
    /// no battery is attached.
    pub fn to_bank(&self) -> Option<BatteryBankData> {
        let voltage = div10(self.v_bat)?;
        if voltage <= NO_BATTERY_VOLTAGE_THRESHOLD {
            return None;
        }
        let modules = self
            .battery_array
            .iter()
            .enumerate()
            .map(|(i, unit)| BatteryModuleData {
                index: unit.bat_index.unwrap_or(i as u16),
                status: None,
                capacity_ah: None,
                charge_voltage_ref: None,
                charge_current_limit: None,
                discharge_current_limit: None,
                discharge_cutoff_voltage: None,
                voltage: div100(unit.total_voltage),
                current: div10(unit.current),
                soc: unit.soc,
                soh: unit.soh,
                cycle_count: unit.cycle_cnt,
                max_cell_temperature: div10(unit.bat_max_cell_temp),
                min_cell_temperature: div10(unit.bat_min_cell_temp),
                max_cell_voltage_mv: unit.bat_max_cell_voltage,
                min_cell_voltage_mv: unit.bat_min_cell_voltage,
                firmware_version: unit.fw_version.clone(),
                serial: unit.battery_sn.clone(),
            })
            .collect();

        Some(BatteryBankData {
            voltage: Some(voltage),
            current: div10(self.current),
            soc: self.soc,
            soh: self.soh,
            capacity_ah: self.bat_capacity,
            battery_count: self.bat_parallel_num,
            modules,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidboxRuntimeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub serial_num: String,
    #[serde(default)]
    pub midbox_data: MidboxData,
}

/// Per-leg MID metering as reported by the cloud. Voltages in decivolts,
/// currents in centiamps, frequencies in centihertz, energies in 0.1 kWh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidboxData {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub grid_l1_rms_volt: Option<i64>,
    #[serde(default)]
    pub grid_l2_rms_volt: Option<i64>,
    #[serde(default)]
    pub ups_l1_rms_volt: Option<i64>,
    #[serde(default)]
    pub ups_l2_rms_volt: Option<i64>,
    #[serde(default)]
    pub gen_l1_rms_volt: Option<i64>,
    #[serde(default)]
    pub gen_l2_rms_volt: Option<i64>,

    #[serde(default)]
    pub grid_l1_rms_curr: Option<i64>,
    #[serde(default)]
    pub grid_l2_rms_curr: Option<i64>,
    #[serde(default)]
    pub load_l1_rms_curr: Option<i64>,
    #[serde(default)]
    pub load_l2_rms_curr: Option<i64>,
    #[serde(default)]
    pub gen_l1_rms_curr: Option<i64>,
    #[serde(default)]
    pub gen_l2_rms_curr: Option<i64>,
    #[serde(default)]
    pub ups_l1_rms_curr: Option<i64>,
    #[serde(default)]
    pub ups_l2_rms_curr: Option<i64>,

    #[serde(default)]
    pub grid_l1_active_power: Option<i64>,
    #[serde(default)]
    pub grid_l2_active_power: Option<i64>,
    #[serde(default)]
    pub load_l1_active_power: Option<i64>,
    #[serde(default)]
    pub load_l2_active_power: Option<i64>,
    #[serde(default)]
    pub gen_l1_active_power: Option<i64>,
    #[serde(default)]
    pub gen_l2_active_power: Option<i64>,
    #[serde(default)]
    pub ups_l1_active_power: Option<i64>,
    #[serde(default)]
    pub ups_l2_active_power: Option<i64>,
    #[serde(default)]
    pub hybrid_l1_active_power: Option<i64>,
    #[serde(default)]
    pub hybrid_l2_active_power: Option<i64>,

    #[serde(default)]
    pub smart_load1_l1_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load1_l2_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load2_l1_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load2_l2_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load3_l1_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load3_l2_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load4_l1_active_power: Option<i64>,
    #[serde(default)]
    pub smart_load4_l2_active_power: Option<i64>,

    #[serde(default)]
    pub smart_port1_status: Option<u16>,
    #[serde(default)]
    pub smart_port2_status: Option<u16>,
    #[serde(default)]
    pub smart_port3_status: Option<u16>,
    #[serde(default)]
    pub smart_port4_status: Option<u16>,

    #[serde(default)]
    pub phase_lock_freq: Option<i64>,
    #[serde(default)]
    pub grid_freq: Option<i64>,
    #[serde(default)]
    pub gen_freq: Option<i64>,
}

impl MidboxRuntimeResponse {
    pub fn to_data(&self) -> MidboxRuntimeData {
        let d = &self.midbox_data;
        MidboxRuntimeData {
            status: d.status,

            grid_l1_voltage: div10(d.grid_l1_rms_volt),
            grid_l2_voltage: div10(d.grid_l2_rms_volt),
            ups_l1_voltage: div10(d.ups_l1_rms_volt),
            ups_l2_voltage: div10(d.ups_l2_rms_volt),
            generator_l1_voltage: div10(d.gen_l1_rms_volt),
            generator_l2_voltage: div10(d.gen_l2_rms_volt),

            grid_l1_current: div100(d.grid_l1_rms_curr),
            grid_l2_current: div100(d.grid_l2_rms_curr),
            load_l1_current: div100(d.load_l1_rms_curr),
            load_l2_current: div100(d.load_l2_rms_curr),
            generator_l1_current: div100(d.gen_l1_rms_curr),
            generator_l2_current: div100(d.gen_l2_rms_curr),
            ups_l1_current: div100(d.ups_l1_rms_curr),
            ups_l2_current: div100(d.ups_l2_rms_curr),

            grid_l1_power: d.grid_l1_active_power,
            grid_l2_power: d.grid_l2_active_power,
            load_l1_power: d.load_l1_active_power,
            load_l2_power: d.load_l2_active_power,
            generator_l1_power: d.gen_l1_active_power,
            generator_l2_power: d.gen_l2_active_power,
            ups_l1_power: d.ups_l1_active_power,
            ups_l2_power: d.ups_l2_active_power,
            hybrid_l1_power: d.hybrid_l1_active_power,
            hybrid_l2_power: d.hybrid_l2_active_power,

            smart_load1_l1_power: d.smart_load1_l1_active_power,
            smart_load1_l2_power: d.smart_load1_l2_active_power,
            smart_load2_l1_power: d.smart_load2_l1_active_power,
            smart_load2_l2_power: d.smart_load2_l2_active_power,
            smart_load3_l1_power: d.smart_load3_l1_active_power,
            smart_load3_l2_power: d.smart_load3_l2_active_power,
            smart_load4_l1_power: d.smart_load4_l1_active_power,
            smart_load4_l2_power: d.smart_load4_l2_active_power,

            smart_port1_status: d.smart_port1_status,
            smart_port2_status: d.smart_port2_status,
            smart_port3_status: d.smart_port3_status,
            smart_port4_status: d.smart_port4_status,

            phase_lock_frequency: div100(d.phase_lock_freq),
            grid_frequency: div100(d.grid_freq),
            generator_frequency: div100(d.gen_freq),

            ..Default::default()
        }
    }
}

/// Parameter read: the API answers with FLAT key/value pairs using the
/// vendor's descriptive names ("HOLD_AC_CHARGE_POWER_CMD"), not register
/// numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterReadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub inverter_sn: Option<String>,
    #[serde(default)]
    pub start_register: Option<u16>,
    #[serde(default)]
    pub point_number: Option<u16>,
    #[serde(flatten)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickChargeStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub has_unclosed_quick_charge_task: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub upgrade_available: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
}
