//! Inverter energy counters and their register decoder.

use serde::{Deserialize, Serialize};

use crate::data::split_soc_soh;
use crate::registers::{EnergyRegisterMap, RawRegisters};

/// Daily and lifetime energy statistics, all in kWh (lifetime counters are
/// 32-bit register pairs ÷10). Decoded from the same raw map the transport
/// produced for the power/status/BMS groups; the decoder does not care how
/// the registers were fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InverterEnergyData {
    pub pv1_energy_today: Option<f64>,
    pub pv2_energy_today: Option<f64>,
    pub pv3_energy_today: Option<f64>,
    pub inverter_energy_today: Option<f64>,
    pub ac_charge_energy_today: Option<f64>,
    pub charge_energy_today: Option<f64>,
    pub discharge_energy_today: Option<f64>,
    pub eps_energy_today: Option<f64>,
    pub export_energy_today: Option<f64>,
    pub import_energy_today: Option<f64>,

    pub pv1_energy_total: Option<f64>,
    pub pv2_energy_total: Option<f64>,
    pub pv3_energy_total: Option<f64>,
    pub inverter_energy_total: Option<f64>,
    pub ac_charge_energy_total: Option<f64>,
    pub charge_energy_total: Option<f64>,
    pub discharge_energy_total: Option<f64>,
    pub eps_energy_total: Option<f64>,
    pub export_energy_total: Option<f64>,
    pub import_energy_total: Option<f64>,

    pub generator_energy_today: Option<f64>,
    pub generator_energy_total: Option<f64>,

    /// Battery SOC from the packed word when the read included it; lets the
    /// energy snapshot carry charge state like the cloud response does.
    pub battery_soc: Option<u8>,
}

impl InverterEnergyData {
    pub fn from_registers(regs: &RawRegisters, map: &EnergyRegisterMap) -> Self {
        let opt =
            |def: &Option<crate::registers::RegisterDef>| def.as_ref().and_then(|d| d.value(regs));

        Self {
            pv1_energy_today: map.pv1_energy_today.value(regs),
            pv2_energy_today: map.pv2_energy_today.value(regs),
            pv3_energy_today: opt(&map.pv3_energy_today),
            inverter_energy_today: map.inverter_energy_today.value(regs),
            ac_charge_energy_today: map.ac_charge_energy_today.value(regs),
            charge_energy_today: map.charge_energy_today.value(regs),
            discharge_energy_today: map.discharge_energy_today.value(regs),
            eps_energy_today: map.eps_energy_today.value(regs),
            export_energy_today: map.export_energy_today.value(regs),
            import_energy_today: map.import_energy_today.value(regs),

            pv1_energy_total: map.pv1_energy_total.value(regs),
            pv2_energy_total: map.pv2_energy_total.value(regs),
            pv3_energy_total: opt(&map.pv3_energy_total),
            inverter_energy_total: map.inverter_energy_total.value(regs),
            ac_charge_energy_total: map.ac_charge_energy_total.value(regs),
            charge_energy_total: map.charge_energy_total.value(regs),
            discharge_energy_total: map.discharge_energy_total.value(regs),
            eps_energy_total: map.eps_energy_total.value(regs),
            export_energy_total: map.export_energy_total.value(regs),
            import_energy_total: map.import_energy_total.value(regs),

            generator_energy_today: opt(&map.generator_energy_today),
            generator_energy_total: opt(&map.generator_energy_total),

            battery_soc: regs.get(5).map(|w| split_soc_soh(w).0),
        }
    }

    /// PV generation today across all strings, `None` when nothing reported.
    pub fn pv_energy_today(&self) -> Option<f64> {
        let strings = [
            self.pv1_energy_today,
            self.pv2_energy_today,
            self.pv3_energy_today,
        ];
        if strings.iter().all(Option::is_none) {
            return None;
        }
        Some(strings.iter().flatten().sum())
    }

    /// Lifetime PV generation across all strings.
    pub fn pv_energy_total(&self) -> Option<f64> {
        let strings = [
            self.pv1_energy_total,
            self.pv2_energy_total,
            self.pv3_energy_total,
        ];
        if strings.iter().all(Option::is_none) {
            return None;
        }
        Some(strings.iter().flatten().sum())
    }
}
