//! Transport abstraction over the three ways of talking to a device.
//!
//! All transports expose the same operation set against the same logical
//! device; the caller picks cloud (HTTP API), Modbus TCP or the WiFi dongle
//! protocol and gets identical record types back.
//!
//! Higher-level code must not issue concurrent operations on one transport
//! instance: the local protocols allow a single in-flight transaction per
//! session, and each transport serialises its frame exchanges internally.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::{BatteryBankData, InverterEnergyData, InverterRuntimeData, MidboxRuntimeData};
use crate::error::Result;
use crate::registers::InverterFamily;

pub mod discovery;
pub mod dongle;
pub mod http;
pub mod modbus;

pub use discovery::{discover_device_info, RegisterIo};
pub use dongle::DongleTransport;
pub use http::HttpTransport;
pub use modbus::ModbusTransport;

/// What a transport can do, and what it needs to do it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCapabilities {
    pub can_read_runtime: bool,
    pub can_read_energy: bool,
    pub can_read_battery: bool,
    /// True for Modbus and dongle transports on the local network.
    pub is_local: bool,
    /// True for the cloud transport (session cookie login).
    pub requires_authentication: bool,
}

/// Identity of the connected device, established once per session by the
/// discovery probe (local transports) or taken from the cloud topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// 10-character device serial.
    pub serial: String,
    pub device_type_code: u16,
    /// Firmware code such as "FAAB-2525"; empty when unreadable.
    pub firmware_version: String,
    /// `None` when the device-type code is not recognised; family-dependent
    /// reads then fail classified until the caller overrides the family.
    pub family: Option<InverterFamily>,
}

/// Parameter read result. Local transports return raw register words by
/// address; the cloud API resolves registers to named parameters server-side.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValues {
    ByAddress(BTreeMap<u16, u16>),
    ByName(BTreeMap<String, serde_json::Value>),
}

impl ParameterValues {
    pub fn len(&self) -> usize {
        match self {
            ParameterValues::ByAddress(map) => map.len(),
            ParameterValues::ByName(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameter write request. Local transports take raw register/value pairs;
/// the cloud API takes `(holdParam, valueText)` pairs. A transport rejects
/// the flavor it cannot express with a configuration error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterUpdates {
    Registers(BTreeMap<u16, u16>),
    Named(Vec<(String, String)>),
}

/// Common operation set every transport honors.
#[async_trait]
pub trait Transport: Send + Sync {
    fn capabilities(&self) -> TransportCapabilities;

    /// Serial of the device this transport addresses (caller-provided, and
    /// verified against the device by local transports).
    fn serial(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Establish the session. Idempotent while connected. Local transports
    /// run identity discovery here.
    async fn connect(&self) -> Result<()>;

    /// Release sockets/cookies. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    async fn read_runtime(&self) -> Result<InverterRuntimeData>;

    async fn read_energy(&self) -> Result<InverterEnergyData>;

    /// `Ok(None)` means no battery present — distinct from a read failure.
    async fn read_battery(&self, include_individual: bool) -> Result<Option<BatteryBankData>>;

    /// Grid-interface runtime. Fails with a device error unless the
    /// connected device is a GridBOSS/MID.
    async fn read_midbox_runtime(&self) -> Result<MidboxRuntimeData>;

    async fn read_parameters(&self, start: u16, count: u16) -> Result<ParameterValues>;

    async fn write_parameters(&self, updates: ParameterUpdates) -> Result<()>;
}

/// Group sorted register updates into maximal runs of consecutive addresses.
/// Each run becomes one multi-word write frame; singletons use the
/// single-register function code.
pub(crate) fn coalesce_writes(parameters: &BTreeMap<u16, u16>) -> Vec<(u16, Vec<u16>)> {
    let mut groups: Vec<(u16, Vec<u16>)> = Vec::new();
    for (&address, &value) in parameters {
        match groups.last_mut() {
            Some((start, values)) if address as u32 == *start as u32 + values.len() as u32 => {
                values.push(value);
            }
            _ => groups.push((address, vec![value])),
        }
    }
    groups
}
