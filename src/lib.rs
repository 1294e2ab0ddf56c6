//! Multi-transport client for Luxpower/EG4 hybrid inverters and GridBOSS
//! grid-interface devices.
//!
//! Three interchangeable transports expose the same operation set against
//! the same logical device:
//!
//! - [`HttpTransport`] — the vendor cloud API (session cookie, response
//!   cache, backoff);
//! - [`ModbusTransport`] — Modbus TCP on port 502;
//! - [`DongleTransport`] — the WiFi datalogger's framed protocol on port
//!   8000.
//!
//! Local transports discover the connected device's family at connect time
//! and decode raw registers through per-family register maps, so a runtime
//! read returns the same [`data::InverterRuntimeData`] no matter which path
//! carried it.
//!
//! ```no_run
//! use lxp_client::{create_modbus_transport, Transport};
//!
//! # async fn example() -> lxp_client::Result<()> {
//! let transport = create_modbus_transport("192.168.1.100", "CE12345678");
//! transport.connect().await?;
//!
//! let runtime = transport.read_runtime().await?;
//! println!("PV power: {:?} W", runtime.pv_total_power());
//! println!("Battery SOC: {:?} %", runtime.battery_soc);
//!
//! transport.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! IMPORTANT: both local protocols allow only ONE concurrent client per
//! device. Running two integrations against the same inverter desyncs the
//! session; the transports detect this and force a reconnect, but cannot
//! prevent it across processes.

pub mod cloud;
pub mod data;
pub mod error;
pub mod registers;
pub mod scanner;
pub mod transport;

use std::sync::Arc;

pub use cloud::LuxpowerClient;
pub use data::{
    BatteryBankData, BatteryModuleData, InverterEnergyData, InverterRuntimeData, MidboxRuntimeData,
};
pub use error::{Error, Result};
pub use registers::InverterFamily;
pub use transport::{
    DeviceIdentity, DongleTransport, HttpTransport, ModbusTransport, ParameterUpdates,
    ParameterValues, Transport, TransportCapabilities,
};

/// Create a cloud transport over an authenticated API client.
///
/// The client is shared; create one per account and one transport per
/// device serial.
pub fn create_http_transport(client: Arc<LuxpowerClient>, serial: &str) -> HttpTransport {
    HttpTransport::new(client, serial)
}

/// Create a Modbus TCP transport for direct local communication on port
/// 502. Pass the expected inverter serial for validation, or an empty
/// string to skip it.
pub fn create_modbus_transport(host: &str, serial: &str) -> ModbusTransport {
    ModbusTransport::new(host, serial)
}

/// Create a WiFi dongle transport on port 8000. Needs both the dongle's own
/// serial (on the label, or the dongle's AP SSID) and the inverter serial
/// behind it.
pub fn create_dongle_transport(
    host: &str,
    dongle_serial: &str,
    inverter_serial: &str,
) -> DongleTransport {
    DongleTransport::new(host, dongle_serial, inverter_serial)
}
