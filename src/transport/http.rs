//! Cloud-backed transport.
//!
//! Wraps an authenticated [`LuxpowerClient`] so a device on the vendor
//! cloud exposes the same operation set as the local transports. The client
//! is shared: several transports (one per device) can ride one session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cloud::LuxpowerClient;
use crate::data::{BatteryBankData, InverterEnergyData, InverterRuntimeData, MidboxRuntimeData};
use crate::error::{Error, Result};
use crate::transport::{
    ParameterUpdates, ParameterValues, Transport, TransportCapabilities,
};

pub struct HttpTransport {
    client: Arc<LuxpowerClient>,
    serial: String,
    connected: AtomicBool,
}

impl HttpTransport {
    pub fn new(client: Arc<LuxpowerClient>, serial: impl Into<String>) -> Self {
        Self {
            client,
            serial: serial.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<LuxpowerClient> {
        &self.client
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::connection("transport not connected"))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            can_read_runtime: true,
            can_read_energy: true,
            can_read_battery: true,
            is_local: false,
            requires_authentication: true,
        }
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<()> {
        self.client.ensure_authenticated().await?;
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        // The session belongs to the shared client; only this transport's
        // view of it is closed.
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn read_runtime(&self) -> Result<InverterRuntimeData> {
        self.ensure_connected()?;
        let runtime = self
            .client
            .devices()
            .get_inverter_runtime(&self.serial)
            .await?;
        Ok(runtime.to_data())
    }

    async fn read_energy(&self) -> Result<InverterEnergyData> {
        self.ensure_connected()?;
        let energy = self
            .client
            .devices()
            .get_inverter_energy(&self.serial)
            .await?;
        Ok(energy.to_data())
    }

    async fn read_battery(&self, _include_individual: bool) -> Result<Option<BatteryBankData>> {
        self.ensure_connected()?;
        // The cloud always reports the module array; there is no cheaper
        // aggregate-only call to prefer.
        let info = self.client.devices().get_battery_info(&self.serial).await?;
        Ok(info.to_bank())
    }

    async fn read_midbox_runtime(&self) -> Result<MidboxRuntimeData> {
        self.ensure_connected()?;
        let response = self
            .client
            .devices()
            .get_midbox_runtime(&self.serial)
            .await?;
        Ok(response.to_data())
    }

    async fn read_parameters(&self, start: u16, count: u16) -> Result<ParameterValues> {
        self.ensure_connected()?;
        let parameters = self
            .client
            .control()
            .read_parameters(&self.serial, start, count)
            .await?;
        Ok(ParameterValues::ByName(parameters))
    }

    async fn write_parameters(&self, updates: ParameterUpdates) -> Result<()> {
        self.ensure_connected()?;
        let named = match updates {
            ParameterUpdates::Named(pairs) => pairs,
            ParameterUpdates::Registers(_) => {
                return Err(Error::config(
                    "raw register writes require a local transport; the cloud API takes hold-parameter names",
                ));
            }
        };
        for (hold_param, value_text) in named {
            self.client
                .control()
                .write_parameter(&self.serial, &hold_param, &value_text)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        let client = Arc::new(LuxpowerClient::new("user", "pass").unwrap());
        HttpTransport::new(client, "1234567890")
    }

    #[test]
    fn test_capabilities() {
        let caps = transport().capabilities();
        assert!(!caps.is_local);
        assert!(caps.requires_authentication);
        assert!(caps.can_read_battery);
    }

    #[tokio::test]
    async fn test_reads_require_connection() {
        let err = transport().read_runtime().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_register_writes_rejected() {
        let t = transport();
        t.connected.store(true, Ordering::Relaxed);
        let err = t
            .write_parameters(ParameterUpdates::Registers(
                std::collections::BTreeMap::from([(10, 1)]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
