//! Device discovery and telemetry endpoints.

use crate::cloud::{cache_key, models, parse_response, LuxpowerClient};
use crate::error::Result;

pub struct DeviceEndpoints<'a> {
    client: &'a LuxpowerClient,
}

impl<'a> DeviceEndpoints<'a> {
    pub(crate) fn new(client: &'a LuxpowerClient) -> Self {
        Self { client }
    }

    /// All devices registered under a plant (inverters and MID units).
    pub async fn get_devices(&self, plant_id: i64) -> Result<models::DeviceListResponse> {
        let key = cache_key("device_list", &[("plantId", &plant_id.to_string())]);
        let value = self
            .client
            .request(
                "/WManage/web/config/inverter/list",
                &[("plantId", plant_id.to_string())],
                Some((key, "device_list")),
            )
            .await?;
        parse_response("get_devices", value)
    }

    /// Parallel-group membership for a plant.
    pub async fn get_parallel_group_details(
        &self,
        plant_id: i64,
    ) -> Result<models::ParallelGroupsResponse> {
        let key = cache_key("parallel_groups", &[("plantId", &plant_id.to_string())]);
        let value = self
            .client
            .request(
                "/WManage/web/config/inverter/parallelGroupDetails",
                &[("plantId", plant_id.to_string())],
                Some((key, "parallel_groups")),
            )
            .await?;
        parse_response("get_parallel_group_details", value)
    }

    /// Ask the server to re-sync parallel-group membership from the
    /// devices' own parallel configuration.
    pub async fn sync_parallel_groups(&self, plant_id: i64) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/config/inverter/parallelGroupSync",
                &[("plantId", plant_id.to_string())],
                None,
            )
            .await?;
        parse_response("sync_parallel_groups", value)
    }

    /// Live runtime snapshot for one inverter.
    pub async fn get_inverter_runtime(&self, serial: &str) -> Result<models::InverterRuntime> {
        let key = cache_key("inverter_runtime", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/api/inverter/getInverterRuntime",
                &[("serialNum", serial.to_string())],
                Some((key, "inverter_runtime")),
            )
            .await?;
        parse_response("get_inverter_runtime", value)
    }

    /// Daily/lifetime energy statistics for one inverter.
    pub async fn get_inverter_energy(&self, serial: &str) -> Result<models::InverterEnergy> {
        let key = cache_key("inverter_energy", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/api/inverter/getInverterEnergyInfo",
                &[("serialNum", serial.to_string())],
                Some((key, "inverter_energy")),
            )
            .await?;
        parse_response("get_inverter_energy", value)
    }

    /// Aggregated energy across a parallel group, keyed by any member serial.
    pub async fn get_parallel_energy(&self, serial: &str) -> Result<models::InverterEnergy> {
        let key = cache_key("parallel_energy", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/api/inverter/getParallelEnergyInfo",
                &[("serialNum", serial.to_string())],
                Some((key, "inverter_energy")),
            )
            .await?;
        parse_response("get_parallel_energy", value)
    }

    /// Battery bank and per-module data for one inverter.
    pub async fn get_battery_info(&self, serial: &str) -> Result<models::BatteryInfoResponse> {
        let key = cache_key("battery_info", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/api/battery/getBatteryInfo",
                &[("serialNum", serial.to_string())],
                Some((key, "battery_info")),
            )
            .await?;
        parse_response("get_battery_info", value)
    }

    /// Runtime snapshot for a GridBOSS/MID grid-interface device.
    pub async fn get_midbox_runtime(&self, serial: &str) -> Result<models::MidboxRuntimeResponse> {
        let key = cache_key("midbox_runtime", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/api/midbox/getMidboxRuntime",
                &[("serialNum", serial.to_string())],
                Some((key, "midbox_runtime")),
            )
            .await?;
        parse_response("get_midbox_runtime", value)
    }
}
