//! Parameter read/write, function control and quick charge endpoints.
//!
//! Writes change live device configuration; there is no dry-run on the
//! server side.

use std::collections::BTreeMap;

use crate::cloud::{cache_key, models, parse_response, LuxpowerClient};
use crate::error::{Error, Result};

/// API ceiling on registers per read call.
pub const MAX_POINTS_PER_READ: u16 = 127;

pub struct ControlEndpoints<'a> {
    client: &'a LuxpowerClient,
}

impl<'a> ControlEndpoints<'a> {
    pub(crate) fn new(client: &'a LuxpowerClient) -> Self {
        Self { client }
    }

    /// Read a window of configuration registers. The server resolves
    /// register numbers to named parameters ("HOLD_AC_CHARGE_POWER_CMD");
    /// windows above 127 points are split into multiple calls and merged.
    pub async fn read_parameters(
        &self,
        serial: &str,
        start_register: u16,
        point_number: u16,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        if point_number == 0 {
            return Err(Error::config("parameter count must be positive"));
        }

        let mut merged = BTreeMap::new();
        let mut start = start_register;
        let mut remaining = point_number;
        while remaining > 0 {
            let chunk = remaining.min(MAX_POINTS_PER_READ);
            let response = self.read_parameter_window(serial, start, chunk).await?;
            merged.extend(response.parameters);
            start = start.wrapping_add(chunk);
            remaining -= chunk;
        }
        Ok(merged)
    }

    async fn read_parameter_window(
        &self,
        serial: &str,
        start_register: u16,
        point_number: u16,
    ) -> Result<models::ParameterReadResponse> {
        let key = cache_key(
            "params",
            &[
                ("sn", serial),
                ("start", &start_register.to_string()),
                ("count", &point_number.to_string()),
            ],
        );
        let value = self
            .client
            .request(
                "/WManage/web/maintain/remoteRead/read",
                &[
                    ("inverterSn", serial.to_string()),
                    ("startRegister", start_register.to_string()),
                    ("pointNumber", point_number.to_string()),
                ],
                Some((key, "parameter_read")),
            )
            .await?;
        parse_response("read_parameters", value)
    }

    /// Write one named hold parameter as text (the server validates and
    /// converts).
    pub async fn write_parameter(
        &self,
        serial: &str,
        hold_param: &str,
        value_text: &str,
    ) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/maintain/remoteSet/write",
                &[
                    ("inverterSn", serial.to_string()),
                    ("holdParam", hold_param.to_string()),
                    ("valueText", value_text.to_string()),
                    ("clientType", "WEB".to_string()),
                    ("remoteSetType", "NORMAL".to_string()),
                ],
                None,
            )
            .await?;
        let response: models::SuccessResponse = parse_response("write_parameter", value)?;
        if !response.success {
            return Err(Error::write(
                "write_parameter",
                response
                    .msg
                    .clone()
                    .unwrap_or_else(|| format!("server rejected {hold_param}")),
            ));
        }
        Ok(response)
    }

    /// Enable or disable a device function flag (FUNC_EPS_EN, ...).
    pub async fn control_function(
        &self,
        serial: &str,
        function_param: &str,
        enable: bool,
    ) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/maintain/remoteSet/functionControl",
                &[
                    ("inverterSn", serial.to_string()),
                    ("functionParam", function_param.to_string()),
                    ("enable", enable.to_string()),
                    ("clientType", "WEB".to_string()),
                    ("remoteSetType", "NORMAL".to_string()),
                ],
                None,
            )
            .await?;
        parse_response("control_function", value)
    }

    pub async fn start_quick_charge(&self, serial: &str) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/config/quickCharge/start",
                &[
                    ("inverterSn", serial.to_string()),
                    ("clientType", "WEB".to_string()),
                ],
                None,
            )
            .await?;
        parse_response("start_quick_charge", value)
    }

    pub async fn stop_quick_charge(&self, serial: &str) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/config/quickCharge/stop",
                &[
                    ("inverterSn", serial.to_string()),
                    ("clientType", "WEB".to_string()),
                ],
                None,
            )
            .await?;
        parse_response("stop_quick_charge", value)
    }

    pub async fn get_quick_charge_status(&self, serial: &str) -> Result<models::QuickChargeStatus> {
        let key = cache_key("quick_charge", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/web/config/quickCharge/getStatusInfo",
                &[("inverterSn", serial.to_string())],
                Some((key, "quick_charge_status")),
            )
            .await?;
        parse_response("get_quick_charge_status", value)
    }

    pub async fn start_quick_discharge(&self, serial: &str) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/config/quickDischarge/start",
                &[
                    ("inverterSn", serial.to_string()),
                    ("clientType", "WEB".to_string()),
                ],
                None,
            )
            .await?;
        parse_response("start_quick_discharge", value)
    }

    pub async fn stop_quick_discharge(&self, serial: &str) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/config/quickDischarge/stop",
                &[
                    ("inverterSn", serial.to_string()),
                    ("clientType", "WEB".to_string()),
                ],
                None,
            )
            .await?;
        parse_response("stop_quick_discharge", value)
    }

    pub async fn get_quick_discharge_status(
        &self,
        serial: &str,
    ) -> Result<models::QuickChargeStatus> {
        let key = cache_key("quick_discharge", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/web/config/quickDischarge/getStatusInfo",
                &[("inverterSn", serial.to_string())],
                Some((key, "quick_charge_status")),
            )
            .await?;
        parse_response("get_quick_discharge_status", value)
    }
}
