//! Firmware update endpoints.

use crate::cloud::{cache_key, models, parse_response, LuxpowerClient};
use crate::error::{Error, Result};

pub struct FirmwareEndpoints<'a> {
    client: &'a LuxpowerClient,
}

impl<'a> FirmwareEndpoints<'a> {
    pub(crate) fn new(client: &'a LuxpowerClient) -> Self {
        Self { client }
    }

    /// Check whether a newer firmware is available for a device.
    pub async fn check_update(&self, serial: &str) -> Result<models::FirmwareStatus> {
        let key = cache_key("firmware_check", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/web/maintain/firmware/check",
                &[("inverterSn", serial.to_string())],
                Some((key, "firmware")),
            )
            .await?;
        parse_response("check_update", value)
    }

    /// Progress of an in-flight firmware update.
    pub async fn get_update_status(&self, serial: &str) -> Result<models::FirmwareStatus> {
        let key = cache_key("firmware_status", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/web/maintain/firmware/status",
                &[("inverterSn", serial.to_string())],
                Some((key, "firmware")),
            )
            .await?;
        parse_response("get_update_status", value)
    }

    /// Whether the device is eligible for a remote update at all (some
    /// hardware revisions and parallel roles are excluded server-side).
    pub async fn check_eligibility(&self, serial: &str) -> Result<models::FirmwareStatus> {
        let key = cache_key("firmware_eligibility", &[("serialNum", serial)]);
        let value = self
            .client
            .request(
                "/WManage/web/maintain/firmware/eligibility",
                &[("inverterSn", serial.to_string())],
                Some((key, "firmware")),
            )
            .await?;
        parse_response("check_eligibility", value)
    }

    /// Start a remote firmware update. Irreversible once the device begins
    /// flashing; callers should gate this behind their own confirmation.
    pub async fn start_update(&self, serial: &str) -> Result<models::SuccessResponse> {
        let value = self
            .client
            .request(
                "/WManage/web/maintain/firmware/start",
                &[("inverterSn", serial.to_string())],
                None,
            )
            .await?;
        let response: models::SuccessResponse = parse_response("start_update", value)?;
        if !response.success {
            return Err(Error::write(
                "start_update",
                response
                    .msg
                    .clone()
                    .unwrap_or_else(|| "server refused firmware update".to_string()),
            ));
        }
        Ok(response)
    }
}
