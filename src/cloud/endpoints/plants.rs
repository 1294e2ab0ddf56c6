//! Plant (station) topology and configuration endpoints.

use crate::cloud::{cache_key, models, parse_response, LuxpowerClient};
use crate::error::Result;

pub struct PlantEndpoints<'a> {
    client: &'a LuxpowerClient,
}

impl<'a> PlantEndpoints<'a> {
    pub(crate) fn new(client: &'a LuxpowerClient) -> Self {
        Self { client }
    }

    /// List all plants visible to the account.
    pub async fn get_plants(&self) -> Result<models::PlantListResponse> {
        let key = cache_key("plant_list", &[]);
        let value = self
            .client
            .request(
                "/WManage/web/config/plant/list",
                &[("page", "1".to_string()), ("rows", "100".to_string())],
                Some((key, "plant_list")),
            )
            .await?;
        parse_response("get_plants", value)
    }

    /// Full detail record for one plant, as the config pages consume it.
    pub async fn get_plant_details(&self, plant_id: i64) -> Result<serde_json::Value> {
        let key = cache_key("plant_details", &[("plantId", &plant_id.to_string())]);
        self.client
            .request(
                "/WManage/web/config/plant/get",
                &[("plantId", plant_id.to_string())],
                Some((key, "plant_details")),
            )
            .await
    }

    /// Push an updated plant configuration. The server expects the full
    /// config document back, so callers should start from
    /// [`Self::get_plant_details`].
    pub async fn update_plant_config(
        &self,
        plant_id: i64,
        fields: &[(&str, String)],
    ) -> Result<models::SuccessResponse> {
        let mut form: Vec<(&str, String)> = vec![("plantId", plant_id.to_string())];
        form.extend(fields.iter().map(|(name, value)| (*name, value.clone())));
        let value = self
            .client
            .request("/WManage/web/config/plant/update", &form, None)
            .await?;
        parse_response("update_plant_config", value)
    }

    /// Toggle daylight-saving handling for a plant.
    pub async fn set_daylight_saving_time(
        &self,
        plant_id: i64,
        enabled: bool,
    ) -> Result<models::SuccessResponse> {
        self.update_plant_config(
            plant_id,
            &[("daylightSavingTime", enabled.to_string())],
        )
        .await
    }
}
