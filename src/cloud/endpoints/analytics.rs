//! Chart, breakdown, forecast and export queries.
//!
//! These feed dashboards rather than the core reading path, so they stay
//! thin: stable form parameters in, raw JSON documents out. The chart
//! payload shapes vary by portal version and device generation.

use crate::cloud::{cache_key, LuxpowerClient};
use crate::error::Result;

pub struct AnalyticsEndpoints<'a> {
    client: &'a LuxpowerClient,
}

impl<'a> AnalyticsEndpoints<'a> {
    pub(crate) fn new(client: &'a LuxpowerClient) -> Self {
        Self { client }
    }

    /// Day chart for one inverter: per-column power series for the given
    /// date ("2024-01-15").
    pub async fn get_day_chart(&self, serial: &str, date: &str) -> Result<serde_json::Value> {
        let key = cache_key("chart_day", &[("serialNum", serial), ("date", date)]);
        self.client
            .request(
                "/WManage/api/analyze/chart/dayColumn",
                &[
                    ("serialNum", serial.to_string()),
                    ("dateText", date.to_string()),
                ],
                Some((key, "chart")),
            )
            .await
    }

    /// Energy breakdown for a plant over a month ("2024-01") or year
    /// ("2024").
    pub async fn get_energy_breakdown(
        &self,
        plant_id: i64,
        period: &str,
    ) -> Result<serde_json::Value> {
        let key = cache_key(
            "energy_breakdown",
            &[("plantId", &plant_id.to_string()), ("period", period)],
        );
        self.client
            .request(
                "/WManage/api/analyze/energy/breakdown",
                &[
                    ("plantId", plant_id.to_string()),
                    ("dateText", period.to_string()),
                ],
                Some((key, "chart")),
            )
            .await
    }

    /// Server-side production forecast for a plant.
    pub async fn get_forecast(&self, plant_id: i64) -> Result<serde_json::Value> {
        let key = cache_key("forecast", &[("plantId", &plant_id.to_string())]);
        self.client
            .request(
                "/WManage/api/analyze/forecast",
                &[("plantId", plant_id.to_string())],
                Some((key, "chart")),
            )
            .await
    }

    /// Request a data export for one device over a date range. The server
    /// answers with a document describing (or containing) the export.
    pub async fn export_data(
        &self,
        serial: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<serde_json::Value> {
        self.client
            .request(
                "/WManage/web/analyze/data/export",
                &[
                    ("serialNum", serial.to_string()),
                    ("startDate", start_date.to_string()),
                    ("endDate", end_date.to_string()),
                ],
                None,
            )
            .await
    }
}
