//! Home Assistant Client.
//! This client is the higher level API client for Home Assistant.

use super::Result;
use super::http_client::HttpClient;
use super::schemas::{StateCreateOrUpdate, StatisticsImport};
use crate::models::BaseData;
use reqwest::Url;
use std::collections::HashMap;

/// Unit of every water quantity sent to Home Assistant.
pub const WATER_UNIT: &str = "m³";

pub struct Client {
    http: HttpClient,
}

impl Client {
    /// Creates a new instance of `Client`.
    pub fn new(url: Url, token: String) -> Self {
        let http = HttpClient::new(url, token);
        Client { http }
    }

    /// Set the passive water meter sensor in Home Assistant.
    /// The state stays `unknown`, the history is delivered through statistics only.
    pub async fn set_water_meter(
        &self,
        entity_id: &str,
        friendly_name: &str,
        data: &BaseData,
    ) -> Result<()> {
        let state = Self::create_water_meter_state(friendly_name, data);
        self.http.set_state(entity_id, &state).await?;
        Ok(())
    }

    /// Import a batch of long-term statistics.
    pub async fn import_statistics(&self, import: &StatisticsImport) -> Result<()> {
        self.http.import_statistics(import).await?;
        Ok(())
    }

    /// Create the state of the water meter sensor.
    fn create_water_meter_state(friendly_name: &str, data: &BaseData) -> StateCreateOrUpdate {
        let mut attributes: HashMap<String, String> = [
            ("friendly_name", friendly_name.to_string()),
            ("device_class", "water".to_string()),
            ("unit_of_measurement", WATER_UNIT.to_string()),
            ("state_class", "total_increasing".to_string()),
            ("section_id", data.section_id.to_string()),
            (
                "note",
                "Readings lag by one to two days, see the long-term statistics".to_string(),
            ),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        let optional = [
            ("manufacturer", data.meter.manufacturer.clone()),
            ("model", data.meter.model.clone()),
            ("serial_number", data.meter.serial_number.clone()),
            ("installation_date", data.meter.installed_at.clone()),
            (
                "last_reading_date",
                data.last_reading.map(|reading| reading.date.to_string()),
            ),
            (
                "last_reading_value",
                data.last_reading.map(|reading| reading.value.to_string()),
            ),
        ];
        attributes.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key.to_string(), value))),
        );

        StateCreateOrUpdate {
            state: "unknown".to_string(),
            attributes: Some(attributes),
        }
    }
}
