//! SAUR Client.
//! This client is the higher level API client for SAUR, returning domain models.
use super::http_client::HttpClient;
use super::schemas::{DeliveryPoints, LastIndex, MonthlyConsumptions};
use super::Result;
use crate::models::{
    AnchorReading, ConsumptionDelta, MeterMetadata, RangeType, SectionId, YearMonth,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;

static DELIVERY_POINTS: &str = "deli/section_subscriptions/{section}/delivery_points";
static LAST_INDEX: &str = "deli/section_subscriptions/{section}/meter_indexes/last";
static MONTHLY_CONSUMPTIONS: &str = "deli/section_subscription/{section}/consumptions/monthly";

pub struct Client {
    http: HttpClient,
}

impl Client {
    /// Creates a new instance of `Client`.
    pub fn new(url: Url, login: String, password: String, section_id: Option<String>) -> Self {
        let http = HttpClient::new(url, login, password, section_id);
        Client { http }
    }

    /// Authenticate and return the access token.
    pub async fn authenticate(&self) -> Result<String> {
        let session = self.http.authenticate().await?;
        Ok(session.access_token)
    }

    /// Reuse a stored token. No request is sent until the next API call.
    pub async fn restore_session(&self, access_token: String, section_id: &SectionId) {
        self.http
            .restore_session(access_token, section_id.to_string())
            .await;
    }

    /// Current access token, if a session exists.
    pub async fn access_token(&self) -> Option<String> {
        self.http
            .session()
            .await
            .map(|session| session.access_token)
    }

    /// Section of the current session, if a session exists.
    pub async fn section_id(&self) -> Option<SectionId> {
        self.http
            .session()
            .await
            .map(|session| SectionId::new(session.section_id))
    }

    /// Drop the session.
    pub async fn close(&self) {
        self.http.clear_session().await;
    }

    /// Get the meter metadata of the delivery point, `None` if the API has none.
    pub async fn get_delivery_point(&self) -> Result<Option<MeterMetadata>> {
        let value = self.http.get(DELIVERY_POINTS, &[]).await?;
        let Some(delivery) = Self::decode::<DeliveryPoints>(value)? else {
            return Ok(None);
        };
        Ok(delivery.meter.map(|meter| MeterMetadata {
            manufacturer: meter.meter_brand_code,
            model: meter.meter_model_code,
            serial_number: meter.true_registration_number,
            installed_at: meter.installation_date,
        }))
    }

    /// Get the last physical meter reading, `None` if the API has none.
    pub async fn get_last_reading(&self) -> Result<Option<AnchorReading>> {
        let value = self.http.get(LAST_INDEX, &[]).await?;
        Ok(Self::decode::<LastIndex>(value)?.and_then(Self::extract_reading))
    }

    /// Get the consumption entries of one month. Entries that cannot be read are skipped.
    pub async fn get_month_consumptions(&self, month: YearMonth) -> Result<Vec<ConsumptionDelta>> {
        let query = [
            ("year", month.year.to_string()),
            ("month", month.month.to_string()),
        ];
        let value = self.http.get(MONTHLY_CONSUMPTIONS, &query).await?;
        let monthly = Self::decode::<MonthlyConsumptions>(value)?;
        Ok(monthly
            .and_then(|monthly| monthly.consumptions)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let raw_date = entry.start_date.unwrap_or_default();
                let Some(date) = parse_api_date(&raw_date) else {
                    log::warn!("Skipping consumption with malformed date '{raw_date}'");
                    return None;
                };
                let Some(relative_value) = entry.value else {
                    log::warn!("Skipping consumption of {date} without value");
                    return None;
                };
                let raw_range = entry.range_type.unwrap_or_default();
                let range_type =
                    RangeType::from_str(&raw_range).unwrap_or(RangeType::Other(raw_range));
                Some(ConsumptionDelta {
                    date,
                    relative_value,
                    range_type,
                })
            })
            .collect())
    }

    /// Decode a response document, mapping `null` to `None`.
    fn decode<T: DeserializeOwned>(value: Value) -> Result<Option<T>> {
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    fn extract_reading(index: LastIndex) -> Option<AnchorReading> {
        let raw_date = index.reading_date?;
        let value = index.index_value?;
        match parse_api_date(&raw_date) {
            Some(date) => Some(AnchorReading { date, value }),
            None => {
                log::warn!("Ignoring last reading with malformed date '{raw_date}'");
                None
            }
        }
    }
}

/// Parse the date formats seen in SAUR responses, keeping the day only.
pub fn parse_api_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|datetime| datetime.date())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}
