//! SAUR API Schemas
//! Response documents of the SAUR customer API. Every field the API may omit is optional.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, PartialEq)]
pub struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub client_id: &'a str,
    pub grant_type: &'a str,
    pub scope: &'a str,
    #[serde(rename = "isRecaptchaVerified")]
    pub is_recaptcha_verified: bool,
}

impl<'a> AuthRequest<'a> {
    pub fn new(username: &'a str, password: &'a str) -> Self {
        AuthRequest {
            username,
            password,
            client_id: "frontjs-client",
            grant_type: "password",
            scope: "api-scope",
            is_recaptcha_verified: true,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub token: AuthToken,
    #[serde(
        rename = "defaultSectionId",
        default,
        deserialize_with = "string_or_number"
    )]
    pub default_section_id: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct AuthToken {
    pub access_token: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct DeliveryPoints {
    pub meter: Option<Meter>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    pub meter_brand_code: Option<String>,
    pub meter_model_code: Option<String>,
    pub true_registration_number: Option<String>,
    pub installation_date: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastIndex {
    pub reading_date: Option<String>,
    pub index_value: Option<f64>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct MonthlyConsumptions {
    #[serde(default)]
    pub consumptions: Option<Vec<ConsumptionEntry>>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionEntry {
    pub start_date: Option<String>,
    pub value: Option<f64>,
    pub range_type: Option<String>,
}

/// Section ids come back either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
