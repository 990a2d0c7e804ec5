//! Mock server for SAUR API
use httpmock::{
    Method::{GET, POST},
    Mock, MockServer,
};
use reqwest::Url;
use serde_json::{Value, json};
use std::time::Duration;

pub struct SaurMockServer {
    pub server: MockServer,
}

#[allow(dead_code)]
impl SaurMockServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let server = MockServer::start_async().await;
        Self { server }
    }

    /// Get url
    pub fn url(&self) -> Url {
        let url = self.server.base_url();
        Url::parse(&url).expect("cannot parse url")
    }

    pub fn login(&self) -> String {
        String::from("me@example.com")
    }

    pub fn password(&self) -> String {
        String::from("password")
    }

    pub fn section_id(&self) -> String {
        String::from("123456")
    }

    /// Token handed out by `mock_auth_ok`
    pub fn token(&self) -> String {
        String::from("token-1")
    }

    fn section_path(&self, suffix: &str) -> String {
        format!(
            "/deli/section_subscriptions/{}/{suffix}",
            self.section_id()
        )
    }

    fn monthly_path(&self) -> String {
        format!(
            "/deli/section_subscription/{}/consumptions/monthly",
            self.section_id()
        )
    }

    /// Mock authentication success
    pub async fn mock_auth_ok<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(POST).path("/admin/v2/auth").json_body(json!({
                    "username": self.login(),
                    "password": self.password(),
                    "client_id": "frontjs-client",
                    "grant_type": "password",
                    "scope": "api-scope",
                    "isRecaptchaVerified": true
                }));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "token": {
                            "access_token": self.token(),
                            "token_type": "Bearer",
                            "expires_in": 3600
                        },
                        "defaultSectionId": 123456,
                        "clientId": "frontjs-client"
                    }));
            })
            .await
    }

    /// Mock authentication with wrong credentials
    pub async fn mock_auth_wrong_password<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(POST).path("/admin/v2/auth");
                then.status(401)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "invalid_grant"}));
            })
            .await
    }

    /// Mock authentication server error
    pub async fn mock_auth_server_error<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(POST).path("/admin/v2/auth");
                then.status(500);
            })
            .await
    }

    /// Mock the delivery points of the section
    pub async fn mock_delivery_points<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(self.section_path("delivery_points"))
                    .header("Authorization", format!("Bearer {}", self.token()));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "deliveryPointId": 987,
                        "meter": {
                            "meterBrandCode": "ITRON",
                            "meterModelCode": "AQUADIS+",
                            "trueRegistrationNumber": "I21FA123456",
                            "installationDate": "2021-03-15T00:00:00"
                        }
                    }));
            })
            .await
    }

    /// Mock delivery points without any body
    pub async fn mock_delivery_points_empty<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(self.section_path("delivery_points"));
                then.status(200).body("");
            })
            .await
    }

    /// Mock delivery points rejecting the given token
    pub async fn mock_delivery_points_unauthorized<'a>(&'a self, token: &str) -> Mock<'a> {
        let token = token.to_string();
        self.server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path(self.section_path("delivery_points"))
                    .header("Authorization", format!("Bearer {token}"));
                then.status(401);
            })
            .await
    }

    /// Mock the last meter index
    pub async fn mock_last_index<'a>(&'a self, reading_date: &str, value: f64) -> Mock<'a> {
        let reading_date = reading_date.to_string();
        self.server
            .mock_async(move |when, then| {
                when.method(GET).path(self.section_path("meter_indexes/last"));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "readingDate": reading_date,
                        "indexValue": value,
                        "readingType": "REAL"
                    }));
            })
            .await
    }

    /// Mock a last meter index request answered after `delay`
    pub async fn mock_last_index_delayed<'a>(&'a self, delay: Duration) -> Mock<'a> {
        self.server
            .mock_async(move |when, then| {
                when.method(GET).path(self.section_path("meter_indexes/last"));
                then.status(200)
                    .delay(delay)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "readingDate": "2024-03-31T00:00:00",
                        "indexValue": 114.0,
                        "readingType": "REAL"
                    }));
            })
            .await
    }

    /// Mock a last meter index request failing with a status
    pub async fn mock_last_index_status<'a>(&'a self, status: u16) -> Mock<'a> {
        self.server
            .mock_async(move |when, then| {
                when.method(GET).path(self.section_path("meter_indexes/last"));
                then.status(status);
            })
            .await
    }

    /// Mock the consumptions of one month. Entries are `(startDate, value, rangeType)`.
    pub async fn mock_monthly<'a>(
        &'a self,
        year: i32,
        month: u32,
        entries: &[(&str, f64, &str)],
    ) -> Mock<'a> {
        let consumptions: Vec<Value> = entries
            .iter()
            .map(|(start_date, value, range_type)| {
                json!({
                    "startDate": start_date,
                    "value": value,
                    "rangeType": range_type
                })
            })
            .collect();
        self.server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path(self.monthly_path())
                    .query_param("year", year.to_string())
                    .query_param("month", month.to_string());
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "consumptions": consumptions }));
            })
            .await
    }

    /// Mock the consumptions of any month with an empty list
    pub async fn mock_monthly_any_empty<'a>(&'a self) -> Mock<'a> {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(self.monthly_path());
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "consumptions": [] }));
            })
            .await
    }

    /// Mock a month request failing with a status
    pub async fn mock_monthly_status<'a>(&'a self, year: i32, month: u32, status: u16) -> Mock<'a> {
        self.server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path(self.monthly_path())
                    .query_param("year", year.to_string())
                    .query_param("month", month.to_string());
                then.status(status);
            })
            .await
    }
}
