//! Integration tests for the Home Assistant client.
use crate::mockserver_homeassistant::HomeAssistantMockServer;
use chrono::NaiveDate;
use grelwater::integration::homeassistant::{Client, Error, StatisticPoint, StatisticsImport};
use grelwater::models::{AnchorReading, BaseData, MeterMetadata, SectionId};
use rstest::fixture;
use rstest::*;


#[fixture]
/// Combined fixture yielding a client and its HomeAssistantMockServer
async fn client_server() -> (Client, HomeAssistantMockServer) {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
    let server = HomeAssistantMockServer::start().await;
    let url = server.url();
    let token = server.token().to_string();
    let client = Client::new(url, token);
    (client, server)
}

fn statistics_import() -> StatisticsImport {
    StatisticsImport {
        statistic_id: "sensor.saur_water_123456".into(),
        source: "recorder".into(),
        name: "Water consumption 123456".into(),
        unit_of_measurement: "m³".into(),
        has_mean: false,
        has_sum: true,
        stats: vec![StatisticPoint {
            start: "2024-10-21T01:00:00+02:00".into(),
            last_reset: "1970-01-01T00:00:00+01:00".into(),
            sum: 114.5,
        }],
    }
}

#[rstest]
#[tokio::test]
async fn test_client_set_water_meter(#[future] client_server: (Client, HomeAssistantMockServer)) {
    let (client, server) = client_server.await;
    let mut data = BaseData::new(SectionId::new("123456"), MeterMetadata::default());
    data.last_reading = Some(AnchorReading {
        date: NaiveDate::from_ymd_opt(2024, 10, 21).unwrap(),
        value: 114.5,
    });
    let mock = server.mock_set_water_meter("sensor.saur_water_123456").await;

    let result = client
        .set_water_meter("sensor.saur_water_123456", "Water meter 123456", &data)
        .await;

    mock.assert_async().await;
    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn test_client_import_statistics(
    #[future] client_server: (Client, HomeAssistantMockServer),
) {
    let (client, server) = client_server.await;
    let mock = server
        .mock_import_statistics(&[
            "\"statistic_id\":\"sensor.saur_water_123456\"",
            "\"has_sum\":true",
            "\"sum\":114.5",
        ])
        .await;

    let result = client.import_statistics(&statistics_import()).await;

    mock.assert_async().await;
    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn test_client_reliability_server_error(
    #[future] client_server: (Client, HomeAssistantMockServer),
) {
    let (client, server) = client_server.await;
    let mock = server.mock_error_import_statistics().await;

    let result_call_1 = client.import_statistics(&statistics_import()).await;
    let result_call_2 = client.import_statistics(&statistics_import()).await;

    assert!(mock.hits_async().await > 2, "should retry on server error");
    assert!(
        matches!(result_call_1, Err(Error::RequestFailed(_))),
        "request should fail due to server error"
    );
    assert!(
        matches!(result_call_2, Err(Error::RequestRejected)),
        "circuit breaker should reject the request due to repeated failures"
    );
}
