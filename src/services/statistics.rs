//! Statistics Publisher.
//! Forwards the reconstructed series to the Home Assistant recorder and keeps the passive sensor up to date.
use std::fmt::Display;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime, TimeZone};

use crate::integration::homeassistant::{self, StatisticPoint, StatisticsImport};
use crate::models::{BaseData, ReconstructedPoint, SectionId};

/// Hour of the day each daily point is recorded at.
const POINT_HOUR: u32 = 1;

pub struct StatisticsPublisher {
    homeassistant: Arc<homeassistant::Client>,
    namespace: String,
}

impl StatisticsPublisher {
    pub fn new(homeassistant: Arc<homeassistant::Client>, namespace: String) -> Self {
        StatisticsPublisher {
            homeassistant,
            namespace,
        }
    }

    /// Identifier shared by the statistic and the sensor entity.
    pub fn statistic_id(&self, section_id: &SectionId) -> String {
        format!("{}_{}", self.namespace, section_id)
    }

    /// Import every point as one cumulative sum per day. Returns the number of points sent.
    pub async fn publish(
        &self,
        section_id: &SectionId,
        points: &[ReconstructedPoint],
    ) -> Result<usize, homeassistant::Error> {
        let import = self.build_import(section_id, points, &Local);
        if import.stats.is_empty() {
            log::debug!("No statistics to publish for section {section_id}");
            return Ok(0);
        }
        self.homeassistant.import_statistics(&import).await?;
        log::info!(
            "Published {} statistics to {}",
            import.stats.len(),
            import.statistic_id
        );
        Ok(import.stats.len())
    }

    /// Post the passive sensor carrying the device metadata and the last reading.
    pub async fn publish_sensor(&self, data: &BaseData) -> Result<(), homeassistant::Error> {
        let entity_id = self.statistic_id(&data.section_id);
        let friendly_name = format!("Water meter {}", data.section_id);
        self.homeassistant
            .set_water_meter(&entity_id, &friendly_name, data)
            .await
    }

    /// Build the recorder payload, oldest point first.
    pub fn build_import<Tz>(
        &self,
        section_id: &SectionId,
        points: &[ReconstructedPoint],
        tz: &Tz,
    ) -> StatisticsImport
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let last_reset = Self::local_rfc3339(tz, NaiveDate::default(), NaiveTime::MIN)
            .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string());
        let point_time = NaiveTime::from_hms_opt(POINT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);

        let mut sorted = points.to_vec();
        sorted.sort_by_key(|point| point.date);

        let stats = sorted
            .into_iter()
            .filter_map(|point| match Self::local_rfc3339(tz, point.date, point_time) {
                Some(start) => Some(StatisticPoint {
                    start,
                    last_reset: last_reset.clone(),
                    sum: point.absolute_value,
                }),
                None => {
                    log::warn!("Skipping statistic of {}: no such local time", point.date);
                    None
                }
            })
            .collect();

        StatisticsImport {
            statistic_id: self.statistic_id(section_id),
            source: "recorder".to_string(),
            name: format!("Water consumption {section_id}"),
            unit_of_measurement: homeassistant::WATER_UNIT.to_string(),
            has_mean: false,
            has_sum: true,
            stats,
        }
    }

    fn local_rfc3339<Tz>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<String>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|datetime| datetime.to_rfc3339())
    }
}
