//! Home Assistant API Schemas
//! The schemas module defines the data structures used to interact with the Home Assistant API.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StateCreateOrUpdate {
    pub state: String,
    pub attributes: Option<HashMap<String, String>>,
}

/// Body of the `recorder.import_statistics` service.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatisticsImport {
    pub statistic_id: String,
    pub source: String,
    pub name: String,
    pub unit_of_measurement: String,
    pub has_mean: bool,
    pub has_sum: bool,
    pub stats: Vec<StatisticPoint>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatisticPoint {
    /// RFC 3339 start of the hour the value belongs to.
    pub start: String,
    pub last_reset: String,
    pub sum: f64,
}
