//! Domain models shared by the store, the gap analyzer and the coordinator.
use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Identifier of the metered section (one per configured account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        SectionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A calendar month, the granularity at which consumptions are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        YearMonth { year, month }
    }

    /// Month containing the given day.
    pub fn of(date: NaiveDate) -> Self {
        YearMonth::new(date.year(), date.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Authoritative absolute meter index read on a given day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorReading {
    pub date: NaiveDate,
    pub value: f64,
}

/// Granularity of a consumption entry returned by the meter API.
/// Only `Day` entries are persisted.
#[derive(Debug, Clone, PartialEq, Eq, EnumString, Display)]
pub enum RangeType {
    Day,
    Week,
    Month,
    Year,
    #[strum(default)]
    Other(String),
}

/// Relative consumption for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionDelta {
    pub date: NaiveDate,
    pub relative_value: f64,
    pub range_type: RangeType,
}

impl ConsumptionDelta {
    pub fn day(date: NaiveDate, relative_value: f64) -> Self {
        ConsumptionDelta {
            date,
            relative_value,
            range_type: RangeType::Day,
        }
    }
}

/// Absolute meter index derived from the anchor and the deltas around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructedPoint {
    pub date: NaiveDate,
    pub absolute_value: f64,
}

/// A day without any consumption row inside the observed span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissingDate(pub NaiveDate);

impl MissingDate {
    pub fn year_month(&self) -> YearMonth {
        YearMonth::of(self.0)
    }
}

/// Months whose fetch failed during this run and must not be probed again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthBlacklist(HashSet<YearMonth>);

impl MonthBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the month was not blacklisted yet.
    pub fn insert(&mut self, month: YearMonth) -> bool {
        self.0.insert(month)
    }

    /// Returns `true` if the month was blacklisted.
    pub fn remove(&mut self, month: &YearMonth) -> bool {
        self.0.remove(month)
    }

    pub fn contains(&self, month: &YearMonth) -> bool {
        self.0.contains(month)
    }
}

impl FromIterator<YearMonth> for MonthBlacklist {
    fn from_iter<I: IntoIterator<Item = YearMonth>>(iter: I) -> Self {
        MonthBlacklist(iter.into_iter().collect())
    }
}

/// Static metadata of the water meter, fetched once at setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterMetadata {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub installed_at: Option<String>,
}

/// Snapshot exposed to the passive sensor: device metadata plus the last physical reading.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseData {
    pub section_id: SectionId,
    pub meter: MeterMetadata,
    pub last_reading: Option<AnchorReading>,
}

impl BaseData {
    pub fn new(section_id: SectionId, meter: MeterMetadata) -> Self {
        BaseData {
            section_id,
            meter,
            last_reading: None,
        }
    }
}
