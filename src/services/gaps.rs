//! Gap analysis over the reconstructed series.
//! Turns missing calendar days into a short list of probe dates, one per month-ish stretch.
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{MissingDate, MonthBlacklist, ReconstructedPoint, YearMonth};

/// Minimum distance, in days, between two kept probe dates.
const PROBE_SPACING_DAYS: i64 = 6;

/// Every calendar day strictly between two consecutive present dates, ascending.
pub fn find_missing_dates(points: &[ReconstructedPoint]) -> Vec<MissingDate> {
    let mut dates: Vec<NaiveDate> = points.iter().map(|point| point.date).collect();
    dates.sort_unstable();
    dates.dedup();

    dates
        .windows(2)
        .flat_map(|pair| {
            pair[0]
                .iter_days()
                .skip(1)
                .take_while(move |day| *day < pair[1])
        })
        .map(MissingDate)
        .collect()
}

/// Drop blacklisted months, then keep a date only if it lies more than
/// `PROBE_SPACING_DAYS` after the previously kept one.
pub fn compact(missing: &[MissingDate], blacklist: &MonthBlacklist) -> Vec<MissingDate> {
    let mut candidates: Vec<MissingDate> = missing
        .iter()
        .filter(|date| !blacklist.contains(&date.year_month()))
        .copied()
        .collect();
    candidates.sort_unstable();

    let mut kept: Vec<MissingDate> = Vec::new();
    for candidate in candidates {
        match kept.last() {
            Some(last) if candidate.0 - last.0 <= Duration::days(PROBE_SPACING_DAYS) => {}
            _ => kept.push(candidate),
        }
    }
    kept
}

/// Month whose consumptions are expected to be published upstream by now.
/// Data lags by about a day, and the provider closes its day at 10:00 UTC.
pub fn current_target_month(now_utc: NaiveDateTime) -> YearMonth {
    let shifted = now_utc - Duration::days(1) - Duration::hours(10);
    YearMonth::of(shifted.date())
}
