//! Local store of anchors and daily consumption deltas.
//! One SQLite file per section, accessed through `tokio_rusqlite` so queries never block the runtime.
mod error;
pub mod repository;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

pub use error::{Error, Result};

use crate::models::{AnchorReading, ConsumptionDelta, RangeType, ReconstructedPoint, SectionId};

#[derive(Clone)]
pub struct Store {
    conn: tokio_rusqlite::Connection,
}

impl Store {
    /// Database file of a section inside the data directory.
    pub fn path_for(data_dir: &Path, section_id: &SectionId) -> PathBuf {
        data_dir.join(format!("water_{section_id}.db"))
    }

    /// Open the database at the given path, creating parent directories if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = tokio_rusqlite::Connection::open(&path).await?;
        log::debug!("Opened store at {}", path.display());
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Ok(Self { conn })
    }

    /// Create both tables. Safe to call on every start.
    pub async fn init(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                repository::create_tables(conn)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Upsert the daily entries of `deltas`, skipping every other granularity.
    /// Returns the number of rows written.
    pub async fn write_deltas(
        &self,
        deltas: &[ConsumptionDelta],
        section_id: &SectionId,
    ) -> Result<usize> {
        let rows: Vec<(NaiveDate, f64)> = deltas
            .iter()
            .filter(|delta| delta.range_type == RangeType::Day)
            .map(|delta| (delta.date, delta.relative_value))
            .collect();
        let skipped = deltas.len() - rows.len();
        if skipped > 0 {
            log::debug!("Skipped {skipped} non-daily consumption entries for section {section_id}");
        }
        let section = section_id.to_string();
        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (date, value) in &rows {
                    repository::upsert_consumption(&tx, *date, &section, *value)?;
                }
                tx.commit()?;
                Ok::<usize, rusqlite::Error>(rows.len())
            })
            .await?;
        Ok(written)
    }

    pub async fn update_anchor(&self, reading: &AnchorReading, section_id: &SectionId) -> Result<()> {
        let reading = *reading;
        let section = section_id.to_string();
        self.conn
            .call(move |conn| {
                repository::upsert_anchor(conn, reading.date, &section, reading.value)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Absolute index on `target`. `0.0` means no data yet, not a real reading.
    pub async fn total_consumption_as_of(
        &self,
        target: NaiveDate,
        section_id: &SectionId,
    ) -> Result<f64> {
        let section = section_id.to_string();
        let total = self
            .conn
            .call(move |conn| repository::total_consumption_as_of(conn, target, &section))
            .await?;
        Ok(total)
    }

    /// Absolute index of every day holding a delta, newest first.
    pub async fn reconstruct_all(&self, section_id: &SectionId) -> Result<Vec<ReconstructedPoint>> {
        let section = section_id.to_string();
        let rows = self
            .conn
            .call(move |conn| repository::consumptions_with_absolute(conn, &section))
            .await?;
        let points = rows
            .into_iter()
            .filter_map(|(key, absolute_value)| match repository::parse_date_key(&key) {
                Some(date) => Some(ReconstructedPoint {
                    date,
                    absolute_value,
                }),
                None => {
                    log::warn!("Skipping stored row with malformed date '{key}'");
                    None
                }
            })
            .collect();
        Ok(points)
    }

    /// Close the underlying connection.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn store() -> Store {
        let store = Store::open_memory().await.unwrap();
        store.init().await.unwrap();
        store
    }

    async fn count_consumptions(store: &Store) -> i64 {
        store
            .conn
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM consumptions", [], |row| row.get(0))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_twice() {
        let store = store().await;
        store.init().await.unwrap();
        assert_eq!(count_consumptions(&store).await, 0);
    }

    #[tokio::test]
    async fn test_write_deltas_is_idempotent() {
        let store = store().await;
        let section = SectionId::new("s1");
        let deltas = vec![
            ConsumptionDelta::day(d(2024, 1, 1), 1.0),
            ConsumptionDelta::day(d(2024, 1, 2), 2.0),
        ];

        store.write_deltas(&deltas, &section).await.unwrap();
        store
            .update_anchor(&AnchorReading { date: d(2024, 1, 2), value: 10.0 }, &section)
            .await
            .unwrap();
        let once = store.reconstruct_all(&section).await.unwrap();
        store.write_deltas(&deltas, &section).await.unwrap();
        let twice = store.reconstruct_all(&section).await.unwrap();

        assert_eq!(count_consumptions(&store).await, 2);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_write_deltas_skips_non_daily_entries() {
        let store = store().await;
        let section = SectionId::new("s1");
        let deltas = vec![
            ConsumptionDelta::day(d(2024, 1, 1), 1.0),
            ConsumptionDelta {
                date: d(2024, 1, 1),
                relative_value: 30.0,
                range_type: RangeType::Month,
            },
            ConsumptionDelta {
                date: d(2024, 1, 2),
                relative_value: 7.0,
                range_type: RangeType::Other("Hour".into()),
            },
        ];

        let written = store.write_deltas(&deltas, &section).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(count_consumptions(&store).await, 1);
    }

    #[tokio::test]
    async fn test_reconstruct_all_newest_first() {
        let store = store().await;
        let section = SectionId::new("s1");
        store
            .write_deltas(
                &[
                    ConsumptionDelta::day(d(2024, 10, 19), 0.51),
                    ConsumptionDelta::day(d(2024, 10, 20), 0.50),
                    ConsumptionDelta::day(d(2024, 10, 21), 0.82),
                    ConsumptionDelta::day(d(2024, 10, 22), 0.42),
                ],
                &section,
            )
            .await
            .unwrap();
        store
            .update_anchor(&AnchorReading { date: d(2024, 10, 21), value: 114.0 }, &section)
            .await
            .unwrap();

        let points = store.reconstruct_all(&section).await.unwrap();

        let expected = [
            (d(2024, 10, 22), 114.42),
            (d(2024, 10, 21), 114.00),
            (d(2024, 10, 20), 113.18),
            (d(2024, 10, 19), 112.68),
        ];
        assert_eq!(points.len(), expected.len());
        for (point, (date, value)) in points.iter().zip(expected) {
            assert_eq!(point.date, date);
            assert!((point.absolute_value - value).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_reconstruct_all_without_anchor() {
        let store = store().await;
        let section = SectionId::new("s1");
        store
            .write_deltas(&[ConsumptionDelta::day(d(2024, 1, 1), 1.0)], &section)
            .await
            .unwrap();
        assert!(store.reconstruct_all(&section).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_total_consumption_as_of_empty_store() {
        let store = store().await;
        let total = store
            .total_consumption_as_of(d(2024, 1, 1), &SectionId::new("s1"))
            .await
            .unwrap();
        assert_eq!(total, 0.0);
    }

    #[tokio::test]
    async fn test_open_at_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let section = SectionId::new("42");
        let path = Store::path_for(&dir.path().join("nested"), &section);
        assert!(path.ends_with("nested/water_42.db"));

        let store = Store::open_at(&path).await.unwrap();
        store.init().await.unwrap();
        store
            .update_anchor(&AnchorReading { date: d(2024, 1, 1), value: 5.0 }, &section)
            .await
            .unwrap();
        store
            .write_deltas(&[ConsumptionDelta::day(d(2024, 1, 2), 1.5)], &section)
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = Store::open_at(&path).await.unwrap();
        reopened.init().await.unwrap();
        let total = reopened
            .total_consumption_as_of(d(2024, 1, 3), &section)
            .await
            .unwrap();
        assert_eq!(total, 6.5);
    }
}
