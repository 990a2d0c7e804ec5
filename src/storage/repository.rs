//! SQL statements of the local store.
//! Every function takes a plain `rusqlite::Connection` so it can run inside `tokio_rusqlite` calls.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, params};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date keys are stored at day granularity, as midnight timestamps.
pub fn date_key(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN)
        .format(DATE_KEY_FORMAT)
        .to_string()
}

/// Parse a date key back into a day. Returns `None` for malformed keys.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(key, DATE_KEY_FORMAT)
        .ok()
        .map(|datetime| datetime.date())
}

pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS consumptions (
            date TEXT NOT NULL,
            section_id TEXT NOT NULL,
            relative_value REAL NOT NULL,
            is_anchor INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (date, section_id)
        );
        CREATE TABLE IF NOT EXISTS anchors (
            date TEXT NOT NULL,
            section_id TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (date, section_id)
        );",
    )
}

// ── Consumptions ───────────────────────────────────────────────────

pub fn upsert_consumption(
    conn: &Connection,
    date: NaiveDate,
    section_id: &str,
    relative_value: f64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO consumptions (date, section_id, relative_value, is_anchor)
         VALUES (?1, ?2, ?3, 0)
         ON CONFLICT(date, section_id) DO UPDATE SET
           relative_value = excluded.relative_value",
        params![date_key(date), section_id, relative_value],
    )?;
    Ok(())
}

// ── Anchors ────────────────────────────────────────────────────────

pub fn upsert_anchor(
    conn: &Connection,
    date: NaiveDate,
    section_id: &str,
    value: f64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO anchors (date, section_id, value)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(date, section_id) DO UPDATE SET value = excluded.value",
        params![date_key(date), section_id, value],
    )?;
    Ok(())
}

// ── Derived values ─────────────────────────────────────────────────

/// Latest anchor at or before `target`, plus the deltas after that anchor up to `target` inclusive.
/// Zero when nothing is stored.
pub fn total_consumption_as_of(
    conn: &Connection,
    target: NaiveDate,
    section_id: &str,
) -> Result<f64, rusqlite::Error> {
    conn.query_row(
        "SELECT
            COALESCE((
                SELECT value FROM anchors
                WHERE section_id = ?1 AND date <= ?2
                ORDER BY date DESC LIMIT 1
            ), 0)
            + COALESCE((
                SELECT SUM(relative_value) FROM consumptions
                WHERE section_id = ?1
                  AND is_anchor = 0
                  AND date > (
                      SELECT date FROM anchors
                      WHERE section_id = ?1 AND date <= ?2
                      ORDER BY date DESC LIMIT 1
                  )
                  AND date <= ?2
            ), 0)",
        params![section_id, date_key(target)],
        |row| row.get(0),
    )
}

/// Absolute index for every day holding a delta, newest first.
///
/// Only the most recent anchor of the section takes part: days after it add
/// their deltas to the anchor value, days before it subtract the deltas that
/// follow them up to the anchor day. No anchor means no rows.
pub fn consumptions_with_absolute(
    conn: &Connection,
    section_id: &str,
) -> Result<Vec<(String, f64)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "WITH anchor AS (
            SELECT date, value FROM anchors
            WHERE section_id = ?1
            ORDER BY date DESC LIMIT 1
        ),
        running AS (
            SELECT date,
                   SUM(relative_value) OVER (
                       ORDER BY date ASC
                       ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
                   ) AS cumulative
            FROM consumptions
            WHERE section_id = ?1 AND is_anchor = 0
        ),
        at_anchor AS (
            SELECT COALESCE(SUM(c.relative_value), 0) AS cumulative
            FROM consumptions c, anchor a
            WHERE c.section_id = ?1 AND c.is_anchor = 0 AND c.date <= a.date
        )
        SELECT r.date,
               CASE
                   WHEN r.date = a.date THEN a.value
                   ELSE a.value - (SELECT cumulative FROM at_anchor) + r.cumulative
               END AS absolute_value
        FROM running r CROSS JOIN anchor a
        ORDER BY r.date DESC",
    )?;
    let rows = stmt.query_map(params![section_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    rows.collect()
}
