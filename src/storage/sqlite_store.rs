use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{NewRegion, RegionStore, RegionSummary, GRAPH_LEN};
use crate::data_sources::forecast_payload::TIMESTAMP_FORMAT;
use crate::error::{StoreError, StoreResult};
use crate::region::{
    format_utc_offset, parse_utc_offset, HistoricalSeries, PartialDay, Region, HISTORY_LEN,
    SLOT_COUNT,
};
use crate::signals::display::display_date;
use crate::signals::BlendedSeries;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY,
    woeid TEXT NOT NULL,
    name TEXT NOT NULL,
    name_ru TEXT NOT NULL,
    timezone TEXT NOT NULL DEFAULT 'UTC+0',
    last_date INTEGER NOT NULL DEFAULT 0,
    heating_date TEXT,
    heating_date_ru TEXT
);
CREATE TABLE IF NOT EXISTS today (
    region_id INTEGER PRIMARY KEY,
    hour_0 REAL, hour_3 REAL, hour_6 REAL, hour_9 REAL,
    hour_12 REAL, hour_15 REAL, hour_18 REAL, hour_21 REAL,
    datetime TEXT
);
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    region_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    temp REAL NOT NULL,
    datetime TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_region ON history(region_id, date);
CREATE TABLE IF NOT EXISTS graph (
    region_id INTEGER PRIMARY KEY,
    temp_1 REAL, temp_2 REAL, temp_3 REAL, temp_4 REAL, temp_5 REAL,
    temp_6 REAL, temp_7 REAL, temp_8 REAL, temp_9 REAL, temp_10 REAL,
    date_1 TEXT, date_2 TEXT, date_3 TEXT, date_4 TEXT, date_5 TEXT,
    date_6 TEXT, date_7 TEXT, date_8 TEXT, date_9 TEXT, date_10 TEXT,
    datetime TEXT
);
";

fn hour_columns() -> Vec<String> {
    (0..SLOT_COUNT).map(|i| format!("hour_{}", i * 3)).collect()
}

fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidData(format!("date {:?}: {}", raw, e)))
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened region database {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn load_history(conn: &Connection, id: u32) -> StoreResult<HistoricalSeries> {
        // latest write per date, newest dates first
        let mut stmt = conn.prepare(
            "SELECT date, temp FROM history
             WHERE id IN (SELECT MAX(id) FROM history WHERE region_id = ?1 GROUP BY date)
             ORDER BY date DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![id, HISTORY_LEN as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let days = rows
            .into_iter()
            .map(|(date, temp)| parse_date(&date).map(|d| (d, temp)))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(HistoricalSeries::from_rows(days))
    }
}

impl RegionStore for SqliteStore {
    fn region_ids(&self) -> StoreResult<Vec<u32>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM regions ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_region(&self, id: u32) -> StoreResult<Region> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT woeid, timezone, last_date, heating_date, name, name_ru
                 FROM regions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::RegionNotFound(id))?;
        let (provider_key, timezone, last_date, heating_date, name, display_name) = row;

        let utc_offset = parse_utc_offset(&timezone)
            .ok_or_else(|| StoreError::InvalidData(format!("timezone {:?}", timezone)))?;
        let heating_date = heating_date.as_deref().map(parse_date).transpose()?;
        let history = Self::load_history(&conn, id)?;

        Ok(Region {
            id,
            provider_key,
            utc_offset,
            tracking_complete: last_date != 0,
            history,
            heating_date,
            name,
            display_name,
        })
    }

    fn append_history(
        &self,
        id: u32,
        date: NaiveDate,
        mean: f64,
        written_at: NaiveDateTime,
    ) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO history (region_id, date, temp, datetime) VALUES (?1, ?2, ?3, ?4)",
            params![id, date.to_string(), mean, format_timestamp(written_at)],
        )?;
        debug!("Region {}: history {} = {:.2}", id, date, mean);
        Ok(())
    }

    fn load_partial_day(&self, id: u32) -> StoreResult<PartialDay> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {}, datetime FROM today WHERE region_id = ?1",
            hour_columns().join(", ")
        );
        let row = conn
            .query_row(&sql, params![id], |row| {
                let mut slots = [None; SLOT_COUNT];
                for (i, slot) in slots.iter_mut().enumerate() {
                    *slot = row.get::<_, Option<f64>>(i)?;
                }
                Ok((slots, row.get::<_, Option<String>>(SLOT_COUNT)?))
            })
            .optional()?;

        match row {
            None => Ok(PartialDay::default()),
            Some((slots, written)) => {
                let last_write = written
                    .as_deref()
                    .map(|raw| {
                        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| {
                            StoreError::InvalidData(format!("datetime {:?}: {}", raw, e))
                        })
                    })
                    .transpose()?;
                Ok(PartialDay::from_slots(slots, last_write))
            }
        }
    }

    fn save_partial_day(&self, id: u32, partial_day: &PartialDay) -> StoreResult<()> {
        let columns = hour_columns();
        let placeholders: Vec<String> = (2..=SLOT_COUNT + 2).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO today (region_id, {}, datetime) VALUES (?1, {})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut values = vec![Value::Integer(i64::from(id))];
        values.extend(
            partial_day
                .slots()
                .iter()
                .map(|slot| slot.map_or(Value::Null, Value::Real)),
        );
        values.push(
            partial_day
                .last_write()
                .map_or(Value::Null, |at| Value::Text(format_timestamp(at))),
        );

        self.conn()?.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    fn save_graph(
        &self,
        id: u32,
        series: &BlendedSeries,
        written_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let temp_columns = (1..=GRAPH_LEN).map(|i| format!("temp_{}", i));
        let date_columns = (1..=GRAPH_LEN).map(|i| format!("date_{}", i));
        let columns: Vec<String> = temp_columns.chain(date_columns).collect();
        let placeholders: Vec<String> =
            (2..=2 * GRAPH_LEN + 2).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO graph (region_id, {}, datetime) VALUES (?1, {})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let entries: Vec<(&NaiveDate, &f64)> = series.iter().take(GRAPH_LEN).collect();
        let mut values = vec![Value::Integer(i64::from(id))];
        values.extend(
            (0..GRAPH_LEN).map(|i| entries.get(i).map_or(Value::Null, |(_, t)| Value::Real(**t))),
        );
        values.extend((0..GRAPH_LEN).map(|i| {
            entries
                .get(i)
                .map_or(Value::Null, |(d, _)| Value::Text(d.to_string()))
        }));
        values.push(Value::Text(format_timestamp(written_at)));

        self.conn()?.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    fn load_graph(&self, id: u32) -> StoreResult<Vec<(NaiveDate, f64)>> {
        let conn = self.conn()?;
        let temp_columns = (1..=GRAPH_LEN).map(|i| format!("temp_{}", i));
        let date_columns = (1..=GRAPH_LEN).map(|i| format!("date_{}", i));
        let columns: Vec<String> = temp_columns.chain(date_columns).collect();
        let sql = format!("SELECT {} FROM graph WHERE region_id = ?1", columns.join(", "));

        let row = conn
            .query_row(&sql, params![id], |row| {
                let mut pairs = Vec::with_capacity(GRAPH_LEN);
                for i in 0..GRAPH_LEN {
                    let temp = row.get::<_, Option<f64>>(i)?;
                    let date = row.get::<_, Option<String>>(GRAPH_LEN + i)?;
                    if let (Some(temp), Some(date)) = (temp, date) {
                        pairs.push((date, temp));
                    }
                }
                Ok(pairs)
            })
            .optional()?
            .unwrap_or_default();

        row.into_iter()
            .map(|(date, temp)| parse_date(&date).map(|d| (d, temp)))
            .collect()
    }

    fn save_heating_date(&self, id: u32, heating_date: Option<NaiveDate>) -> StoreResult<()> {
        let stored = heating_date.map(|d| d.to_string());
        let display = heating_date.map(|d| display_date(d, false));
        self.conn()?.execute(
            "UPDATE regions SET heating_date = ?1, heating_date_ru = ?2 WHERE id = ?3",
            params![stored, display, id],
        )?;
        Ok(())
    }

    fn set_tracking_complete(&self, id: u32, complete: bool) -> StoreResult<()> {
        self.conn()?.execute(
            "UPDATE regions SET last_date = ?1 WHERE id = ?2",
            params![i64::from(complete), id],
        )?;
        Ok(())
    }

    fn reset_tracking(&self) -> StoreResult<usize> {
        Ok(self.conn()?.execute("UPDATE regions SET last_date = 0", [])?)
    }

    fn list_regions(&self) -> StoreResult<Vec<RegionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, name_ru, heating_date, heating_date_ru, last_date
             FROM regions ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, display_name, date, date_display, last_date)| {
                Ok(RegionSummary {
                    id,
                    name,
                    display_name,
                    heating_date: date.as_deref().map(parse_date).transpose()?,
                    heating_date_display: date_display,
                    tracking_complete: last_date != 0,
                })
            })
            .collect()
    }

    fn upsert_region(&self, region: &NewRegion) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO regions (id, woeid, name, name_ru, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                woeid = excluded.woeid,
                name = excluded.name,
                name_ru = excluded.name_ru,
                timezone = excluded.timezone",
            params![
                region.id,
                region.provider_key,
                region.name,
                region.display_name,
                format_utc_offset(region.utc_offset)
            ],
        )?;
        Ok(())
    }
}
