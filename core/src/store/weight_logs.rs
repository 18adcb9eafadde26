use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::models::{WeightLog, validate_positive, validate_required};
use crate::schema::index;
use crate::tx::StoreAccess;

const WEIGHT_COLUMNS: &str = "id, person_id, date, scale_weight, trend_weight";

pub struct WeightLogStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> WeightLogStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn weight_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightLog> {
        Ok(WeightLog {
            id: row.get(0)?,
            person_id: row.get(1)?,
            date: row.get(2)?,
            scale_weight: row.get(3)?,
            trend_weight: row.get(4)?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<WeightLog>> {
        let mut stmt = self.access.conn().prepare(sql)?;
        let logs = stmt
            .query_map(params, Self::weight_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn get_all(&self) -> Result<Vec<WeightLog>> {
        self.query(&format!("SELECT {WEIGHT_COLUMNS} FROM weight_logs ORDER BY id"), [])
    }

    pub fn get(&self, id: i64) -> Result<Option<WeightLog>> {
        let log = self
            .access
            .conn()
            .query_row(
                &format!("SELECT {WEIGHT_COLUMNS} FROM weight_logs WHERE id = ?1"),
                params![id],
                Self::weight_log_from_row,
            )
            .optional()?;
        Ok(log)
    }

    /// Lookup through the unique `(person_id, date)` index.
    pub fn get_by_person_date(&self, person_id: &str, date: &str) -> Result<Option<WeightLog>> {
        let log = self
            .access
            .conn()
            .query_row(
                &format!(
                    "SELECT {WEIGHT_COLUMNS} FROM weight_logs INDEXED BY {}
                     WHERE person_id = ?1 AND date = ?2",
                    index::WEIGHT_LOGS_BY_PERSON_DATE
                ),
                params![person_id, date],
                Self::weight_log_from_row,
            )
            .optional()?;
        Ok(log)
    }

    /// Insert or replace a row by id. The `(person_id, date)` uniqueness still holds.
    pub fn put(&self, log: &WeightLog) -> Result<()> {
        validate_required("personId", &log.person_id)?;
        validate_required("date", &log.date)?;
        validate_positive("scaleWeight", log.scale_weight)?;
        self.access.writer()?.execute(
            "INSERT INTO weight_logs (id, person_id, date, scale_weight, trend_weight)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                person_id = excluded.person_id,
                date = excluded.date,
                scale_weight = excluded.scale_weight,
                trend_weight = excluded.trend_weight",
            params![
                log.id,
                log.person_id,
                log.date,
                log.scale_weight,
                log.trend_weight
            ],
        )?;
        Ok(())
    }

    /// Insert a new row and return its generated id.
    pub fn insert(
        &self,
        person_id: &str,
        date: &str,
        scale_weight: f64,
        trend_weight: Option<f64>,
    ) -> Result<i64> {
        validate_required("personId", person_id)?;
        validate_required("date", date)?;
        validate_positive("scaleWeight", scale_weight)?;
        let conn = self.access.writer()?;
        conn.execute(
            "INSERT INTO weight_logs (person_id, date, scale_weight, trend_weight)
             VALUES (?1, ?2, ?3, ?4)",
            params![person_id, date, scale_weight, trend_weight],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Write `scale_weight` for the person's day, overwriting the existing row
    /// in place when there is one. Returns the row id.
    pub fn upsert_by_person_date(
        &self,
        person_id: &str,
        date: &str,
        scale_weight: f64,
    ) -> Result<i64> {
        match self.get_by_person_date(person_id, date)? {
            Some(existing) => {
                self.put(&WeightLog {
                    id: existing.id,
                    person_id: person_id.to_string(),
                    date: date.to_string(),
                    scale_weight,
                    trend_weight: None,
                })?;
                Ok(existing.id)
            }
            None => self.insert(person_id, date, scale_weight, None),
        }
    }

    pub fn set_trend(&self, id: i64, trend_weight: Option<f64>) -> Result<()> {
        self.access.writer()?.execute(
            "UPDATE weight_logs SET trend_weight = ?1 WHERE id = ?2",
            params![trend_weight, id],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM weight_logs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Every row of one person, in storage order.
    pub fn for_person(&self, person_id: &str) -> Result<Vec<WeightLog>> {
        self.query(
            &format!(
                "SELECT {WEIGHT_COLUMNS} FROM weight_logs INDEXED BY {}
                 WHERE person_id = ?1",
                index::WEIGHT_LOGS_BY_PERSON
            ),
            params![person_id],
        )
    }

    /// Rows of one person between two days inclusive, oldest first.
    pub fn in_range(&self, person_id: &str, start: &str, end: &str) -> Result<Vec<WeightLog>> {
        self.query(
            &format!(
                "SELECT {WEIGHT_COLUMNS} FROM weight_logs INDEXED BY {}
                 WHERE person_id = ?1 AND date BETWEEN ?2 AND ?3
                 ORDER BY date",
                index::WEIGHT_LOGS_BY_PERSON_DATE
            ),
            params![person_id, start, end],
        )
    }

    /// All rows on one day across persons, via the date index.
    pub fn on_date(&self, date: &str) -> Result<Vec<WeightLog>> {
        self.query(
            &format!(
                "SELECT {WEIGHT_COLUMNS} FROM weight_logs INDEXED BY {}
                 WHERE date = ?1
                 ORDER BY person_id",
                index::WEIGHT_LOGS_BY_DATE
            ),
            params![date],
        )
    }

    pub fn delete_by_person(&self, person_id: &str) -> Result<usize> {
        self.access
            .delete_owned_by(index::WEIGHT_LOGS_BY_PERSON, person_id)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
