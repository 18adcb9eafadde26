use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::models::{Entry, validate_entry};
use crate::schema::index;
use crate::tx::StoreAccess;

const ENTRY_COLUMNS: &str = "id, person_id, date, time, food_id, food_name, amount_grams, kcal,
    protein, carb, fat, source, created_at";

pub struct EntryStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> EntryStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        Ok(Entry {
            id: row.get(0)?,
            person_id: row.get(1)?,
            date: row.get(2)?,
            time: row.get(3)?,
            food_id: row.get(4)?,
            food_name: row.get(5)?,
            amount_grams: row.get(6)?,
            kcal: row.get(7)?,
            protein: row.get(8)?,
            carb: row.get(9)?,
            fat: row.get(10)?,
            source: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Entry>> {
        let mut stmt = self.access.conn().prepare(sql)?;
        let entries = stmt
            .query_map(params, Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_all(&self) -> Result<Vec<Entry>> {
        self.query(&format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id"), [])
    }

    pub fn get(&self, id: &str) -> Result<Option<Entry>> {
        let entry = self
            .access
            .conn()
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn put(&self, entry: &Entry) -> Result<()> {
        validate_entry(entry)?;
        self.access.writer()?.execute(
            "INSERT OR REPLACE INTO entries (id, person_id, date, time, food_id, food_name,
                amount_grams, kcal, protein, carb, fat, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entry.id,
                entry.person_id,
                entry.date,
                entry.time,
                entry.food_id,
                entry.food_name,
                entry.amount_grams,
                entry.kcal,
                entry.protein,
                entry.carb,
                entry.fat,
                entry.source,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Entries of one person on one day, in time order.
    pub fn for_person_date(&self, person_id: &str, date: &str) -> Result<Vec<Entry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM entries INDEXED BY {}
                 WHERE person_id = ?1 AND date = ?2
                 ORDER BY time, created_at",
                index::ENTRIES_BY_PERSON_DATE_TIME
            ),
            params![person_id, date],
        )
    }

    /// Entries of one person between two days inclusive, in chronological order.
    pub fn in_range(&self, person_id: &str, start: &str, end: &str) -> Result<Vec<Entry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM entries INDEXED BY {}
                 WHERE person_id = ?1 AND date BETWEEN ?2 AND ?3
                 ORDER BY date, time, created_at",
                index::ENTRIES_BY_PERSON_DATE_TIME
            ),
            params![person_id, start, end],
        )
    }

    /// Distinct days with at least one entry, newest first.
    pub fn logged_dates(&self, person_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.access.conn().prepare(&format!(
            "SELECT DISTINCT date FROM entries INDEXED BY {}
             WHERE person_id = ?1
             ORDER BY date DESC",
            index::ENTRIES_BY_PERSON_DATE
        ))?;
        let dates = stmt
            .query_map(params![person_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(dates)
    }

    pub fn delete_by_person(&self, person_id: &str) -> Result<usize> {
        self.access
            .delete_owned_by(index::ENTRIES_BY_PERSON, person_id)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
