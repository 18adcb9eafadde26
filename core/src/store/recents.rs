use std::collections::HashSet;

use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FoodItem, Recent, validate_food_item, validate_nutrition, validate_required};
use crate::schema::index;
use crate::tx::StoreAccess;

use super::{json_column, to_json};

const RECENT_COLUMNS: &str =
    "id, person_id, food_id, label, nutrition, piece_gram_hint, source_type, used_at";

pub struct RecentStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> RecentStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn recent_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recent> {
        Ok(Recent {
            id: row.get(0)?,
            person_id: row.get(1)?,
            food_id: row.get(2)?,
            label: row.get(3)?,
            nutrition: json_column(row, 4)?,
            piece_gram_hint: row.get(5)?,
            source_type: row.get(6)?,
            used_at: row.get(7)?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Recent>> {
        let mut stmt = self.access.conn().prepare(sql)?;
        let recents = stmt
            .query_map(params, Self::recent_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recents)
    }

    pub fn get_all(&self) -> Result<Vec<Recent>> {
        self.query(&format!("SELECT {RECENT_COLUMNS} FROM recents ORDER BY id"), [])
    }

    pub fn get(&self, id: &str) -> Result<Option<Recent>> {
        let recent = self
            .access
            .conn()
            .query_row(
                &format!("SELECT {RECENT_COLUMNS} FROM recents WHERE id = ?1"),
                params![id],
                Self::recent_from_row,
            )
            .optional()?;
        Ok(recent)
    }

    pub fn put(&self, recent: &Recent) -> Result<()> {
        validate_required("id", &recent.id)?;
        validate_required("personId", &recent.person_id)?;
        validate_required("foodId", &recent.food_id)?;
        validate_nutrition(&recent.nutrition)?;
        let nutrition = to_json(&recent.nutrition)?;
        self.access.writer()?.execute(
            "INSERT OR REPLACE INTO recents (id, person_id, food_id, label, nutrition,
                piece_gram_hint, source_type, used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                recent.id,
                recent.person_id,
                recent.food_id,
                recent.label,
                nutrition,
                recent.piece_gram_hint,
                recent.source_type,
                recent.used_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM recents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Rows recorded for one (person, food) pair.
    pub fn for_person_food(&self, person_id: &str, food_id: &str) -> Result<Vec<Recent>> {
        self.query(
            &format!(
                "SELECT {RECENT_COLUMNS} FROM recents INDEXED BY {}
                 WHERE person_id = ?1 AND food_id = ?2",
                index::RECENTS_BY_PERSON_FOOD
            ),
            params![person_id, food_id],
        )
    }

    /// Move `item` to the front of the person's recents.
    ///
    /// Any row for the same food is removed and a fresh row with a new id is
    /// inserted, so each food appears at most once.
    pub fn touch(&self, person_id: &str, item: &FoodItem, used_at: i64) -> Result<Recent> {
        validate_required("personId", person_id)?;
        validate_food_item(item)?;
        for stale in self.for_person_food(person_id, &item.food_id)? {
            self.delete(&stale.id)?;
        }
        let recent = Recent {
            id: Uuid::new_v4().to_string(),
            person_id: person_id.to_string(),
            food_id: item.food_id.clone(),
            label: item.label.clone(),
            nutrition: item.nutrition,
            piece_gram_hint: item.piece_gram_hint,
            source_type: item.source_type.clone(),
            used_at,
        };
        self.put(&recent)?;
        Ok(recent)
    }

    /// Up to `limit` distinct foods, most recently used first.
    ///
    /// Walks the `(person_id, used_at)` index backwards and keeps the first row
    /// seen for each food, skipping stale duplicates left by older versions.
    pub fn top(&self, person_id: &str, limit: usize) -> Result<Vec<Recent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut stmt = self.access.conn().prepare(&format!(
            "SELECT {RECENT_COLUMNS} FROM recents INDEXED BY {}
             WHERE person_id = ?1
             ORDER BY used_at DESC, rowid DESC",
            index::RECENTS_BY_PERSON_USED_AT
        ))?;
        let mut rows = stmt.query(params![person_id])?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let recent = Self::recent_from_row(row)?;
            if seen.insert(recent.food_id.clone()) {
                out.push(recent);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub fn delete_by_person(&self, person_id: &str) -> Result<usize> {
        self.access
            .delete_owned_by(index::RECENTS_BY_PERSON_USED_AT, person_id)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
